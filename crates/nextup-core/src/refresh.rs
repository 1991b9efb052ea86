//! Single-flight timetable refresh

use nextup_api::{Credential, ErrorCode, ScheduleSnapshot};
use nextup_host_api::{CredentialSource, FetchError, RemoteFetcher};
use nextup_store::TimetableCache;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{CoreEvent, CoreEventSender, NotificationScheduler, SnapshotCell};

/// Why a refresh did not replace the cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No stored credential")]
    Unauthenticated,

    #[error("Credentials rejected by the timetable source")]
    AuthenticationRejected,

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Timetable could not be parsed: {0}")]
    ParseFailed(String),

    #[error("Cache write failed: {0}")]
    CacheWriteFailed(String),
}

impl RefreshError {
    /// Protocol error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            RefreshError::Unauthenticated => ErrorCode::Unauthenticated,
            RefreshError::AuthenticationRejected => ErrorCode::AuthenticationRejected,
            RefreshError::FetchFailed(_) => ErrorCode::FetchFailed,
            RefreshError::ParseFailed(_) => ErrorCode::ParseFailed,
            RefreshError::CacheWriteFailed(_) => ErrorCode::CacheWriteFailed,
        }
    }
}

impl From<FetchError> for RefreshError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::AuthenticationRejected => RefreshError::AuthenticationRejected,
            FetchError::Transport(msg) => RefreshError::FetchFailed(msg),
            FetchError::Parse(msg) => RefreshError::ParseFailed(msg),
        }
    }
}

pub type RefreshResult = Result<Arc<ScheduleSnapshot>, RefreshError>;

type InFlight = Mutex<Option<broadcast::Sender<RefreshResult>>>;

/// Collaborators a refresh goes through
pub struct RefreshHost {
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub credentials: Arc<dyn CredentialSource>,
    pub cache: Arc<dyn TimetableCache>,
}

/// Coordinates remote refreshes so at most one fetch runs at a time
pub struct RefreshCoordinator {
    host: RefreshHost,
    snapshot: Arc<SnapshotCell>,
    scheduler: Arc<NotificationScheduler>,
    fetch_timeout: Duration,
    in_flight: InFlight,
    events: CoreEventSender,
}

impl RefreshCoordinator {
    pub fn new(
        host: RefreshHost,
        snapshot: Arc<SnapshotCell>,
        scheduler: Arc<NotificationScheduler>,
        fetch_timeout: Duration,
        events: CoreEventSender,
    ) -> Self {
        Self {
            host,
            snapshot,
            scheduler,
            fetch_timeout,
            in_flight: Mutex::new(None),
            events,
        }
    }

    /// Refresh with the stored credential
    pub async fn refresh(&self) -> RefreshResult {
        let Some(credential) = self.host.credentials.current() else {
            let error = RefreshError::Unauthenticated;
            warn!("Refresh requested without a stored credential");
            self.emit(CoreEvent::RefreshFailed {
                error: error.clone(),
            });
            return Err(error);
        };
        self.refresh_with(&credential).await
    }

    /// Refresh with an explicit credential.
    ///
    /// A call made while another refresh is running waits for that refresh
    /// and returns its result instead of fetching again.
    pub async fn refresh_with(&self, credential: &Credential) -> RefreshResult {
        let joined = {
            let mut slot = self.in_flight.lock().unwrap();
            match slot.as_ref() {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    *slot = Some(tx);
                    None
                }
            }
        };

        if let Some(mut rx) = joined {
            debug!("Refresh already in flight, joining");
            return rx
                .recv()
                .await
                .unwrap_or_else(|_| Err(RefreshError::FetchFailed("refresh abandoned".into())));
        }

        let guard = InFlightGuard::new(&self.in_flight);
        let result = self.run(credential).await;
        guard.complete(&result);
        result
    }

    /// Whether a fetch is currently running
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.lock().unwrap().is_some()
    }

    async fn run(&self, credential: &Credential) -> RefreshResult {
        info!(user = credential.username(), "Refreshing timetable");

        let fetched = tokio::time::timeout(self.fetch_timeout, self.host.fetcher.fetch(credential))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Transport(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs()
                )))
            });

        let timetable = match fetched {
            Ok(timetable) => timetable,
            Err(e) => return Err(self.fail(e.into())),
        };

        // Durable first, then the in-memory swap
        let snapshot = match self.host.cache.store(&timetable) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => return Err(self.fail(RefreshError::CacheWriteFailed(e.to_string()))),
        };
        self.snapshot.replace(snapshot.clone());

        info!(
            event_count = snapshot.timetable.len(),
            written_at = %snapshot.written_at,
            "Timetable cache replaced"
        );
        self.emit(CoreEvent::SnapshotReplaced {
            written_at: snapshot.written_at,
            event_count: snapshot.timetable.len(),
        });

        self.scheduler.reschedule_now();
        Ok(snapshot)
    }

    fn fail(&self, error: RefreshError) -> RefreshError {
        warn!(error = %error, "Refresh failed, cache unchanged");
        self.emit(CoreEvent::RefreshFailed {
            error: error.clone(),
        });
        error
    }

    fn emit(&self, event: CoreEvent) {
        let _ = self.events.send(event);
    }
}

/// Releases the in-flight slot, also when the leading future is dropped
struct InFlightGuard<'a> {
    slot: &'a InFlight,
    released: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(slot: &'a InFlight) -> Self {
        Self {
            slot,
            released: false,
        }
    }

    fn complete(mut self, result: &RefreshResult) {
        if let Some(tx) = self.slot.lock().unwrap().take() {
            let _ = tx.send(result.clone());
        }
        self.released = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Dropping the sender wakes joiners with an error
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}
