//! Mock collaborators for testing

use async_trait::async_trait;
use nextup_api::{Credential, NotificationContent, Timetable};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    CredentialSource, FetchError, HostError, HostResult, NotificationSink, RemoteFetcher,
    TimerFired, TimerHandle, TimerSubstrate,
};

/// Mock remote source returning a configurable result
pub struct MockFetcher {
    result: Mutex<Result<Timetable, FetchError>>,
    delay: Mutex<Option<Duration>>,
    fetch_count: AtomicUsize,
    last_username: Mutex<Option<String>>,
}

impl MockFetcher {
    pub fn new(timetable: Timetable) -> Self {
        Self::with_result(Ok(timetable))
    }

    pub fn failing(error: FetchError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: Result<Timetable, FetchError>) -> Self {
        Self {
            result: Mutex::new(result),
            delay: Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
            last_username: Mutex::new(None),
        }
    }

    /// Change what subsequent fetches return
    pub fn set_result(&self, result: Result<Timetable, FetchError>) {
        *self.result.lock().unwrap() = result;
    }

    /// Make each fetch take this long (simulates a slow network)
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Username of the most recent fetch
    pub fn last_username(&self) -> Option<String> {
        self.last_username.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for MockFetcher {
    async fn fetch(&self, credential: &Credential) -> Result<Timetable, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        *self.last_username.lock().unwrap() = Some(credential.username().to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.result.lock().unwrap().clone()
    }
}

/// Credential source with a fixed answer
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(username: &str, secret: &str) -> Self {
        Self {
            credential: Some(Credential::new(username, secret)),
        }
    }

    /// No user stored
    pub fn none() -> Self {
        Self::default()
    }
}

impl CredentialSource for StaticCredentials {
    fn current(&self) -> Option<Credential> {
        self.credential.clone()
    }
}

/// Notification sink that records every call
#[derive(Default)]
pub struct RecordingSink {
    issued: Mutex<Vec<NotificationContent>>,
    visible: Mutex<Option<NotificationContent>>,
    cancel_count: AtomicUsize,

    /// Configure issue/cancel to fail
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification issued so far, oldest first
    pub fn issued(&self) -> Vec<NotificationContent> {
        self.issued.lock().unwrap().clone()
    }

    /// What the user would currently see
    pub fn visible(&self) -> Option<NotificationContent> {
        self.visible.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl NotificationSink for RecordingSink {
    fn issue(&self, content: &NotificationContent) -> HostResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(HostError::NotifyFailed("Mock issue failure".into()));
        }
        self.issued.lock().unwrap().push(content.clone());
        *self.visible.lock().unwrap() = Some(content.clone());
        Ok(())
    }

    fn cancel(&self) -> HostResult<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(HostError::NotifyFailed("Mock cancel failure".into()));
        }
        *self.visible.lock().unwrap() = None;
        Ok(())
    }
}

/// Timer substrate that only fires when told to
pub struct ManualTimer {
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<u64, Duration>>,
    arm_count: AtomicUsize,
    event_tx: mpsc::UnboundedSender<TimerFired>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<TimerFired>>>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
            arm_count: AtomicUsize::new(0),
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Pending timers with the delay they were armed with, oldest first
    pub fn pending(&self) -> Vec<(TimerHandle, Duration)> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(id, delay)| (TimerHandle::new(*id), *delay))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Most recently armed timer that is still pending
    pub fn last_pending(&self) -> Option<(TimerHandle, Duration)> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .next_back()
            .map(|(id, delay)| (TimerHandle::new(*id), *delay))
    }

    /// Total number of `arm` calls
    pub fn arm_count(&self) -> usize {
        self.arm_count.load(Ordering::SeqCst)
    }

    /// Simulate the timer elapsing. Returns false if it was not pending.
    pub fn fire(&self, handle: TimerHandle) -> bool {
        let was_pending = self.pending.lock().unwrap().remove(&handle.id()).is_some();
        if was_pending {
            let _ = self.event_tx.send(TimerFired { handle });
        }
        was_pending
    }

    /// Fire the most recently armed pending timer
    pub fn fire_last(&self) -> Option<TimerHandle> {
        let (handle, _) = self.last_pending()?;
        self.fire(handle);
        Some(handle)
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSubstrate for ManualTimer {
    fn arm(&self, delay: Duration) -> HostResult<TimerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.arm_count.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(id, delay);
        Ok(TimerHandle::new(id))
    }

    fn cancel(&self, handle: &TimerHandle) {
        self.pending.lock().unwrap().remove(&handle.id());
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerFired> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }
}
