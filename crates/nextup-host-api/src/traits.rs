//! Collaborator traits

use async_trait::async_trait;
use nextup_api::{Credential, NotificationContent, Timetable};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::TimerHandle;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    #[error("Timer failed: {0}")]
    TimerFailed(String),

    #[error("Credentials unreadable: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Classified failure of a remote fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote side refused the supplied credentials
    #[error("Authentication rejected")]
    AuthenticationRejected,

    /// Network, transport or HTTP-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded into a timetable
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Authoritative timetable source
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the full timetable using the given credential
    async fn fetch(&self, credential: &Credential) -> Result<Timetable, FetchError>;
}

/// Supplier of the stored user credential
pub trait CredentialSource: Send + Sync {
    /// Current credential, or None when no user is stored
    fn current(&self) -> Option<Credential>;
}

/// The single user-visible "next event" notification
///
/// Both calls must return promptly; they are made while the scheduler holds
/// its lock.
pub trait NotificationSink: Send + Sync {
    /// Show or replace the notification
    fn issue(&self, content: &NotificationContent) -> HostResult<()>;

    /// Remove the notification if visible
    fn cancel(&self) -> HostResult<()>;
}

/// Timer elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub handle: TimerHandle,
}

/// One-shot timers delivered on a single channel
pub trait TimerSubstrate: Send + Sync {
    /// Arm a timer that fires once after `delay`
    fn arm(&self, delay: Duration) -> HostResult<TimerHandle>;

    /// Cancel a pending timer. Unknown or already fired handles are ignored.
    fn cancel(&self, handle: &TimerHandle);

    /// Subscribe to timer firings
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerFired>;
}

/// User preferences read at decision time
pub trait Preferences: Send + Sync {
    /// Whether cancelled events count as upcoming
    fn show_cancelled(&self) -> bool;

    /// Whether the "next event" notification is enabled at all
    fn notifications_enabled(&self) -> bool;
}
