//! Timer handle abstraction

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a pending timer
///
/// Issued by the timer substrate when a timer is armed. Ids increase
/// monotonically per substrate, so a handle is never reused for a later timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}
