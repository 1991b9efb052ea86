//! In-memory view of the cached timetable

use nextup_api::ScheduleSnapshot;
use std::sync::{Arc, RwLock};

/// Last good snapshot, swapped whole on every successful refresh
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Option<Arc<ScheduleSnapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from what the durable cache held at startup
    pub fn from_cached(snapshot: Option<ScheduleSnapshot>) -> Self {
        Self {
            current: RwLock::new(snapshot.map(Arc::new)),
        }
    }

    /// Current snapshot, None if the cache was never populated
    pub fn load(&self) -> Option<Arc<ScheduleSnapshot>> {
        self.current.read().unwrap().clone()
    }

    /// Install a new snapshot, returning the previous one
    pub fn replace(&self, snapshot: Arc<ScheduleSnapshot>) -> Option<Arc<ScheduleSnapshot>> {
        self.current.write().unwrap().replace(snapshot)
    }

    pub fn is_populated(&self) -> bool {
        self.current.read().unwrap().is_some()
    }
}
