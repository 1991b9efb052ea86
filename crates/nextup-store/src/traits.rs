//! Store trait definitions

use nextup_api::{ScheduleSnapshot, Timetable};

use crate::StoreResult;

/// Durable cache holding the last known timetable.
///
/// Pure storage: no merging, no versioning. Every `store` is a full
/// overwrite, and `retrieve` distinguishes "never populated" (`None`) from
/// "populated with an empty timetable".
pub trait TimetableCache: Send + Sync {
    /// Replace the cached timetable, returning the snapshot as written
    fn store(&self, timetable: &Timetable) -> StoreResult<ScheduleSnapshot>;

    /// Load the cached snapshot, if one was ever written
    fn retrieve(&self) -> StoreResult<Option<ScheduleSnapshot>>;

    /// Check if the cache is usable
    fn is_healthy(&self) -> bool;
}
