//! Core of nextupd
//!
//! This crate contains:
//! - Next-event selection over a cached timetable (pure)
//! - The self-rescheduling notification scheduler (Idle -> Armed -> fire -> Armed)
//! - Single-flight remote refresh with failure classification
//! - The in-memory snapshot shared by both

mod events;
mod refresh;
mod scheduler;
mod selector;
mod snapshot;

pub use events::*;
pub use refresh::*;
pub use scheduler::*;
pub use selector::*;
pub use snapshot::*;
