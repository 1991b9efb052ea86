//! Collaborator trait interfaces for nextupd
//!
//! This crate defines the interface between the core and the outside world:
//! the remote timetable source, the credential store, the visible
//! notification, the timer and user preferences. It contains no platform
//! code itself.

mod handle;
mod mock;
mod preferences;
mod traits;

pub use handle::*;
pub use mock::*;
pub use preferences::*;
pub use traits::*;
