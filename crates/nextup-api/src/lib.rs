//! Timetable model and protocol types for nextup
//!
//! This crate defines:
//! - The timetable data model (events, snapshots, credentials)
//! - Notification content derived from an event
//! - Commands, responses and events exchanged with nextupd
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
