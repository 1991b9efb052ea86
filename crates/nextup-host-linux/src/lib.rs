//! Linux adapters for nextupd
//!
//! Provides:
//! - Timetable feed over HTTPS with basic auth
//! - One-shot timers on the tokio runtime
//! - The "next event" desktop notification via `notify-send`
//! - Credentials read from a TOML file

mod credentials;
mod fetcher;
mod notifier;
mod timer;

pub use credentials::*;
pub use fetcher::*;
pub use notifier::*;
pub use timer::*;
