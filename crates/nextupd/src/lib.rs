//! nextupd service library
//!
//! The binary in `main.rs` wires Linux adapters into [`Service`]; tests wire
//! in the mocks from `nextup-host-api` instead.

mod service;

pub use service::*;
