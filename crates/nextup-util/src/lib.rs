//! Shared utilities for nextup
//!
//! This crate provides:
//! - ID types (ClientId, CacheKey)
//! - Time utilities (local wall clock, injectable clocks, formatting)
//! - Default paths for socket, config, data, and credentials

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
