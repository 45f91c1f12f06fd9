//! Shared utilities for spectrumd
//!
//! This crate provides:
//! - ID types (TrainingId, StudentId, ChatId, ClientId, ...)
//! - Club calendar time (mock time, `DD.MM.YYYY` / `HH:MM` parsing, week arithmetic)
//! - Rate limiting helpers
//! - Default paths for socket, config and data directories

mod ids;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
