//! Protocol and domain types for spectrumd
//!
//! This crate defines the stable API between spectrumd and its clients
//! (the messenger transport and the calendar web surface):
//! - Club domain types (trainings, templates, attendance, subscriptions)
//! - Partial updates with a field allow-list
//! - Conversation replies
//! - Commands and responses, with versioning

mod commands;
mod replies;
mod types;
mod updates;

pub use commands::*;
pub use replies::*;
pub use types::*;
pub use updates::*;

/// Current API version
pub const API_VERSION: u32 = 1;
