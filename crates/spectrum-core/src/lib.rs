//! Booking engine and chat state machine for spectrumd
//!
//! This crate is the heart of spectrumd, containing:
//! - Sign-up, cancellation and attendance with capacity checks
//! - The subscription ledger and its one-lesson-per-attendance debit
//! - Manual trainings, coach availability and week-template expansion
//! - Per-chat conversation flows (add training -> choose group -> ... -> confirm)

mod booking;
mod conversation;
mod error;
mod schedule;
mod session;
mod subscription;

pub use booking::*;
pub use conversation::*;
pub use error::*;
pub use schedule::*;
pub use session::*;
pub use subscription::*;
