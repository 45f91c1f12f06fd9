//! IPC layer for spectrumd
//!
//! The messenger transport and the calendar surface talk to spectrumd over
//! a Unix domain socket, one JSON request or response per line. The server
//! records the peer UID of every connection.

mod client;
mod server;

pub use client::*;
pub use server::*;

use spectrum_api::ErrorCode;
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },
}

pub type IpcResult<T> = Result<T, IpcError>;
