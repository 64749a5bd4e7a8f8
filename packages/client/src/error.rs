//! Error types for the chat client.

use std::io;

use irori_shared::frame::FrameError;
use rustyline::error::ReadlineError;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server
    #[error("Failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    /// The server sent something that is not a valid frame
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// Connection error
    #[error("Connection error: {0}")]
    Io(#[from] io::Error),

    /// Line input failed
    #[error("Input error: {0}")]
    Readline(#[from] ReadlineError),
}
