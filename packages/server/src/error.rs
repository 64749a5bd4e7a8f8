//! Error types for the chat relay server.
//!
//! Only setup and listener faults live here. Faults on a single client
//! connection are handled inside the event loop by dropping that connection.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Fatal server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listen address could not be resolved
    #[error("Failed to resolve listen address '{addr}': {source}")]
    Resolve { addr: String, source: io::Error },

    /// Listen address resolved to nothing
    #[error("No socket address found for '{0}'")]
    NoAddress(String),

    /// Listening socket could not be set up
    #[error("Failed to listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// The readiness wait itself failed
    #[error("Readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    /// The listening socket failed to accept
    #[error("Listening socket failed: {0}")]
    Accept(#[source] io::Error),
}
