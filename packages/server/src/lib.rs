//! Chat relay server.
//!
//! Accepts TCP connections, reads length-prefixed frames from each client and
//! relays every message, tagged with the sender's username, to all other
//! connected clients. Everything runs on one thread driven by a readiness
//! multiplexer.

pub mod error;
pub mod event_loop;
pub mod poller;
pub mod registry;

mod runner;

pub use runner::{bind_server, run_server};
