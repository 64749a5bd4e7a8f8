//! Interactive client for the chat relay.
//!
//! Announces a username, sends one frame per input line and prints messages
//! relayed from other clients between prompts.

pub mod error;
pub mod formatter;
pub mod session;
pub mod ui;

mod runner;

pub use runner::run_client;
