//! Shared building blocks for the Irori chat relay.
//!
//! Both the server and the client speak the same length-prefixed wire format
//! defined in [`frame`], and both binaries initialise logging through [`logger`].

pub mod frame;
pub mod logger;
