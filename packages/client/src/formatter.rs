//! Message formatting utilities for client display.

use std::fmt;

use chrono::{DateTime, TimeZone};

use crate::session::RelayedMessage;

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a relayed chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The message relayed by the server
    /// * `received_at` - When the message was drained from the socket
    ///
    /// # Returns
    ///
    /// `[HH:MM:SS] username > content`
    pub fn format_relayed<Tz>(message: &RelayedMessage, received_at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        format!(
            "[{}] {} > {}",
            received_at.format("%H:%M:%S"),
            message.username,
            message.content
        )
    }

    /// Notice printed when the server ends the session
    pub fn format_server_closed() -> &'static str {
        "Connection closed by the server"
    }
}
