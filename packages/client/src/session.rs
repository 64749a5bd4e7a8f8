//! Client session over a single relay connection.
//!
//! The session sends one frame per input line and drains relayed messages
//! without blocking between prompts. Relayed messages arrive as
//! `username_frame || message_frame` pairs and are only handed out whole.

use std::{
    io::{Read, Write},
    net::TcpStream,
    thread,
    time::Duration,
};

use irori_shared::frame::{FillOutcome, Frame, FrameDecoder};

use crate::error::ClientError;

/// Pause before re-reading when only part of a pair has arrived
const PAIR_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// A message relayed by the server on behalf of another client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedMessage {
    pub username: String,
    pub content: String,
}

impl RelayedMessage {
    fn from_frames(username: Frame, message: Frame) -> Self {
        Self {
            username: username.text().into_owned(),
            content: message.text().into_owned(),
        }
    }
}

/// Result of one drain cycle
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drain {
    /// Complete messages received, in arrival order
    pub messages: Vec<RelayedMessage>,
    /// Whether the server closed the connection
    pub closed: bool,
}

pub struct ClientSession<S> {
    stream: S,
    inbound: FrameDecoder,
    username: String,
}

impl ClientSession<TcpStream> {
    /// Connect to the relay, announce `username`, then switch to non-blocking reads.
    pub fn connect(host: &str, port: u16, username: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port)).map_err(|source| ClientError::Connect {
            addr: format!("{}:{}", host, port),
            source,
        })?;

        let session = Self::start(stream, username)?;
        session.stream.set_nonblocking(true)?;
        Ok(session)
    }
}

impl<S: Read + Write> ClientSession<S> {
    /// Send the identity frame. It must be the first frame on the connection.
    ///
    /// `drain` expects `stream` to be non-blocking.
    pub fn start(mut stream: S, username: &str) -> Result<Self, ClientError> {
        let frame = Frame::new(username)?;
        stream.write_all(&frame.to_bytes())?;
        stream.flush()?;

        Ok(Self {
            stream,
            inbound: FrameDecoder::new(),
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send one chat message. Empty lines are skipped; returns whether a frame was sent.
    pub fn send(&mut self, line: &str) -> Result<bool, ClientError> {
        if line.is_empty() {
            return Ok(false);
        }

        let frame = Frame::new(line)?;
        self.stream.write_all(&frame.to_bytes())?;
        self.stream.flush()?;
        Ok(true)
    }

    /// Collect every relayed message available right now.
    ///
    /// Stops as soon as a read would block between pairs. While a pair is
    /// only partly received it keeps reading until the pair is complete.
    pub fn drain(&mut self) -> Result<Drain, ClientError> {
        let mut drain = Drain::default();

        loop {
            let outcome = self.inbound.fill_from(&mut self.stream)?;
            while let Some((username, message)) = self.inbound.next_pair()? {
                drain
                    .messages
                    .push(RelayedMessage::from_frames(username, message));
            }

            match outcome {
                FillOutcome::EndOfStream => {
                    if !self.inbound.is_empty() {
                        tracing::debug!(
                            "Server closed mid-message, {} byte(s) discarded",
                            self.inbound.buffered()
                        );
                    }
                    drain.closed = true;
                    return Ok(drain);
                }
                FillOutcome::WouldBlock if self.inbound.is_empty() => return Ok(drain),
                FillOutcome::WouldBlock => thread::sleep(PAIR_RETRY_INTERVAL),
            }
        }
    }
}
