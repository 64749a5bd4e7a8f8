//! Connection registry: the authoritative table of connected identities.
//!
//! Owned and mutated only by the event loop, so no locking is involved.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    io::{self, Write},
    net::SocketAddr,
};

use irori_shared::frame::{Frame, FrameDecoder};

/// Identifier of one accepted connection.
///
/// Ids are handed out in increasing order, so iterating the registry by id
/// visits clients in the order they were accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered client.
///
/// The username frame is cached exactly as received and relayed as-is in
/// front of every message the client sends. Usernames never change after
/// registration.
pub struct ClientRecord<S> {
    stream: S,
    peer_addr: SocketAddr,
    username: Frame,
    inbound: FrameDecoder,
}

impl<S> ClientRecord<S> {
    pub fn new(stream: S, peer_addr: SocketAddr, username: Frame) -> Self {
        Self {
            stream,
            peer_addr,
            username,
            inbound: FrameDecoder::new(),
        }
    }

    /// Carry over bytes already buffered while waiting for the username.
    pub(crate) fn with_inbound(mut self, inbound: FrameDecoder) -> Self {
        self.inbound = inbound;
        self
    }

    pub fn username(&self) -> Cow<'_, str> {
        self.username.text()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub(crate) fn inbound_mut(&mut self) -> &mut FrameDecoder {
        &mut self.inbound
    }

    pub(crate) fn stream_and_inbound(&mut self) -> (&mut S, &mut FrameDecoder) {
        (&mut self.stream, &mut self.inbound)
    }
}

/// Result of relaying one message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the packet was written to
    pub delivered: usize,
    /// Recipients whose write failed
    pub failed: Vec<ConnectionId>,
}

/// Map of live connections to their client records
pub struct Registry<S> {
    clients: BTreeMap<ConnectionId, ClientRecord<S>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            clients: BTreeMap::new(),
        }
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new client.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered.
    pub fn register(&mut self, id: ConnectionId, record: ClientRecord<S>) {
        assert!(
            !self.clients.contains_key(&id),
            "connection {} registered twice",
            id
        );
        self.clients.insert(id, record);
    }

    /// Remove a client and hand back its record.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn unregister(&mut self, id: ConnectionId) -> ClientRecord<S> {
        self.clients
            .remove(&id)
            .unwrap_or_else(|| panic!("unregister of unknown connection {}", id))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ClientRecord<S>> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ClientRecord<S>> {
        self.clients.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.clients.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<S: Write> Registry<S> {
    /// Relay `message` from `sender` to every other registered client.
    ///
    /// Each recipient gets `username_frame || message_frame` in a single
    /// write. A failed write is logged and reported in `failed`, and the
    /// caller is expected to drop that recipient: part of the packet may
    /// already be on the wire.
    ///
    /// # Panics
    ///
    /// Panics if `sender` is not registered.
    pub fn broadcast(&mut self, sender: ConnectionId, message: &Frame) -> BroadcastReport {
        let sender_record = self
            .clients
            .get(&sender)
            .unwrap_or_else(|| panic!("broadcast from unknown connection {}", sender));

        let mut packet =
            Vec::with_capacity(sender_record.username.encoded_len() + message.encoded_len());
        sender_record.username.write_into(&mut packet);
        message.write_into(&mut packet);

        let mut report = BroadcastReport::default();
        for (id, record) in self.clients.iter_mut() {
            if *id == sender {
                continue;
            }

            match send_packet(&mut record.stream, &packet) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to relay message to '{}' ({}): {}",
                        record.username.text(),
                        id,
                        e
                    );
                    report.failed.push(*id);
                }
            }
        }

        report
    }
}

fn send_packet<S: Write>(stream: &mut S, packet: &[u8]) -> io::Result<()> {
    stream.write_all(packet)?;
    stream.flush()
}
