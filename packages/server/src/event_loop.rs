//! Single-threaded event loop of the relay server.
//!
//! Each turn cycles through three states:
//!
//! 1. wait for readiness on the listener and every watched connection
//! 2. process the readable set: accept new connections, read frames and relay them
//! 3. process the exceptional set: drop the affected connections
//!
//! A freshly accepted connection is watched immediately but only enters the
//! [`Registry`] once its first frame (the username) is complete. Until then
//! it receives nothing.

use std::{collections::BTreeMap, io, net::SocketAddr};

use irori_shared::frame::{FillOutcome, Frame, FrameDecoder};

use crate::{
    error::ServerError,
    poller::{Poller, Source},
    registry::{ClientRecord, ConnectionId, Registry},
};

/// Accepted connection still waiting for its username frame
struct Handshake<S> {
    stream: S,
    peer_addr: SocketAddr,
    inbound: FrameDecoder,
}

pub struct EventLoop<P: Poller> {
    poller: P,
    registry: Registry<P::Stream>,
    handshakes: BTreeMap<ConnectionId, Handshake<P::Stream>>,
    next_id: usize,
}

impl<P: Poller> EventLoop<P> {
    pub fn new(poller: P) -> Self {
        Self {
            poller,
            registry: Registry::new(),
            handshakes: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    pub fn registry(&self) -> &Registry<P::Stream> {
        &self.registry
    }

    /// Connections accepted but not yet identified
    pub fn pending_handshakes(&self) -> usize {
        self.handshakes.len()
    }

    /// Run until the listener or the readiness wait fails.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            self.turn()?;
        }
    }

    /// One wait / process / cleanup cycle.
    pub fn turn(&mut self) -> Result<(), ServerError> {
        let ready = self.poller.wait().map_err(ServerError::Poll)?;

        for source in &ready.readable {
            match *source {
                Source::Listener => self.accept_pending()?,
                Source::Client(id) => self.read_ready(id),
            }
        }

        for &id in &ready.exceptional {
            self.drop_exceptional(id);
        }

        Ok(())
    }

    fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn accept_pending(&mut self) -> Result<(), ServerError> {
        while let Some((mut stream, peer_addr)) =
            self.poller.accept().map_err(ServerError::Accept)?
        {
            let id = self.allocate_id();
            if let Err(e) = self.poller.watch(id, &mut stream) {
                tracing::warn!("Failed to watch connection from {}: {}", peer_addr, e);
                continue;
            }

            tracing::debug!("Accepted connection {} from {}", id, peer_addr);
            self.handshakes.insert(
                id,
                Handshake {
                    stream,
                    peer_addr,
                    inbound: FrameDecoder::new(),
                },
            );
            // The username usually arrives right behind the connect.
            self.continue_handshake(id);
        }

        Ok(())
    }

    fn read_ready(&mut self, id: ConnectionId) {
        if self.registry.contains(id) {
            self.read_client(id);
        } else if self.handshakes.contains_key(&id) {
            self.continue_handshake(id);
        } else {
            tracing::trace!("Ignoring readiness of closed connection {}", id);
        }
    }

    fn continue_handshake(&mut self, id: ConnectionId) {
        let Some(mut handshake) = self.handshakes.remove(&id) else {
            return;
        };

        let outcome = handshake.inbound.fill_from(&mut handshake.stream);
        let username = match handshake.inbound.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                match outcome {
                    Ok(FillOutcome::WouldBlock) => {
                        self.handshakes.insert(id, handshake);
                    }
                    Ok(FillOutcome::EndOfStream) => {
                        tracing::debug!(
                            "Connection {} from {} closed before sending a username",
                            id,
                            handshake.peer_addr
                        );
                        self.discard(id, handshake.stream);
                    }
                    Err(e) => {
                        tracing::debug!(
                            "Read error on connection {} from {}: {}",
                            id,
                            handshake.peer_addr,
                            e
                        );
                        self.discard(id, handshake.stream);
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(
                    "Dropping connection {} from {}: {}",
                    id,
                    handshake.peer_addr,
                    e
                );
                self.discard(id, handshake.stream);
                return;
            }
        };

        tracing::info!(
            "Accepted new connection from {}, username: {}",
            handshake.peer_addr,
            username.text()
        );
        let record = ClientRecord::new(handshake.stream, handshake.peer_addr, username)
            .with_inbound(handshake.inbound);
        self.registry.register(id, record);

        // Messages sent in the same burst as the username are already buffered.
        self.relay_buffered(id, outcome);
    }

    fn read_client(&mut self, id: ConnectionId) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };

        let (stream, inbound) = record.stream_and_inbound();
        let outcome = inbound.fill_from(stream);
        self.relay_buffered(id, outcome);
    }

    /// Relay every complete frame buffered for `id`, then act on how the read ended.
    fn relay_buffered(&mut self, id: ConnectionId, outcome: io::Result<FillOutcome>) {
        loop {
            let Some(record) = self.registry.get_mut(id) else {
                return;
            };

            match record.inbound_mut().next_frame() {
                Ok(Some(message)) => self.relay(id, &message),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Framing error from '{}': {}", record.username(), e);
                    self.disconnect(id);
                    return;
                }
            }
        }

        match outcome {
            Ok(FillOutcome::WouldBlock) => {}
            Ok(FillOutcome::EndOfStream) => self.disconnect(id),
            Err(e) => {
                tracing::debug!("Read error on connection {}: {}", id, e);
                self.disconnect(id);
            }
        }
    }

    fn relay(&mut self, sender: ConnectionId, message: &Frame) {
        if let Some(record) = self.registry.get(sender) {
            tracing::info!(
                "Received message from {}: {}",
                record.username(),
                message.text()
            );
        }

        let report = self.registry.broadcast(sender, message);
        tracing::debug!(
            "Relayed message from {} to {} client(s), {} failed",
            sender,
            report.delivered,
            report.failed.len()
        );

        // A failed write may have left a partial packet on the wire, so the
        // recipient's framing can no longer be trusted.
        for id in report.failed {
            if self.registry.contains(id) {
                tracing::debug!("Dropping connection {} after a failed write", id);
                self.disconnect(id);
            }
        }
    }

    fn drop_exceptional(&mut self, id: ConnectionId) {
        // Already gone if the readable pass saw the same fault.
        if self.registry.contains(id) {
            tracing::debug!("Exceptional condition on connection {}", id);
            self.disconnect(id);
        } else if let Some(handshake) = self.handshakes.remove(&id) {
            tracing::debug!(
                "Exceptional condition on connection {} from {} before it sent a username",
                id,
                handshake.peer_addr
            );
            self.discard(id, handshake.stream);
        }
    }

    fn disconnect(&mut self, id: ConnectionId) {
        let mut record = self.registry.unregister(id);
        let leftover = record.inbound_mut().buffered();
        if leftover > 0 {
            tracing::debug!("Discarding {} unread byte(s) from {}", leftover, id);
        }
        tracing::info!(
            "Closed connection from: {} ({})",
            record.username(),
            record.peer_addr()
        );

        if let Err(e) = self.poller.unwatch(id, record.stream_mut()) {
            tracing::debug!("Failed to unwatch connection {}: {}", id, e);
        }
    }

    fn discard(&mut self, id: ConnectionId, mut stream: P::Stream) {
        if let Err(e) = self.poller.unwatch(id, &mut stream) {
            tracing::debug!("Failed to unwatch connection {}: {}", id, e);
        }
    }
}
