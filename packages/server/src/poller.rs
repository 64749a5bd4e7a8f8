//! Readiness multiplexing over the listening socket and all client sockets.
//!
//! The event loop only talks to the [`Poller`] trait; [`MioPoller`] is the
//! production implementation on top of `mio`.

use std::{
    io::{self, ErrorKind, Read, Write},
    net::SocketAddr,
};

use mio::{
    Events, Interest, Poll, Token,
    net::{TcpListener, TcpStream},
};

use crate::{error::ServerError, registry::ConnectionId};

/// Token reserved for the listening socket
const LISTENER_TOKEN: Token = Token(usize::MAX);

const EVENT_CAPACITY: usize = 1024;

/// Something reported ready for reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Listener,
    Client(ConnectionId),
}

/// Snapshot of one readiness wait.
///
/// The event loop iterates this owned snapshot, so the watch set can change
/// while the results of the same pass are being processed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadySet {
    pub readable: Vec<Source>,
    pub exceptional: Vec<ConnectionId>,
}

/// A readiness source the event loop blocks on.
pub trait Poller {
    type Stream: Read + Write;

    /// Block until the listener or at least one watched stream is ready.
    fn wait(&mut self) -> io::Result<ReadySet>;

    /// Accept one pending connection, `Ok(None)` if none is pending.
    fn accept(&mut self) -> io::Result<Option<(Self::Stream, SocketAddr)>>;

    /// Add a client stream to the watch set.
    fn watch(&mut self, id: ConnectionId, stream: &mut Self::Stream) -> io::Result<()>;

    /// Remove a client stream from the watch set.
    fn unwatch(&mut self, id: ConnectionId, stream: &mut Self::Stream) -> io::Result<()>;
}

/// `mio` backed poller owning the listening socket.
///
/// `mio` reports readiness edge-triggered: the event loop has to read a
/// readable socket until it would block, or the remaining data goes unnoticed.
pub struct MioPoller {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MioPoller {
    /// Bind the listening socket and start watching it.
    pub fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let bind_error = |source| ServerError::Bind { addr, source };

        let poll = Poll::new().map_err(bind_error)?;
        let mut listener = TcpListener::bind(addr).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(bind_error)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Poller for MioPoller {
    type Stream = TcpStream;

    fn wait(&mut self) -> io::Result<ReadySet> {
        loop {
            match self.poll.poll(&mut self.events, None) {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let mut ready = ReadySet::default();
        for event in self.events.iter() {
            if event.token() == LISTENER_TOKEN {
                ready.readable.push(Source::Listener);
                continue;
            }

            let id = ConnectionId::new(event.token().0);
            if event.is_readable() || event.is_read_closed() {
                ready.readable.push(Source::Client(id));
            }
            if event.is_error() {
                ready.exceptional.push(id);
            }
        }

        Ok(ready)
    }

    fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok(accepted) => return Ok(Some(accepted)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn watch(&mut self, id: ConnectionId, stream: &mut TcpStream) -> io::Result<()> {
        self.poll
            .registry()
            .register(stream, Token(id.as_usize()), Interest::READABLE)
    }

    fn unwatch(&mut self, _id: ConnectionId, stream: &mut TcpStream) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }
}
