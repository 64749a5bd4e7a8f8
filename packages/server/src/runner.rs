//! Server execution logic.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::{error::ServerError, event_loop::EventLoop, poller::MioPoller};

/// Resolve `host:port` and bind the listening socket.
///
/// Port 0 picks a free port; read it back from the poller's `local_addr`.
pub fn bind_server(host: &str, port: u16) -> Result<EventLoop<MioPoller>, ServerError> {
    let addr = resolve(host, port)?;
    let poller = MioPoller::bind(addr)?;
    Ok(EventLoop::new(poller))
}

/// Run the chat relay server
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 1234)
pub fn run_server(host: String, port: u16) -> Result<(), ServerError> {
    let mut event_loop = bind_server(&host, port)?;

    tracing::info!(
        "Listening for connections on {}...",
        event_loop.poller().local_addr()
    );
    tracing::info!("Press Ctrl+C to stop");

    event_loop.run()
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let display = format!("{}:{}", host, port);
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            addr: display.clone(),
            source,
        })?;

    addrs.next().ok_or(ServerError::NoAddress(display))
}
