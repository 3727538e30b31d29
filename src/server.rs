//! TCP server accepting many connections.
//!
//! The accept loop runs on its own thread. Every accepted socket gets a fresh
//! connection id, an entry in the connection table, a receive thread and a
//! send thread. A connection leaves the table only after its receive loop has
//! finished, including the `Disconnected` event.

use crate::config::TransportConfig;
use crate::error::Error;
use crate::event::{ConnectionId, Event, CLIENT_CONNECTION_ID};
use crate::runtime::{configure_socket, Connection, ConnectionRegistry};
use crate::transport::Transport;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Listen backlog for the accept socket.
const LISTEN_BACKLOG: i32 = 1024;

/// How long `stop` waits for its wake-up connection to the listener.
const WAKE_TIMEOUT: Duration = Duration::from_millis(100);

struct Listener {
    socket: Arc<Socket>,
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// TCP server exchanging length-prefixed messages with many clients.
pub struct Server {
    config: TransportConfig,
    events: Arc<Transport>,
    connections: Arc<ConnectionRegistry>,
    listener: Mutex<Option<Listener>>,
}

impl Server {
    pub fn new(config: TransportConfig) -> Self {
        let events = Arc::new(Transport::new(&config));
        let connections = Arc::new(ConnectionRegistry::new(config.max_connections));
        Self {
            config,
            events,
            connections,
            listener: Mutex::new(None),
        }
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind to `port` on all interfaces and start accepting in the background.
    ///
    /// Does nothing if the server is already active. Port `0` picks a free
    /// port; see [`Server::local_addr`]. Events still queued from a previous
    /// run are discarded.
    pub fn start(&self, port: u16) -> Result<(), Error> {
        let mut listener = self.lock_listener();
        if listener.as_ref().is_some_and(|l| !l.thread.is_finished()) {
            return Ok(());
        }
        if let Some(previous) = listener.take() {
            join_listener(previous.thread);
        }
        self.events.clear();

        info!(port, "Server starting");
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let socket = Arc::new(create_listener(addr, &self.config)?);
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| Error::InvalidAddress(addr.to_string()))?;

        let stopping = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("tickwire-listener".to_string())
            .spawn({
                let socket = Arc::clone(&socket);
                let stopping = Arc::clone(&stopping);
                let connections = Arc::clone(&self.connections);
                let events = Arc::clone(&self.events);
                let config = self.config.clone();
                move || accept_loop(&socket, &stopping, &connections, &events, &config)
            })?;

        info!(addr = %local_addr, "Server listening");
        *listener = Some(Listener {
            socket,
            local_addr,
            stopping,
            thread,
        });
        Ok(())
    }

    /// Stop accepting, close every live connection and join the listener.
    ///
    /// Does nothing if the server was never started.
    pub fn stop(&self) {
        let Some(listener) = self.lock_listener().take() else {
            return;
        };

        info!(addr = %listener.local_addr, "Server stopping");
        listener.stopping.store(true, Ordering::SeqCst);
        if let Err(e) = listener.socket.shutdown(Shutdown::Both) {
            trace!(error = %e, "Listener shutdown");
        }
        wake_listener(listener.local_addr);
        join_listener(listener.thread);
    }

    /// Queue one message for a connection.
    pub fn send(&self, id: ConnectionId, data: impl Into<Bytes>) -> Result<(), Error> {
        self.connections
            .get(id)
            .ok_or(Error::InvalidConnection { id })?
            .send(data.into())
    }

    /// Kick a connection. Its `Disconnected` event follows asynchronously.
    pub fn disconnect(&self, id: ConnectionId) -> Result<(), Error> {
        let connection = self
            .connections
            .get(id)
            .ok_or(Error::InvalidConnection { id })?;
        debug!(conn_id = id, "Disconnecting connection");
        connection.close();
        Ok(())
    }

    /// Pop the oldest pending event, if any. Never blocks.
    pub fn next_event(&self) -> Option<Event> {
        self.events.next_event()
    }

    /// Number of events waiting to be polled.
    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    /// Whether the accept loop is running.
    pub fn is_active(&self) -> bool {
        self.lock_listener()
            .as_ref()
            .is_some_and(|l| !l.thread.is_finished())
    }

    /// Address the listener is bound to, while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_listener().as_ref().map(|l| l.local_addr)
    }

    /// Number of connections currently in the table.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create the blocking accept socket.
fn create_listener(addr: SocketAddr, config: &TransportConfig) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(config.no_delay)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket)
}

/// Shutting a listening socket down unblocks `accept` on Linux but not
/// everywhere; a throwaway connection covers the rest.
fn wake_listener(local_addr: SocketAddr) {
    let mut target = local_addr;
    if target.ip().is_unspecified() {
        target.set_ip(match target {
            SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        });
    }
    if let Err(e) = TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
        trace!(error = %e, "Listener wake-up connect");
    }
}

fn join_listener(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        error!("Listener thread panicked");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

fn accept_loop(
    listener: &Socket,
    stopping: &AtomicBool,
    connections: &Arc<ConnectionRegistry>,
    events: &Arc<Transport>,
    config: &TransportConfig,
) {
    loop {
        let (socket, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if stopping.load(Ordering::SeqCst) => {
                debug!(error = %e, "Listener stopped");
                break;
            }
            Err(e) if is_transient(&e) => {
                debug!(error = %e, "Transient accept error");
                continue;
            }
            Err(e) => {
                error!(error = %e, "Listener failed");
                events.emit(Event::Error(CLIENT_CONNECTION_ID, Error::Io(e)));
                break;
            }
        };

        if stopping.load(Ordering::SeqCst) {
            break;
        }

        let peer = peer.as_socket();
        if let Err(e) = configure_socket(&socket, config) {
            debug!(?peer, error = %e, "Failed to configure accepted socket");
            continue;
        }

        let Some(connection) =
            connections.register(|id| Connection::accepted(id, socket, config))
        else {
            // No id was assigned, so no event: the socket is simply closed.
            info!(
                ?peer,
                max_connections = connections.capacity(),
                "Server too full, disconnected a client"
            );
            continue;
        };

        debug!(conn_id = connection.id(), ?peer, "Accepted connection");
        spawn_receiver(connection, connections, events);
    }

    // Close whatever is still alive, then wait for every receive loop to
    // finish so no worker outlives the listener.
    let live = connections.drain();
    for connection in &live {
        connection.close();
    }
    for connection in &live {
        connection.join_receiver();
    }
    debug!(closed = live.len(), "Accept loop finished");
}

fn spawn_receiver(
    connection: Arc<Connection>,
    connections: &Arc<ConnectionRegistry>,
    events: &Arc<Transport>,
) {
    let spawned = thread::Builder::new()
        .name(format!("tickwire-recv-{}", connection.id()))
        .spawn({
            let connection = Arc::clone(&connection);
            let connections = Arc::clone(connections);
            let events = Arc::clone(events);
            move || {
                connection.process_messages(&events);
                connections.release(&connection);
            }
        });

    match spawned {
        Ok(handle) => connection.set_receiver(handle),
        Err(e) => {
            error!(conn_id = connection.id(), error = %e, "Failed to spawn receive thread");
            connection.close();
            connections.release(&connection);
        }
    }
}
