//! Client side: a single outgoing connection.
//!
//! The client behaves like a server with exactly one connection whose id is
//! always [`CLIENT_CONNECTION_ID`]. `connect` returns immediately; the
//! blocking connect and the receive loop run on a background thread that
//! `disconnect` joins, so a following `connect` can never race with the
//! previous session's teardown.

use crate::config::TransportConfig;
use crate::error::Error;
use crate::event::{Event, CLIENT_CONNECTION_ID};
use crate::runtime::{configure_socket, ConnState, Connection};
use crate::transport::Transport;
use bytes::Bytes;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

struct Session {
    connection: Arc<Connection>,
    thread: JoinHandle<()>,
}

impl Session {
    fn join(self) {
        if self.thread.join().is_err() {
            error!("Client thread panicked");
        }
    }
}

/// TCP client exchanging length-prefixed messages with one server.
pub struct Client {
    config: TransportConfig,
    events: Arc<Transport>,
    session: Mutex<Option<Session>>,
}

impl Client {
    pub fn new(config: TransportConfig) -> Self {
        let events = Arc::new(Transport::new(&config));
        Self {
            config,
            events,
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start connecting to `host:port` in the background.
    ///
    /// Does nothing unless the client is disconnected. The outcome arrives as
    /// `Event::Connected(0)` or `Event::Error(0, _)`. Events still queued from
    /// a previous session are discarded.
    ///
    /// Fails only if the background thread cannot be spawned.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), Error> {
        let mut session = self.lock_session();
        if let Some(current) = session.as_ref() {
            if current.connection.status() != ConnState::Disconnected {
                return Ok(());
            }
        }

        // The previous session ended on its own; reap its thread before its
        // last events can be confused with ours.
        if let Some(previous) = session.take() {
            previous.join();
        }
        self.events.clear();

        let connection = Connection::connecting(CLIENT_CONNECTION_ID, &self.config);
        let spawned = thread::Builder::new()
            .name("tickwire-client".to_string())
            .spawn({
                let connection = Arc::clone(&connection);
                let events = Arc::clone(&self.events);
                let config = self.config.clone();
                let host = host.to_string();
                move || run_session(&connection, &host, port, &events, &config)
            });

        match spawned {
            Ok(thread) => {
                debug!(host, port, "Client connecting");
                *session = Some(Session { connection, thread });
                Ok(())
            }
            Err(e) => {
                connection.close();
                Err(Error::Io(e))
            }
        }
    }

    /// Close the connection and wait for the background thread to exit.
    ///
    /// Blocks only as long as it takes a pending connect, read or write to
    /// return after the socket is shut down.
    pub fn disconnect(&self) {
        let mut session = self.lock_session();
        if let Some(current) = session.take() {
            current.connection.close();
            current.join();
            debug!("Client disconnected");
        }
    }

    /// Queue one message for the server.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        let connection = self
            .lock_session()
            .as_ref()
            .map(|session| Arc::clone(&session.connection))
            .ok_or(Error::NotConnected)?;

        if !connection.is_connected() {
            return Err(Error::NotConnected);
        }
        connection.send(data.into()).map_err(|e| match e {
            Error::InvalidConnection { .. } => Error::NotConnected,
            other => other,
        })
    }

    /// Pop the oldest pending event, if any. Never blocks.
    pub fn next_event(&self) -> Option<Event> {
        self.events.next_event()
    }

    /// Number of events waiting to be polled.
    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    pub fn status(&self) -> ConnState {
        self.lock_session()
            .as_ref()
            .map_or(ConnState::Disconnected, |session| session.connection.status())
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status() == ConnState::Connecting
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Background thread body: connect, then run the receive loop.
fn run_session(
    connection: &Arc<Connection>,
    host: &str,
    port: u16,
    events: &Transport,
    config: &TransportConfig,
) {
    match establish(connection, host, port, config) {
        Ok(true) => {
            info!(host, port, "Client connected");
            connection.process_messages(events);
        }
        Ok(false) => {
            debug!(host, port, "Connect abandoned after disconnect");
            connection.close();
        }
        Err(e) => {
            // Only report failures the caller did not cause by disconnecting.
            let reported = connection.abort_connect();
            connection.close();
            if reported {
                info!(host, port, error = %e, "Client failed to connect");
                events.emit(Event::Error(CLIENT_CONNECTION_ID, e));
            } else {
                debug!(host, port, error = %e, "Connect aborted by disconnect");
            }
        }
    }
}

/// Resolve, open a socket and connect. Returns `false` if the connection was
/// closed before or while the connect was in flight.
fn establish(
    connection: &Connection,
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<bool, Error> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{host}:{port}")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    // SO_SNDTIMEO also bounds connect on Linux, so the write timeout waits
    // until the connection is up.
    socket.set_nodelay(config.no_delay)?;
    let Some(socket) = connection.attach(socket) else {
        return Ok(false);
    };

    let addr = SockAddr::from(addr);
    match config.connect_timeout() {
        Some(timeout) => socket.connect_timeout(&addr, timeout)?,
        None => socket.connect(&addr)?,
    }
    configure_socket(socket, config)?;

    Ok(connection.mark_connected())
}
