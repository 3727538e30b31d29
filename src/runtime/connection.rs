//! Connection state machine and its blocking I/O loops.
//!
//! Each connection owns one socket, one receive loop (run on the thread that
//! calls [`Connection::process_messages`]) and one send thread. The life
//! cycle is strictly `Connecting -> Connected -> Disconnected`; a closed
//! connection is never revived, a reconnect builds a new one.
//!
//! Cancellation is done by closing: [`Connection::close`] shuts the socket
//! down, which unblocks a pending read or write with EOF or an I/O error, and
//! closes the send queue, which wakes a parked send thread.

use crate::config::TransportConfig;
use crate::error::Error;
use crate::event::{ConnectionId, Event};
use crate::protocol;
use crate::runtime::{QueueWatch, SafeQueue};
use crate::transport::Transport;
use bytes::Bytes;
use socket2::Socket;
use std::io;
use std::net::Shutdown;
use std::sync::atomic::{fence, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// A connect attempt is in flight.
    Connecting = 0,
    /// The socket is open and the I/O loops are running.
    Connected = 1,
    /// Terminal state.
    Disconnected = 2,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::Connecting,
            1 => ConnState::Connected,
            _ => ConnState::Disconnected,
        }
    }
}

/// A single peer connection.
pub struct Connection {
    id: ConnectionId,
    /// Set once: at construction for accepted sockets, after name resolution
    /// for outgoing ones.
    socket: OnceLock<Socket>,
    status: AtomicU8,
    send_queue: SafeQueue<Bytes>,
    send_watch: QueueWatch,
    sender: Mutex<Option<JoinHandle<()>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

/// Apply the per-socket options from the config.
pub(crate) fn configure_socket(socket: &Socket, config: &TransportConfig) -> io::Result<()> {
    socket.set_nodelay(config.no_delay)?;
    socket.set_write_timeout(config.send_timeout())?;
    Ok(())
}

impl Connection {
    fn new(
        id: ConnectionId,
        status: ConnState,
        socket: OnceLock<Socket>,
        config: &TransportConfig,
    ) -> Self {
        Self {
            id,
            socket,
            status: AtomicU8::new(status as u8),
            send_queue: SafeQueue::new(),
            send_watch: QueueWatch::new(
                "send",
                config.queue_warning_threshold,
                config.queue_warning_interval(),
            ),
            sender: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    /// Create an outgoing connection that has not opened its socket yet.
    pub fn connecting(id: ConnectionId, config: &TransportConfig) -> Arc<Self> {
        Arc::new(Self::new(id, ConnState::Connecting, OnceLock::new(), config))
    }

    /// Wrap an accepted socket. Accepted connections start out connected.
    pub fn accepted(id: ConnectionId, socket: Socket, config: &TransportConfig) -> Arc<Self> {
        Arc::new(Self::new(
            id,
            ConnState::Connected,
            OnceLock::from(socket),
            config,
        ))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn status(&self) -> ConnState {
        ConnState::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnState::Connected
    }

    /// Hand the freshly opened socket of an outgoing connection over.
    ///
    /// Returns `None` if the connection was closed first. Either `close` finds
    /// the socket and shuts it down, or this call sees `Disconnected`.
    pub fn attach(&self, socket: Socket) -> Option<&Socket> {
        let socket = self.socket.get_or_init(|| socket);
        fence(Ordering::SeqCst);
        (self.status() != ConnState::Disconnected).then_some(socket)
    }

    /// `Connecting -> Connected`. Fails if the connection was closed meanwhile.
    pub fn mark_connected(&self) -> bool {
        self.transition(ConnState::Connecting, ConnState::Connected)
    }

    /// `Connecting -> Disconnected`. Fails if the connection was closed meanwhile.
    pub fn abort_connect(&self) -> bool {
        self.transition(ConnState::Connecting, ConnState::Disconnected)
    }

    fn transition(&self, from: ConnState, to: ConnState) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Queue one payload for the send thread.
    ///
    /// Write failures are observed by the send thread, not here.
    pub fn send(&self, payload: Bytes) -> Result<(), Error> {
        if payload.len() > protocol::MAX_PAYLOAD_LEN {
            return Err(Error::MessageTooLarge { len: payload.len() });
        }
        if !self.is_connected() || !self.send_queue.enqueue(payload) {
            return Err(Error::InvalidConnection { id: self.id });
        }
        Ok(())
    }

    /// Shut the socket down and mark the connection disconnected.
    ///
    /// Safe from any thread, any number of times. Errors from an already
    /// broken socket are discarded.
    pub fn close(&self) {
        self.status
            .store(ConnState::Disconnected as u8, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        if let Some(socket) = self.socket.get() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                trace!(conn_id = self.id, error = %e, "Shutdown on closed socket");
            }
        }
        self.send_queue.close();
    }

    /// Run the receive loop on the current thread until the connection ends.
    ///
    /// Raises `Connected` once, `Data` per frame, and exactly one
    /// `Disconnected` after the socket is fully closed and the send thread
    /// joined, so a caller reacting to it can reconnect right away.
    pub fn process_messages(self: &Arc<Self>, events: &Transport) {
        let Some(socket) = self.socket.get() else {
            warn!(conn_id = self.id, "Receive loop started without a socket");
            self.close();
            return;
        };

        if let Err(e) = self.spawn_sender() {
            error!(conn_id = self.id, error = %e, "Failed to spawn send thread");
            self.close();
            events.emit(Event::Error(self.id, Error::Io(e)));
            return;
        }

        events.emit(Event::Connected(self.id));

        let mut reader = socket;
        loop {
            match protocol::read_frame(&mut reader) {
                Ok(Some(payload)) => events.emit(Event::Data(self.id, payload)),
                Ok(None) => {
                    debug!(conn_id = self.id, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    // A closed socket ends up here too; that's a normal exit.
                    debug!(conn_id = self.id, error = %e, "Receive loop finished");
                    break;
                }
            }
        }

        self.close();
        join_worker(&self.sender, self.id, "send");
        events.emit(Event::Disconnected(self.id));
    }

    fn spawn_sender(self: &Arc<Self>) -> io::Result<()> {
        let conn = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("tickwire-send-{}", self.id))
            .spawn(move || conn.send_loop())?;

        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn send_loop(&self) {
        let Some(socket) = self.socket.get() else {
            return;
        };
        let mut writer = socket;

        loop {
            self.send_watch.check(self.send_queue.len());

            for payload in self.send_queue.drain() {
                if let Err(e) = protocol::write_frame(&mut writer, &payload) {
                    // The receive loop sees the shutdown and reports the disconnect.
                    debug!(conn_id = self.id, error = %e, "Send failed, closing connection");
                    self.close();
                    return;
                }
            }

            if !self.send_queue.wait_not_empty() {
                trace!(conn_id = self.id, "Send loop finished");
                return;
            }
        }
    }

    /// Remember the thread running this connection's receive loop.
    pub fn set_receiver(&self, handle: JoinHandle<()>) {
        *self.receiver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Wait for the receive thread to exit. Call only after `close`.
    pub fn join_receiver(&self) {
        join_worker(&self.receiver, self.id, "receive");
    }
}

fn join_worker(slot: &Mutex<Option<JoinHandle<()>>>, conn_id: ConnectionId, role: &str) {
    let handle = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    let Some(handle) = handle else {
        return;
    };

    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        error!(conn_id, role, "Connection thread panicked");
    }
}
