//! Error type shared by the client, the server and the wire codec.

use crate::event::ConnectionId;
use thiserror::Error;

/// The error type for tickwire operations.
///
/// Only a handful of calls fail synchronously: sends on a known-invalid
/// target and configuration parsing. Everything that happens on a background
/// thread (connect failures, listener failures) reaches the caller as an
/// [`Event::Error`](crate::Event::Error) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Low-level I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client has no established connection to send on.
    #[error("Cannot send message, client not connected")]
    NotConnected,

    /// The connection id is unknown or the connection already closed.
    #[error("Invalid connection {id}")]
    InvalidConnection {
        /// The connection id that was rejected.
        id: ConnectionId,
    },

    /// The payload cannot be described by the 4-byte length header.
    #[error("Message of {len} bytes exceeds the maximum frame size")]
    MessageTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    /// The host/port pair did not resolve to any socket address.
    #[error("Could not resolve address '{0}'")]
    InvalidAddress(String),

    /// Configuration text could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}
