//! Thread-per-connection runtime.
//!
//! Shared building blocks for the client and the server:
//! - `SafeQueue`: FIFO with a blocking "not empty" wait
//! - `QueueWatch`: rate-limited queue depth warnings
//! - `Connection`: state machine plus blocking receive/send loops
//! - `ConnectionRegistry`: the server's live connection table

mod connection;
mod queue;
mod registry;
mod watch;

pub use connection::ConnState;

pub(crate) use connection::{configure_socket, Connection};
pub(crate) use queue::SafeQueue;
pub(crate) use registry::ConnectionRegistry;
pub(crate) use watch::QueueWatch;
