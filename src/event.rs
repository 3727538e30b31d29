//! Events delivered to the polling caller.

use crate::error::Error;
use bytes::Bytes;

/// Identifies one logical peer for the lifetime of one connection.
///
/// Server-side ids are minted from an atomic counter starting at 1. The
/// client always uses [`CLIENT_CONNECTION_ID`].
pub type ConnectionId = u32;

/// Connection id used by [`Client`](crate::Client) for its single connection,
/// and by both sides for errors that are not tied to an accepted connection.
pub const CLIENT_CONNECTION_ID: ConnectionId = 0;

/// Something that happened on a connection.
///
/// Per connection the order is always: one `Connected`, zero or more `Data`
/// in receipt order, then exactly one `Disconnected`. `Error` is only raised
/// for failures that happen before a connection exists (connect failures,
/// listener failures) and is tagged with id `0`.
#[derive(Debug)]
pub enum Event {
    /// The connection is established and can be sent to.
    Connected(ConnectionId),
    /// One complete message was received.
    Data(ConnectionId, Bytes),
    /// The connection is closed and its socket released.
    Disconnected(ConnectionId),
    /// A background operation failed.
    Error(ConnectionId, Error),
}

impl Event {
    /// The connection this event concerns.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Event::Connected(id)
            | Event::Data(id, _)
            | Event::Disconnected(id)
            | Event::Error(id, _) => *id,
        }
    }
}
