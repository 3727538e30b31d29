//! Live connection table for the server.
//!
//! Inserted into by the accept thread, removed from by each connection's
//! receive thread once it has finished, read by any caller thread.

use crate::event::{ConnectionId, CLIENT_CONNECTION_ID};
use crate::runtime::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe map from connection id to connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU32,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with the specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            max_connections,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint an id and insert the connection built for it.
    ///
    /// Returns `None` if the registry is at capacity. The counter wraps on
    /// overflow; ids still in use and the client id are skipped.
    pub fn register<F>(&self, build: F) -> Option<Arc<Connection>>
    where
        F: FnOnce(ConnectionId) -> Arc<Connection>,
    {
        let mut connections = self.write();
        if connections.len() >= self.max_connections {
            return None;
        }

        let id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != CLIENT_CONNECTION_ID && !connections.contains_key(&id) {
                break id;
            }
        };

        let conn = build(id);
        connections.insert(id, Arc::clone(&conn));
        Some(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.read().get(&id).cloned()
    }

    /// Remove `conn` if it is still the entry registered under its id.
    pub fn release(&self, conn: &Arc<Connection>) -> bool {
        let mut connections = self.write();
        match connections.get(&conn.id()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                connections.remove(&conn.id());
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Remove and return every connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.write().drain().map(|(_, conn)| conn).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;

    fn dummy(id: ConnectionId) -> Arc<Connection> {
        Connection::connecting(id, &TransportConfig::default())
    }

    #[test]
    fn test_connection_registry() {
        let registry = ConnectionRegistry::new(2);
        assert_eq!(registry.capacity(), 2);

        let c1 = registry.register(dummy).unwrap();
        let c2 = registry.register(dummy).unwrap();
        assert_eq!(c1.id(), 1);
        assert_eq!(c2.id(), 2);

        // At capacity
        assert!(registry.register(dummy).is_none());
        assert_eq!(registry.len(), 2);

        assert!(registry.release(&c1));
        assert!(!registry.contains(1));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(2).is_some());

        let c3 = registry.register(dummy).unwrap();
        assert_eq!(c3.id(), 3);
    }

    #[test]
    fn test_release_ignores_stale_entry() {
        let registry = ConnectionRegistry::new(usize::MAX);
        let conn = registry.register(dummy).unwrap();

        let impostor = dummy(conn.id());
        assert!(!registry.release(&impostor));
        assert!(registry.contains(conn.id()));
    }

    #[test]
    fn test_id_wraparound_skips_live_ids() {
        let registry = ConnectionRegistry::new(usize::MAX);
        let first = registry.register(dummy).unwrap();
        assert_eq!(first.id(), 1);

        registry.next_id.store(u32::MAX - 1, Ordering::Relaxed);
        let last = registry.register(dummy).unwrap();
        assert_eq!(last.id(), u32::MAX);

        // Wraps past 0 (the client id) and 1 (still live).
        let wrapped = registry.register(dummy).unwrap();
        assert_eq!(wrapped.id(), 2);
    }

    #[test]
    fn test_drain() {
        let registry = ConnectionRegistry::new(usize::MAX);
        registry.register(dummy).unwrap();
        registry.register(dummy).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
