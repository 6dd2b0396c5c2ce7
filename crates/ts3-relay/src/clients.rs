//! Process-wide table of active relay sessions.
//!
//! Mutated only on WebSocket upgrade (insert) and stream teardown (remove),
//! per the concurrency model: a single mutex is enough at this scale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Opaque id of one relay session, assigned in insertion order.
pub type ConnId = u64;

/// What the table remembers about one session: just enough to log about it
/// on shutdown. The session's stream handle and UDP socket are owned by the
/// actor and the background forwarding task, not duplicated here.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Target host this session's UDP socket is connected to.
    pub host: String,
    /// Target port this session's UDP socket is connected to.
    pub port: u16,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: ConnId,
    clients: HashMap<ConnId, ClientInfo>,
}

/// Handle to the shared client table. Cheaply `Clone`able; all clones refer
/// to the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ClientTable {
    inner: Arc<Mutex<Inner>>,
}

impl ClientTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its id.
    #[must_use]
    pub fn insert(&self, host: String, port: u16) -> ConnId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        let _ = inner.clients.insert(id, ClientInfo { host, port });
        id
    }

    /// Removes a session, if still present.
    pub fn remove(&self, id: ConnId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let _ = inner.clients.remove(&id);
    }

    /// Number of currently active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clients
            .len()
    }

    /// Whether the table currently holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logs and drops every remaining session. Called once, at shutdown.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (id, client) in inner.clients.drain() {
            voicebeacon_log::log::info!(
                "Closing relay session {} ({}:{}) at shutdown",
                id,
                client.host,
                client.port
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_increasing_ids_and_tracks_len() {
        let table = ClientTable::new();
        let a = table.insert("127.0.0.1".to_string(), 9987);
        let b = table.insert("127.0.0.1".to_string(), 9988);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        table.remove(a);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());

        table.remove(b);
        assert!(table.is_empty());
    }

    #[test]
    fn close_all_empties_the_table() {
        let table = ClientTable::new();
        let _ = table.insert("10.0.0.1".to_string(), 1);
        let _ = table.insert("10.0.0.2".to_string(), 2);
        table.close_all();
        assert!(table.is_empty());
    }
}
