//! Port-state registry.
//!
//! The single source of truth for "what forwarding state is currently
//! believed installed". Keyed by switch-port name; at most one record per
//! key. Entries are created on first successful rule installation and
//! removed on explicit teardown; removal plus re-creation is the only
//! update path, records are never mutated in place.
//!
//! The registry is mutated only from the two serialized processing lanes;
//! the lock below exists so reads from outside the lanes (administrative
//! queries) can take point-in-time snapshots while an event is in flight.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::InstalledPortState;

/// In-memory map from switch-port name to installed forwarding state.
#[derive(Debug, Default)]
pub struct PortStateRegistry {
    inner: RwLock<HashMap<String, InstalledPortState>>,
}

impl PortStateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records installed state for a port unless one is already recorded.
    ///
    /// Returns true if the record was inserted, false if an entry already
    /// existed (the existing record is left unchanged).
    pub async fn insert_if_absent(&self, port_name: &str, state: InstalledPortState) -> bool {
        let mut inner = self.inner.write().await;
        if inner.contains_key(port_name) {
            return false;
        }
        inner.insert(port_name.to_string(), state);
        true
    }

    /// Removes and returns the record for a port, if any.
    pub async fn remove(&self, port_name: &str) -> Option<InstalledPortState> {
        self.inner.write().await.remove(port_name)
    }

    /// Returns a copy of the record for a port, if any.
    pub async fn get(&self, port_name: &str) -> Option<InstalledPortState> {
        self.inner.read().await.get(port_name).cloned()
    }

    /// Returns true if a record exists for the port.
    pub async fn contains(&self, port_name: &str) -> bool {
        self.inner.read().await.contains_key(port_name)
    }

    /// Returns a point-in-time snapshot of all records.
    ///
    /// Callers must tolerate concurrent mutation after the snapshot is
    /// taken; a read-then-write against the registry is not atomic.
    pub async fn snapshot(&self) -> HashMap<String, InstalledPortState> {
        self.inner.read().await.clone()
    }

    /// Returns the number of recorded ports.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns true if no port is recorded.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
