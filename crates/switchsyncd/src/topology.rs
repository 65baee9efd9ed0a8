//! Read-only view of the current switch topology.

use async_trait::async_trait;

use crate::types::SwitchPort;

/// Snapshot access to currently known switches and their ports.
///
/// Backed by the platform's topology store; the synchronizer only reads it
/// during full resync and router-port teardown.
#[async_trait]
pub trait TopologyView: Send + Sync {
    /// Returns the identities of all currently known switches.
    async fn devices(&self) -> Vec<String>;

    /// Returns the ports of one switch. Unknown devices yield an empty list.
    async fn ports(&self, device: &str) -> Vec<SwitchPort>;
}
