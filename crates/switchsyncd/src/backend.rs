//! Collaborator traits for the forwarding backend, the DHCP binding store,
//! and the inbound ARP handler.
//!
//! All three are external systems. The forwarding backend is device/driver
//! specific and idempotent by contract; the core assumes repeated install
//! or remove calls for the same port are safe.

use std::net::Ipv4Addr;

use async_trait::async_trait;

use switchsync_common::SyncResult;

use crate::types::InstalledPortState;

/// Context handed to the forwarding backend for rule (un)installation.
///
/// Opaque to the core: the backend decides how it maps to concrete rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    /// Segmentation identifier of the owning tenant network.
    pub segmentation_id: u32,
    /// Host IP of the tenant port, if any.
    pub host_ip: Option<Ipv4Addr>,
    /// Host MAC of the tenant port.
    pub host_mac: String,
}

impl From<&InstalledPortState> for RuleContext {
    fn from(state: &InstalledPortState) -> Self {
        Self {
            segmentation_id: state.segmentation_id,
            host_ip: state.host_ip,
            host_mac: state.host_mac.clone(),
        }
    }
}

/// Applies and retracts forwarding rules on a switch.
#[async_trait]
pub trait ForwardingBackend: Send + Sync {
    /// Installs the forwarding rules for one switch port.
    async fn install(&self, device: &str, port_name: &str, ctx: &RuleContext) -> SyncResult<()>;

    /// Removes the forwarding rules for one switch port.
    async fn remove(&self, device: &str, port_name: &str, ctx: &RuleContext) -> SyncResult<()>;
}

/// DHCP option data attached to a static binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpOptions {
    /// Subnet mask derived from the subnet CIDR.
    pub subnet_mask: Ipv4Addr,
    /// DHCP server address (the subnet gateway).
    pub dhcp_server: Ipv4Addr,
    /// Default gateway address.
    pub gateway: Ipv4Addr,
    /// Domain name server address.
    pub domain_server: Ipv4Addr,
}

/// Static MAC-to-IP lease store.
#[async_trait]
pub trait DhcpStore: Send + Sync {
    /// Pushes a static binding for a MAC. An authoritative binding always
    /// overrides any dynamic lease for that MAC.
    async fn set_binding(
        &self,
        mac: &str,
        ip: Ipv4Addr,
        authoritative: bool,
        options: &DhcpOptions,
    ) -> SyncResult<()>;

    /// Retracts the binding for a MAC. Retracting an unknown MAC is a no-op.
    async fn remove_binding(&self, mac: &str) -> SyncResult<()>;
}

/// Consumer of inbound ARP frames.
///
/// ARP resolution is not a reconciliation concern; the handler is an opaque
/// handle rebuilt together with the directory client on reconfiguration.
pub trait ArpHandler: Send + Sync {
    /// Processes one inbound ARP frame.
    fn process_packet(&self, frame: &[u8]);
}
