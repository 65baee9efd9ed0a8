//! DHCP static-binding synchronization.
//!
//! Derives lease parameters from subnet metadata and pushes/retracts
//! bindings in the DHCP store. DHCP state must never silently drift from
//! forwarding state: an unresolvable subnet fails the registration loudly
//! instead of skipping it.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, instrument};

use switchsync_common::{SyncError, SyncResult};

use crate::backend::{DhcpOptions, DhcpStore};
use crate::directory::DirectoryClient;
use crate::types::TenantPort;

/// Public resolver used when a subnet declares no DNS servers.
pub const FALLBACK_DNS_SERVER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// Computes the subnet mask for a CIDR prefix length (0–32).
pub fn mask_from_prefix(prefix: u8) -> Ipv4Addr {
    let bits = match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    };
    Ipv4Addr::from(bits)
}

/// Splits a CIDR string into its address and prefix length.
pub fn parse_cidr(cidr: &str) -> SyncResult<(Ipv4Addr, u8)> {
    let malformed = |message: &str| SyncError::malformed_field("cidr", cidr, message);

    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| malformed("missing prefix length"))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| malformed("invalid network address"))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| malformed("invalid prefix length"))?;
    if prefix > 32 {
        return Err(malformed("prefix length out of range"));
    }
    Ok((addr, prefix))
}

/// Pushes and retracts DHCP static bindings derived from subnet metadata.
pub struct DhcpBindingSynchronizer {
    store: Arc<dyn DhcpStore>,
}

impl DhcpBindingSynchronizer {
    /// Creates a synchronizer over the given binding store.
    pub fn new(store: Arc<dyn DhcpStore>) -> Self {
        Self { store }
    }

    /// Registers a static, authoritative binding for a tenant port.
    ///
    /// Requires the port to carry at least one fixed IP and its network to
    /// have a resolvable subnet. The gateway address doubles as the DHCP
    /// server address. Only the first configured DNS server is honored;
    /// a subnet without DNS servers falls back to [`FALLBACK_DNS_SERVER`].
    #[instrument(skip(self, directory, port), fields(port = %port.id, mac = %port.mac_address))]
    pub async fn register(
        &self,
        directory: &dyn DirectoryClient,
        port: &TenantPort,
    ) -> SyncResult<()> {
        let host_ip = port.host_ip().ok_or_else(|| {
            SyncError::internal(format!("tenant port {} has no fixed IP", port.id))
        })?;

        let subnets = directory.subnets().await?;
        let subnet = subnets
            .iter()
            .find(|s| s.network_id == port.network_id)
            .ok_or_else(|| SyncError::subnet_not_found(&port.network_id))?;

        let (_, prefix) = parse_cidr(&subnet.cidr)?;
        let options = DhcpOptions {
            subnet_mask: mask_from_prefix(prefix),
            dhcp_server: subnet.gateway_ip,
            gateway: subnet.gateway_ip,
            domain_server: subnet
                .dns_nameservers
                .first()
                .copied()
                .unwrap_or(FALLBACK_DNS_SERVER),
        };

        self.store
            .set_binding(&port.mac_address, host_ip, true, &options)
            .await?;
        debug!("Registered DHCP binding {} -> {}", port.mac_address, host_ip);
        Ok(())
    }

    /// Retracts the binding for a MAC. Unknown MACs are a no-op.
    pub async fn unregister(&self, mac: &str) -> SyncResult<()> {
        self.store.remove_binding(mac).await
    }
}
