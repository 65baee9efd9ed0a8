//! Tenant-network model and installed-state types.
//!
//! Tenant entities (`TenantPort`, `TenantNetwork`, `TenantSubnet`) are
//! immutable snapshots fetched on demand from the directory; the core never
//! caches them. [`InstalledPortState`] is the registry's record of forwarding
//! state believed installed on a switch.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use switchsync_common::{SyncError, SyncResult};

/// Device-owner tag marking a tenant port as a network gateway port.
///
/// Gateway-owned ports are handled by the routing layer and excluded from
/// automatic forwarding-rule installation and DHCP registration.
pub const DEVICE_OWNER_GATEWAY: &str = "network:router_gateway";

/// A fixed IP assignment on a tenant port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    /// The subnet the assignment belongs to.
    pub subnet_id: String,
    /// The assigned address.
    pub ip_address: Ipv4Addr,
}

/// A port in the external tenant-network model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPort {
    /// Port identity (UUID string).
    pub id: String,
    /// Owning tenant-network identity.
    pub network_id: String,
    /// Role tag ("compute:nova", "network:router_interface", ...).
    #[serde(default)]
    pub device_owner: String,
    /// Fixed IP assignments (possibly empty for gateway-owned ports).
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    /// MAC address ("fa:16:3e:..." form).
    pub mac_address: String,
}

impl TenantPort {
    /// Returns true if this port is owned by a network gateway.
    pub fn is_gateway(&self) -> bool {
        self.device_owner == DEVICE_OWNER_GATEWAY
    }

    /// Returns the first fixed IP, if any.
    ///
    /// Router/gateway-owned ports may legitimately have none.
    pub fn host_ip(&self) -> Option<Ipv4Addr> {
        self.fixed_ips.first().map(|f| f.ip_address)
    }
}

/// A network in the external tenant-network model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNetwork {
    /// Network identity (UUID string).
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Encapsulation type ("vxlan", "vlan", ...).
    #[serde(default)]
    pub network_type: String,
    /// Segmentation identifier as carried on the wire; see
    /// [`TenantNetwork::segmentation_id`] for the parsed form.
    pub segment_id: String,
    /// Owning tenant.
    #[serde(default)]
    pub tenant_id: String,
    /// Associated subnets. Empty on plain directory fetches; populated by
    /// the composed network query view.
    #[serde(default)]
    pub subnets: Vec<TenantSubnet>,
}

impl TenantNetwork {
    /// Parses the segmentation identifier (overlay/tunnel key).
    ///
    /// A malformed value is a per-network error that aborts only the
    /// operation in progress.
    pub fn segmentation_id(&self) -> SyncResult<u32> {
        self.segment_id.trim().parse::<u32>().map_err(|err| {
            SyncError::malformed_field("segment_id", &self.segment_id, err.to_string())
        })
    }
}

/// A subnet in the external tenant-network model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSubnet {
    /// Subnet identity (UUID string).
    pub id: String,
    /// Owning network identity.
    pub network_id: String,
    /// CIDR ("10.0.0.0/24" form).
    pub cidr: String,
    /// Gateway address; doubles as the DHCP server address.
    pub gateway_ip: Ipv4Addr,
    /// DNS resolver addresses (possibly empty).
    #[serde(default)]
    pub dns_nameservers: Vec<Ipv4Addr>,
}

/// A switch-level port snapshot as carried in topology events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPort {
    /// Human-readable port name; the prefix encodes the port role.
    pub name: String,
    /// Administrative enablement.
    pub enabled: bool,
}

impl SwitchPort {
    /// Creates a port snapshot.
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }
}

/// Forwarding state believed installed for one switch port.
///
/// Owned exclusively by the port-state registry. At most one record exists
/// per switch-port name; presence means rules are believed installed,
/// absence means no believed-installed state (it does not mean no rules
/// exist on the switch). Records are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPortState {
    /// Switch/device identity the rules were installed on.
    pub device: String,
    /// First fixed IP of the tenant port, if any.
    pub host_ip: Option<Ipv4Addr>,
    /// Host MAC address; keys the DHCP binding.
    pub host_mac: String,
    /// Parsed segmentation identifier of the owning network.
    pub segmentation_id: u32,
}
