//! Switch-port naming convention.
//!
//! Port names are the only correlation mechanism between switch-level ports
//! and tenant ports; there is no explicit foreign key in the switch layer.
//! A fixed prefix identifies the port role, and for VM and router ports the
//! remainder of the name is a prefix of the tenant port identity. This
//! contract is fragile by design and must not be papered over: the mapping
//! lives behind [`PortCorrelation`] so a future correlation mechanism
//! (explicit metadata, for instance) can replace it without touching the
//! reconciliation logic.

/// Name prefix of virtual-machine access ports.
pub const PORTNAME_PREFIX_VM: &str = "tap";

/// Name prefix of router/gateway ports.
pub const PORTNAME_PREFIX_ROUTER: &str = "qr-";

/// Name prefix of tunnel-overlay ports.
pub const PORTNAME_PREFIX_TUNNEL: &str = "vxlan";

/// Length of the tenant-port id fragment carried in a router port name.
pub const ROUTER_PORT_ID_FRAGMENT_LEN: usize = 11;

/// Role encoded in a switch-port name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    /// Virtual-machine access port ("tap...").
    VirtualMachine,
    /// Router/gateway port ("qr-...").
    Router,
    /// Tunnel-overlay port ("vxlan...").
    Tunnel,
}

/// Mapping between switch-port names and tenant-port identities.
pub trait PortCorrelation: Send + Sync {
    /// Classifies a switch-port name, if it follows a known convention.
    fn role(&self, port_name: &str) -> Option<PortRole>;

    /// Extracts the tenant-port id fragment encoded in a VM or router port
    /// name. Tunnel and unrecognized names carry no tenant reference.
    fn tenant_ref<'a>(&self, port_name: &'a str) -> Option<&'a str>;

    /// Derives the switch-port name a router port carries for the given
    /// tenant-port identity.
    fn router_port_name(&self, tenant_port_id: &str) -> String;
}

/// The fixed-prefix naming convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixCorrelation;

impl PortCorrelation for PrefixCorrelation {
    fn role(&self, port_name: &str) -> Option<PortRole> {
        if port_name.starts_with(PORTNAME_PREFIX_ROUTER) {
            Some(PortRole::Router)
        } else if port_name.starts_with(PORTNAME_PREFIX_TUNNEL) {
            Some(PortRole::Tunnel)
        } else if port_name.starts_with(PORTNAME_PREFIX_VM) {
            Some(PortRole::VirtualMachine)
        } else {
            None
        }
    }

    fn tenant_ref<'a>(&self, port_name: &'a str) -> Option<&'a str> {
        // Both the VM and router prefixes are three characters long; the
        // remainder is a prefix of the tenant port UUID.
        match self.role(port_name)? {
            PortRole::VirtualMachine => port_name.strip_prefix(PORTNAME_PREFIX_VM),
            PortRole::Router => port_name.strip_prefix(PORTNAME_PREFIX_ROUTER),
            PortRole::Tunnel => None,
        }
        .filter(|fragment| !fragment.is_empty())
    }

    fn router_port_name(&self, tenant_port_id: &str) -> String {
        let end = tenant_port_id.len().min(ROUTER_PORT_ID_FRAGMENT_LEN);
        format!("{}{}", PORTNAME_PREFIX_ROUTER, &tenant_port_id[..end])
    }
}
