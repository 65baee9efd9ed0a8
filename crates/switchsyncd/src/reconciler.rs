//! Forwarding-rule reconciliation.
//!
//! Given a (device, port) pair, decides whether forwarding rules must be
//! installed or removed and performs the idempotent backend calls, keeping
//! the port-state registry consistent. All decisions run inside a
//! serialized lane slot; redundant triggers are expected and must converge
//! to the same registry state.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use switchsync_common::SyncResult;

use crate::backend::{ForwardingBackend, RuleContext};
use crate::dhcp::DhcpBindingSynchronizer;
use crate::directory::DirectoryClient;
use crate::portname::{PortCorrelation, PortRole};
use crate::registry::PortStateRegistry;
use crate::topology::TopologyView;
use crate::types::{InstalledPortState, SwitchPort, TenantPort};

/// Reconciles switch forwarding state against the tenant-network model.
pub struct RuleReconciler {
    backend: Arc<dyn ForwardingBackend>,
    dhcp: DhcpBindingSynchronizer,
    registry: Arc<PortStateRegistry>,
    correlation: Arc<dyn PortCorrelation>,
}

impl RuleReconciler {
    /// Creates a reconciler over the given collaborators.
    pub fn new(
        backend: Arc<dyn ForwardingBackend>,
        dhcp: DhcpBindingSynchronizer,
        registry: Arc<PortStateRegistry>,
        correlation: Arc<dyn PortCorrelation>,
    ) -> Self {
        Self {
            backend,
            dhcp,
            registry,
            correlation,
        }
    }

    /// Resolves the tenant port correlated with a switch-port name.
    ///
    /// Returns `Ok(None)` when the name carries no tenant reference or no
    /// tenant port matches (a lookup miss, not an error).
    pub async fn resolve_tenant_port(
        &self,
        directory: &dyn DirectoryClient,
        port_name: &str,
    ) -> SyncResult<Option<TenantPort>> {
        let Some(fragment) = self.correlation.tenant_ref(port_name) else {
            return Ok(None);
        };
        let ports = directory.ports().await?;
        Ok(ports.into_iter().find(|p| p.id.starts_with(fragment)))
    }

    /// Handles a port-added/port-updated topology event.
    #[instrument(skip(self, directory, port), fields(device = %device, port = %port.name))]
    pub async fn on_port_updated(
        &self,
        directory: &dyn DirectoryClient,
        dry_run: bool,
        device: &str,
        port: &SwitchPort,
    ) -> SyncResult<()> {
        let role = self.correlation.role(&port.name);
        if role == Some(PortRole::Tunnel) {
            debug!("Tunnel-overlay port {} ignored", port.name);
            return Ok(());
        }
        if dry_run {
            debug!("Flow pushing disabled; observing update for {} only", port.name);
            return Ok(());
        }

        if port.enabled || role == Some(PortRole::Router) {
            self.install(directory, device, &port.name).await
        } else if self.registry.contains(&port.name).await {
            // Port update driven by a VM shutoff.
            self.remove_port(device, &port.name).await
        } else {
            debug!("Port {} disabled and unregistered; nothing to do", port.name);
            Ok(())
        }
    }

    /// Installs forwarding rules and records the installed state.
    ///
    /// Safe to call repeatedly for an already-synchronized port: the
    /// backend call is re-issued (switch-side state is not otherwise known
    /// to be current) while the registry record is left unchanged.
    pub async fn install(
        &self,
        directory: &dyn DirectoryClient,
        device: &str,
        port_name: &str,
    ) -> SyncResult<()> {
        let Some(tenant_port) = self.resolve_tenant_port(directory, port_name).await? else {
            warn!("No tenant port information for switch port {}", port_name);
            return Ok(());
        };
        if tenant_port.is_gateway() {
            debug!(
                "Gateway-owned port {} left to the routing layer",
                port_name
            );
            return Ok(());
        }

        let networks = directory.networks().await?;
        let Some(network) = networks.iter().find(|n| n.id == tenant_port.network_id) else {
            warn!(
                "No network information for {} (port {})",
                tenant_port.network_id, port_name
            );
            return Ok(());
        };
        let segmentation_id = network.segmentation_id()?;

        let ctx = RuleContext {
            segmentation_id,
            host_ip: tenant_port.host_ip(),
            host_mac: tenant_port.mac_address.clone(),
        };

        // An install failure must not create a registry entry, so a later
        // pass still sees the port as not-yet-installed.
        self.backend.install(device, port_name, &ctx).await?;

        let inserted = self
            .registry
            .insert_if_absent(
                port_name,
                InstalledPortState {
                    device: device.to_string(),
                    host_ip: ctx.host_ip,
                    host_mac: ctx.host_mac.clone(),
                    segmentation_id,
                },
            )
            .await;
        if inserted {
            info!("Installed forwarding state for {} on {}", port_name, device);
        } else {
            debug!(
                "Port {} already registered; install re-issued to the backend",
                port_name
            );
        }

        if tenant_port.host_ip().is_some() {
            self.dhcp.register(directory, &tenant_port).await?;
        }
        Ok(())
    }

    /// Tears down forwarding rules and the DHCP binding for a port.
    ///
    /// Any failure leaves the registry entry in place: the port must not be
    /// considered clean while the switch may still hold stale rules or the
    /// DHCP store a stale binding.
    pub async fn remove_port(&self, device: &str, port_name: &str) -> SyncResult<()> {
        let Some(state) = self.registry.get(port_name).await else {
            return Ok(());
        };
        let ctx = RuleContext::from(&state);

        self.backend.remove(device, port_name, &ctx).await?;
        self.dhcp.unregister(&state.host_mac).await?;
        self.registry.remove(port_name).await;
        info!("Removed forwarding state for {} on {}", port_name, device);
        Ok(())
    }

    /// Handles a port-removed topology event.
    ///
    /// Observability only: VM-port teardown is driven exclusively by the
    /// disablement path, which precedes or accompanies true removal.
    pub fn on_port_removed(&self, device: &str, port: &SwitchPort) {
        debug!("Port {} removed from {}", port.name, device);
    }

    /// Tears down a router port after its tenant-side deletion.
    ///
    /// Router ports have no switch-level removal event from the tenant
    /// side, so deletion is keyed by the tenant port identity and the
    /// derived switch-port name. An unregistered name is a no-op.
    #[instrument(skip(self, topology), fields(tenant_port = %tenant_port_id))]
    pub async fn on_router_port_deleted(
        &self,
        dry_run: bool,
        topology: &dyn TopologyView,
        tenant_port_id: &str,
    ) -> SyncResult<()> {
        let port_name = self.correlation.router_port_name(tenant_port_id);
        let Some(state) = self.registry.get(&port_name).await else {
            debug!("Router port {} not registered; already synchronized", port_name);
            return Ok(());
        };
        if dry_run {
            debug!(
                "Flow pushing disabled; leaving router port {} untouched",
                port_name
            );
            return Ok(());
        }

        let carried = topology
            .ports(&state.device)
            .await
            .into_iter()
            .any(|p| p.name == port_name);
        if !carried {
            warn!(
                "Switch {} no longer carries port {}; teardown deferred",
                state.device, port_name
            );
            return Ok(());
        }

        let ctx = RuleContext::from(&state);
        self.backend.remove(&state.device, &port_name, &ctx).await?;
        self.dhcp.unregister(&state.host_mac).await?;
        self.registry.remove(&port_name).await;
        info!("Removed router port state for {}", port_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use switchsync_common::SyncError;

    use crate::backend::{DhcpOptions, DhcpStore};
    use crate::portname::PrefixCorrelation;
    use crate::types::{FixedIp, TenantNetwork, TenantSubnet};

    struct StaticDirectory {
        networks: Vec<TenantNetwork>,
        subnets: Vec<TenantSubnet>,
        ports: Vec<TenantPort>,
    }

    #[async_trait]
    impl DirectoryClient for StaticDirectory {
        async fn networks(&self) -> SyncResult<Vec<TenantNetwork>> {
            Ok(self.networks.clone())
        }

        async fn subnets(&self) -> SyncResult<Vec<TenantSubnet>> {
            Ok(self.subnets.clone())
        }

        async fn ports(&self) -> SyncResult<Vec<TenantPort>> {
            Ok(self.ports.clone())
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        installs: Mutex<Vec<(String, String)>>,
        removes: Mutex<Vec<(String, String)>>,
        fail_install: AtomicBool,
        fail_remove: AtomicBool,
    }

    #[async_trait]
    impl ForwardingBackend for RecordingBackend {
        async fn install(&self, device: &str, port_name: &str, _ctx: &RuleContext) -> SyncResult<()> {
            if self.fail_install.load(Ordering::SeqCst) {
                return Err(SyncError::backend("install", "device unreachable"));
            }
            self.installs
                .lock()
                .unwrap()
                .push((device.to_string(), port_name.to_string()));
            Ok(())
        }

        async fn remove(&self, device: &str, port_name: &str, _ctx: &RuleContext) -> SyncResult<()> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(SyncError::backend("remove", "device unreachable"));
            }
            self.removes
                .lock()
                .unwrap()
                .push((device.to_string(), port_name.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingDhcpStore {
        sets: AtomicUsize,
        removes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DhcpStore for CountingDhcpStore {
        async fn set_binding(
            &self,
            _mac: &str,
            _ip: Ipv4Addr,
            _authoritative: bool,
            _options: &DhcpOptions,
        ) -> SyncResult<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_binding(&self, mac: &str) -> SyncResult<()> {
            self.removes.lock().unwrap().push(mac.to_string());
            Ok(())
        }
    }

    const VM_PORT_ID: &str = "4e8e5957-649f-477b-9e5b-f1f75b21c03c";
    const ROUTER_PORT_ID: &str = "77a3d13f-121f-48a1-a0a1-8c4bf964b35e";

    fn tenant_port(id: &str, device_owner: &str, ip: Option<Ipv4Addr>) -> TenantPort {
        TenantPort {
            id: id.to_string(),
            network_id: "net-1".to_string(),
            device_owner: device_owner.to_string(),
            fixed_ips: ip
                .map(|ip_address| {
                    vec![FixedIp {
                        subnet_id: "sub-1".to_string(),
                        ip_address,
                    }]
                })
                .unwrap_or_default(),
            mac_address: "fa:16:3e:00:00:01".to_string(),
        }
    }

    fn network(segment_id: &str) -> TenantNetwork {
        TenantNetwork {
            id: "net-1".to_string(),
            name: "tenant-a".to_string(),
            network_type: "vxlan".to_string(),
            segment_id: segment_id.to_string(),
            tenant_id: "t-1".to_string(),
            subnets: vec![],
        }
    }

    fn subnet() -> TenantSubnet {
        TenantSubnet {
            id: "sub-1".to_string(),
            network_id: "net-1".to_string(),
            cidr: "10.0.0.0/24".to_string(),
            gateway_ip: Ipv4Addr::new(10, 0, 0, 1),
            dns_nameservers: vec![],
        }
    }

    struct Fixture {
        reconciler: RuleReconciler,
        backend: Arc<RecordingBackend>,
        dhcp_store: Arc<CountingDhcpStore>,
        registry: Arc<PortStateRegistry>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(RecordingBackend::default());
        let dhcp_store = Arc::new(CountingDhcpStore::default());
        let registry = Arc::new(PortStateRegistry::new());
        let reconciler = RuleReconciler::new(
            Arc::clone(&backend) as Arc<dyn ForwardingBackend>,
            DhcpBindingSynchronizer::new(Arc::clone(&dhcp_store) as Arc<dyn DhcpStore>),
            Arc::clone(&registry),
            Arc::new(PrefixCorrelation),
        );
        Fixture {
            reconciler,
            backend,
            dhcp_store,
            registry,
        }
    }

    fn vm_directory(segment_id: &str) -> StaticDirectory {
        StaticDirectory {
            networks: vec![network(segment_id)],
            subnets: vec![subnet()],
            ports: vec![tenant_port(
                VM_PORT_ID,
                "compute:nova",
                Some(Ipv4Addr::new(10, 0, 0, 4)),
            )],
        }
    }

    fn vm_switch_port(enabled: bool) -> SwitchPort {
        SwitchPort::new(format!("tap{}", &VM_PORT_ID[..11]), enabled)
    }

    #[tokio::test]
    async fn test_enable_installs_and_registers() {
        let f = fixture();
        let directory = vm_directory("1042");
        let port = vm_switch_port(true);

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &port)
            .await
            .unwrap();

        let state = f.registry.get(&port.name).await.unwrap();
        assert_eq!(state.device, "dev-1");
        assert_eq!(state.segmentation_id, 1042);
        assert_eq!(state.host_ip, Some(Ipv4Addr::new(10, 0, 0, 4)));
        assert_eq!(f.backend.installs.lock().unwrap().len(), 1);
        assert_eq!(f.dhcp_store.sets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_install_is_idempotent_for_registry() {
        let f = fixture();
        let directory = vm_directory("1042");
        let port = vm_switch_port(true);

        for _ in 0..2 {
            f.reconciler
                .on_port_updated(&directory, false, "dev-1", &port)
                .await
                .unwrap();
        }

        // One registry record, but the backend call was re-issued.
        assert_eq!(f.registry.len().await, 1);
        assert_eq!(f.backend.installs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_disable_removes_rules_binding_and_record() {
        let f = fixture();
        let directory = vm_directory("1042");

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap();
        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(false))
            .await
            .unwrap();

        assert!(f.registry.is_empty().await);
        assert_eq!(f.backend.removes.lock().unwrap().len(), 1);
        assert_eq!(
            *f.dhcp_store.removes.lock().unwrap(),
            vec!["fa:16:3e:00:00:01".to_string()]
        );
    }

    #[tokio::test]
    async fn test_disable_unregistered_port_is_noop() {
        let f = fixture();
        let directory = vm_directory("1042");

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(false))
            .await
            .unwrap();

        assert!(f.backend.removes.lock().unwrap().is_empty());
        assert!(f.dhcp_store.removes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_failure_leaves_no_record() {
        let f = fixture();
        let directory = vm_directory("1042");
        f.backend.fail_install.store(true, Ordering::SeqCst);

        let err = f
            .reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Backend { .. }));
        assert!(f.registry.is_empty().await);
        assert_eq!(f.dhcp_store.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_record() {
        let f = fixture();
        let directory = vm_directory("1042");

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap();
        f.backend.fail_remove.store(true, Ordering::SeqCst);

        let err = f
            .reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(false))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Backend { .. }));
        assert_eq!(f.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_tunnel_port_ignored() {
        let f = fixture();
        let directory = vm_directory("1042");

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &SwitchPort::new("vxlan0", true))
            .await
            .unwrap();

        assert!(f.backend.installs.lock().unwrap().is_empty());
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_dry_run_suppresses_everything() {
        let f = fixture();
        let directory = vm_directory("1042");

        f.reconciler
            .on_port_updated(&directory, true, "dev-1", &vm_switch_port(true))
            .await
            .unwrap();

        assert!(f.backend.installs.lock().unwrap().is_empty());
        assert_eq!(f.dhcp_store.sets.load(Ordering::SeqCst), 0);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_gateway_port_excluded() {
        let f = fixture();
        let directory = StaticDirectory {
            networks: vec![network("1042")],
            subnets: vec![subnet()],
            ports: vec![tenant_port(
                VM_PORT_ID,
                "network:router_gateway",
                Some(Ipv4Addr::new(192, 0, 2, 1)),
            )],
        };

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap();

        assert!(f.backend.installs.lock().unwrap().is_empty());
        assert_eq!(f.dhcp_store.sets.load(Ordering::SeqCst), 0);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_segment_id_aborts_single_port() {
        let f = fixture();
        let directory = vm_directory("not-a-vni");

        let err = f
            .reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::MalformedField { .. }));
        assert!(f.backend.installs.lock().unwrap().is_empty());
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_lookup_miss_drops_event() {
        let f = fixture();
        let directory = StaticDirectory {
            networks: vec![network("1042")],
            subnets: vec![subnet()],
            ports: vec![],
        };

        f.reconciler
            .on_port_updated(&directory, false, "dev-1", &vm_switch_port(true))
            .await
            .unwrap();

        assert!(f.backend.installs.lock().unwrap().is_empty());
        assert!(f.registry.is_empty().await);
    }

    struct StaticTopology {
        device: String,
        ports: Vec<SwitchPort>,
    }

    #[async_trait]
    impl TopologyView for StaticTopology {
        async fn devices(&self) -> Vec<String> {
            vec![self.device.clone()]
        }

        async fn ports(&self, device: &str) -> Vec<SwitchPort> {
            if device == self.device {
                self.ports.clone()
            } else {
                vec![]
            }
        }
    }

    #[tokio::test]
    async fn test_router_port_teardown() {
        let f = fixture();
        let router_name = format!("qr-{}", &ROUTER_PORT_ID[..11]);
        let directory = StaticDirectory {
            networks: vec![network("1042")],
            subnets: vec![subnet()],
            ports: vec![tenant_port(
                ROUTER_PORT_ID,
                "network:router_interface",
                Some(Ipv4Addr::new(10, 0, 0, 1)),
            )],
        };
        f.reconciler
            .on_port_updated(
                &directory,
                false,
                "dev-1",
                // Router ports install even when administratively down.
                &SwitchPort::new(router_name.clone(), false),
            )
            .await
            .unwrap();
        assert_eq!(f.registry.len().await, 1);

        let topology = StaticTopology {
            device: "dev-1".to_string(),
            ports: vec![SwitchPort::new(router_name.clone(), true)],
        };
        f.reconciler
            .on_router_port_deleted(false, &topology, ROUTER_PORT_ID)
            .await
            .unwrap();

        assert!(f.registry.is_empty().await);
        assert_eq!(f.backend.removes.lock().unwrap().len(), 1);
        assert_eq!(f.dhcp_store.removes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_router_port_teardown_unregistered_is_noop() {
        let f = fixture();
        let topology = StaticTopology {
            device: "dev-1".to_string(),
            ports: vec![],
        };

        f.reconciler
            .on_router_port_deleted(false, &topology, ROUTER_PORT_ID)
            .await
            .unwrap();

        assert!(f.backend.removes.lock().unwrap().is_empty());
        assert!(f.dhcp_store.removes.lock().unwrap().is_empty());
    }
}
