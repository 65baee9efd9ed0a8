//! Switching manager.
//!
//! Owns the activation/reconfiguration/teardown lifecycle, the two
//! serialized processing lanes, and the collaborator session. On every
//! (re)configuration the directory-client and ARP-handler handles are
//! rebuilt into a fresh immutable [`Session`], swapped in atomically, and a
//! full resync pass reconciles every currently known switch port against
//! the tenant-network model.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use switchsync_common::{EventLane, SyncError, SyncResult};

use crate::backend::{ArpHandler, DhcpStore, ForwardingBackend};
use crate::config::{ConfigStore, SwitchingConfig};
use crate::dhcp::DhcpBindingSynchronizer;
use crate::directory::DirectoryClient;
use crate::events::{ConfigEvent, TopologyEvent};
use crate::portname::{PortCorrelation, PortRole, PrefixCorrelation};
use crate::reconciler::RuleReconciler;
use crate::registry::PortStateRegistry;
use crate::topology::TopologyView;
use crate::types::{InstalledPortState, TenantNetwork, TenantPort, TenantSubnet};

const ETHERTYPE_ARP: u16 = 0x0806;

/// Manager lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No configuration has been loaded yet.
    Unconfigured,
    /// A configuration is active and a resync has run.
    Configured,
    /// A new configuration is being applied.
    Reconfiguring,
    /// Deactivated; not re-enterable.
    TornDown,
}

/// Immutable collaborator bundle bound to one configuration.
///
/// Rebuilt wholesale on every (re)configuration and swapped in atomically;
/// never partially mutated in place.
pub struct Session {
    /// The configuration this session was built from.
    pub config: SwitchingConfig,
    /// Directory client bound to the configured endpoint.
    pub directory: Arc<dyn DirectoryClient>,
    /// ARP handler bound to the configured directory.
    pub arp: Arc<dyn ArpHandler>,
}

/// Builds the configuration-bound collaborator handles.
pub trait SessionFactory: Send + Sync {
    /// Builds a fresh session for a configuration.
    fn build(&self, config: SwitchingConfig) -> Session;
}

enum TopologyCommand {
    Event(TopologyEvent),
    RouterPortDeleted { tenant_port_id: String },
}

enum ConfigCommand {
    Reload,
}

struct Lanes {
    topology: EventLane<TopologyCommand>,
    config: EventLane<ConfigCommand>,
}

struct Inner {
    registry: Arc<PortStateRegistry>,
    reconciler: RuleReconciler,
    dhcp: DhcpBindingSynchronizer,
    config_store: Arc<dyn ConfigStore>,
    topology: Arc<dyn TopologyView>,
    sessions: Arc<dyn SessionFactory>,
    correlation: Arc<dyn PortCorrelation>,
    state: RwLock<Lifecycle>,
    session: RwLock<Option<Arc<Session>>>,
    lanes: RwLock<Option<Lanes>>,
}

/// Keeps switch forwarding state synchronized with the tenant-network model.
///
/// Cheap to clone: clones share the same registry, session, and lanes.
#[derive(Clone)]
pub struct SwitchingManager {
    inner: Arc<Inner>,
}

impl SwitchingManager {
    /// Creates a manager using the fixed-prefix port naming convention.
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        topology: Arc<dyn TopologyView>,
        sessions: Arc<dyn SessionFactory>,
        backend: Arc<dyn ForwardingBackend>,
        dhcp_store: Arc<dyn DhcpStore>,
    ) -> Self {
        Self::with_correlation(
            config_store,
            topology,
            sessions,
            backend,
            dhcp_store,
            Arc::new(PrefixCorrelation),
        )
    }

    /// Creates a manager with an explicit port-correlation strategy.
    pub fn with_correlation(
        config_store: Arc<dyn ConfigStore>,
        topology: Arc<dyn TopologyView>,
        sessions: Arc<dyn SessionFactory>,
        backend: Arc<dyn ForwardingBackend>,
        dhcp_store: Arc<dyn DhcpStore>,
        correlation: Arc<dyn PortCorrelation>,
    ) -> Self {
        let registry = Arc::new(PortStateRegistry::new());
        let reconciler = RuleReconciler::new(
            backend,
            DhcpBindingSynchronizer::new(Arc::clone(&dhcp_store)),
            Arc::clone(&registry),
            Arc::clone(&correlation),
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                reconciler,
                dhcp: DhcpBindingSynchronizer::new(dhcp_store),
                config_store,
                topology,
                sessions,
                correlation,
                state: RwLock::new(Lifecycle::Unconfigured),
                session: RwLock::new(None),
                lanes: RwLock::new(None),
            }),
        }
    }

    /// Starts both processing lanes and enqueues the initial configuration
    /// load. Activating an already-active manager is a no-op.
    pub async fn activate(&self) -> SyncResult<()> {
        if *self.inner.state.read().await == Lifecycle::TornDown {
            return Err(SyncError::internal("manager was torn down"));
        }
        let mut lanes = self.inner.lanes.write().await;
        if lanes.is_some() {
            debug!("Manager already active");
            return Ok(());
        }

        let manager = self.clone();
        let topology_lane = EventLane::spawn("topology", move |command| {
            let manager = manager.clone();
            async move { manager.handle_topology_command(command).await }
        });
        let manager = self.clone();
        let config_lane = EventLane::spawn("config", move |command| {
            let manager = manager.clone();
            async move { manager.handle_config_command(command).await }
        });

        config_lane.submit(ConfigCommand::Reload);
        *lanes = Some(Lanes {
            topology: topology_lane,
            config: config_lane,
        });
        info!("Switching manager activated");
        Ok(())
    }

    /// Stops both lanes after draining queued events and transitions to
    /// [`Lifecycle::TornDown`].
    pub async fn deactivate(&self) {
        let lanes = self.inner.lanes.write().await.take();
        if let Some(lanes) = lanes {
            lanes.topology.shutdown().await;
            lanes.config.shutdown().await;
        }
        *self.inner.state.write().await = Lifecycle::TornDown;
        info!("Switching manager deactivated");
    }

    /// Returns the current lifecycle state.
    pub async fn lifecycle(&self) -> Lifecycle {
        *self.inner.state.read().await
    }

    /// Enqueues a topology event for serialized processing. Never blocks.
    pub async fn submit_topology_event(&self, event: TopologyEvent) -> bool {
        match &*self.inner.lanes.read().await {
            Some(lanes) => lanes.topology.submit(TopologyCommand::Event(event)),
            None => {
                warn!("Topology event submitted while inactive; dropped");
                false
            }
        }
    }

    /// Enqueues a configuration reload for added/updated events; removals
    /// are ignored. Never blocks.
    pub async fn submit_config_event(&self, event: ConfigEvent) -> bool {
        match event {
            ConfigEvent::Added | ConfigEvent::Updated => {
                match &*self.inner.lanes.read().await {
                    Some(lanes) => lanes.config.submit(ConfigCommand::Reload),
                    None => {
                        warn!("Configuration event submitted while inactive; dropped");
                        false
                    }
                }
            }
            ConfigEvent::Removed => {
                debug!("Configuration removal ignored");
                true
            }
        }
    }

    async fn handle_config_command(&self, command: ConfigCommand) -> SyncResult<()> {
        match command {
            ConfigCommand::Reload => self.load_configuration().await,
        }
    }

    async fn handle_topology_command(&self, command: TopologyCommand) -> SyncResult<()> {
        match command {
            TopologyCommand::Event(event) => self.handle_topology_event(event).await,
            TopologyCommand::RouterPortDeleted { tenant_port_id } => {
                self.router_port_teardown(&tenant_port_id).await
            }
        }
    }

    /// Loads (or reloads) the configuration, rebuilds the session, and runs
    /// a full resync.
    ///
    /// Safe to invoke repeatedly: a reload for already-synchronized
    /// topology converges without duplicating registry state. An absent
    /// configuration is logged and leaves the manager idle until one
    /// appears.
    pub async fn load_configuration(&self) -> SyncResult<()> {
        if *self.inner.state.read().await == Lifecycle::TornDown {
            return Ok(());
        }
        let Some(config) = self.inner.config_store.current().await else {
            error!("No switching configuration available; staying idle");
            return Ok(());
        };

        {
            let mut state = self.inner.state.write().await;
            if *state == Lifecycle::Configured {
                *state = Lifecycle::Reconfiguring;
            }
        }

        info!(
            "Applying configuration (directory {}, flow pushing {})",
            config.directory_endpoint,
            if config.do_not_push_flows {
                "disabled"
            } else {
                "enabled"
            }
        );
        let session = Arc::new(self.inner.sessions.build(config));
        *self.inner.session.write().await = Some(session);

        if let Err(err) = self.full_resync().await {
            warn!("Full resync failed: {}", err);
        }
        *self.inner.state.write().await = Lifecycle::Configured;
        Ok(())
    }

    /// Reconciles every currently known switch port against the tenant
    /// model.
    ///
    /// Per-port failures are logged and never abort the pass.
    pub async fn full_resync(&self) -> SyncResult<()> {
        let session = self.session().await.ok_or(SyncError::NotConfigured)?;
        let dry_run = session.config.do_not_push_flows;
        info!("Starting full resync");

        for device in self.inner.topology.devices().await {
            let ports = self.inner.topology.ports(&device).await;
            debug!("Device {} has {} ports", device, ports.len());
            for port in ports {
                // Same predicate as the port-update path: enabled VM ports
                // and router ports, so racing triggers converge.
                let eligible = match self.inner.correlation.role(&port.name) {
                    Some(PortRole::VirtualMachine) => port.enabled,
                    Some(PortRole::Router) => true,
                    _ => false,
                };
                if !eligible {
                    continue;
                }
                if dry_run {
                    debug!("Flow pushing disabled; skipping {}", port.name);
                    continue;
                }
                if let Err(err) = self
                    .inner
                    .reconciler
                    .install(session.directory.as_ref(), &device, &port.name)
                    .await
                {
                    warn!("Resync of port {} on {} failed: {}", port.name, device, err);
                }
            }
        }
        Ok(())
    }

    /// Processes one topology event. Events arriving before the first
    /// configuration are dropped.
    pub async fn handle_topology_event(&self, event: TopologyEvent) -> SyncResult<()> {
        let Some(session) = self.session().await else {
            debug!("Topology event before configuration; dropped");
            return Ok(());
        };
        let dry_run = session.config.do_not_push_flows;

        match event {
            TopologyEvent::SwitchAdded { device } => {
                debug!("Switch {} added", device);
                Ok(())
            }
            TopologyEvent::SwitchAvailabilityChanged { device, available } => {
                if available {
                    debug!("Switch {} became available", device);
                }
                Ok(())
            }
            TopologyEvent::PortAdded { device, port }
            | TopologyEvent::PortUpdated { device, port } => {
                self.inner
                    .reconciler
                    .on_port_updated(session.directory.as_ref(), dry_run, &device, &port)
                    .await
            }
            TopologyEvent::PortRemoved { device, port } => {
                self.inner.reconciler.on_port_removed(&device, &port);
                Ok(())
            }
            TopologyEvent::HostRemoved { host } => {
                debug!("Host {} removed", host);
                Ok(())
            }
        }
    }

    /// Runs the router-port teardown path for a deleted tenant port.
    pub async fn router_port_teardown(&self, tenant_port_id: &str) -> SyncResult<()> {
        let Some(session) = self.session().await else {
            debug!("Router teardown before configuration; dropped");
            return Ok(());
        };
        self.inner
            .reconciler
            .on_router_port_deleted(
                session.config.do_not_push_flows,
                self.inner.topology.as_ref(),
                tenant_port_id,
            )
            .await
    }

    /// Registers the DHCP binding for a newly created tenant port.
    ///
    /// No forwarding-rule side effect: rules install only once the
    /// switch-level port is observed via topology events.
    pub async fn create_port(&self, port: &TenantPort) -> SyncResult<()> {
        let session = self.session().await.ok_or(SyncError::NotConfigured)?;
        if port.host_ip().is_none() || port.is_gateway() {
            debug!("Port {} needs no DHCP binding", port.id);
            return Ok(());
        }
        if session.config.do_not_push_flows {
            debug!(
                "Flow pushing disabled; skipping DHCP registration for {}",
                port.id
            );
            return Ok(());
        }
        self.inner
            .dhcp
            .register(session.directory.as_ref(), port)
            .await
    }

    /// Handles a tenant-port deletion by id.
    ///
    /// Only router ports are torn down here; VM-port rules are removed via
    /// the switch-level disablement path. The teardown command is
    /// serialized on the topology lane.
    pub async fn delete_port(&self, tenant_port_id: &str) -> bool {
        debug!("Tenant port {} deleted", tenant_port_id);
        match &*self.inner.lanes.read().await {
            Some(lanes) => lanes.topology.submit(TopologyCommand::RouterPortDeleted {
                tenant_port_id: tenant_port_id.to_string(),
            }),
            None => {
                warn!("Tenant port deletion submitted while inactive; dropped");
                false
            }
        }
    }

    /// Returns the tenant ports of one network.
    pub async fn ports(&self, network_id: &str) -> SyncResult<Vec<TenantPort>> {
        let directory = self.directory().await?;
        Ok(directory
            .ports()
            .await?
            .into_iter()
            .filter(|p| p.network_id == network_id)
            .collect())
    }

    /// Resolves the tenant port correlated with a switch-port name.
    pub async fn port_by_switch_name(&self, port_name: &str) -> SyncResult<Option<TenantPort>> {
        let directory = self.directory().await?;
        self.inner
            .reconciler
            .resolve_tenant_port(directory.as_ref(), port_name)
            .await
    }

    /// Returns the tenant port with the given identity.
    pub async fn port(&self, tenant_port_id: &str) -> SyncResult<Option<TenantPort>> {
        let directory = self.directory().await?;
        Ok(directory
            .ports()
            .await?
            .into_iter()
            .find(|p| p.id == tenant_port_id))
    }

    /// Returns a composed view of one tenant network with its subnets.
    pub async fn network(&self, network_id: &str) -> SyncResult<Option<TenantNetwork>> {
        let directory = self.directory().await?;
        let Some(mut network) = directory
            .networks()
            .await?
            .into_iter()
            .find(|n| n.id == network_id)
        else {
            warn!("No network information for {}", network_id);
            return Ok(None);
        };
        network.subnets = directory
            .subnets()
            .await?
            .into_iter()
            .filter(|s| s.network_id == network_id)
            .collect();
        Ok(Some(network))
    }

    /// Returns the tenant subnet with the given identity.
    pub async fn subnet(&self, subnet_id: &str) -> SyncResult<Option<TenantSubnet>> {
        let directory = self.directory().await?;
        let subnet = directory
            .subnets()
            .await?
            .into_iter()
            .find(|s| s.id == subnet_id);
        if subnet.is_none() {
            warn!("No subnet information for {}", subnet_id);
        }
        Ok(subnet)
    }

    /// Returns a point-in-time snapshot of the installed-state registry.
    pub async fn installed_ports(&self) -> HashMap<String, InstalledPortState> {
        self.inner.registry.snapshot().await
    }

    /// Dispatches an inbound frame: ARP frames go to the session's ARP
    /// handler, everything else is ignored. Frames arriving before the
    /// first configuration are dropped.
    pub async fn process_inbound(&self, frame: &[u8]) {
        let Some(session) = self.session().await else {
            return;
        };
        if ethertype(frame) == Some(ETHERTYPE_ARP) {
            session.arp.process_packet(frame);
        }
    }

    async fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.read().await.clone()
    }

    async fn directory(&self) -> SyncResult<Arc<dyn DirectoryClient>> {
        self.session()
            .await
            .map(|s| Arc::clone(&s.directory))
            .ok_or(SyncError::NotConfigured)
    }
}

fn ethertype(frame: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*frame.get(12)?, *frame.get(13)?]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethertype_parse() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert_eq!(ethertype(&frame), Some(ETHERTYPE_ARP));

        frame[13] = 0x00;
        assert_eq!(ethertype(&frame), Some(0x0800));

        assert_eq!(ethertype(&[0u8; 10]), None);
        assert_eq!(ethertype(&[]), None);
    }
}
