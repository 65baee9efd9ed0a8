//! switchsyncd - Tenant-Network Switching Synchronizer Daemon
//!
//! Entry point for the switchsyncd daemon.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use switchsync_common::SyncResult;
use switchsyncd::{
    ArpHandler, DhcpOptions, DhcpStore, FileConfigStore, ForwardingBackend, HttpDirectoryClient,
    RuleContext, Session, SessionFactory, SwitchPort, SwitchingConfig, SwitchingManager,
    TopologyView,
};

#[derive(Debug, Parser)]
#[command(name = "switchsyncd", about = "Tenant-network switching synchronizer")]
struct Args {
    /// Path to the daemon configuration file.
    #[arg(long, default_value = "/etc/switchsync/switchsyncd.yaml")]
    config: String,
}

/// Initializes tracing/logging subsystem
fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Builds directory and ARP collaborators from the active configuration.
struct HttpSessionFactory;

impl SessionFactory for HttpSessionFactory {
    fn build(&self, config: SwitchingConfig) -> Session {
        let directory = Arc::new(HttpDirectoryClient::new(&config));
        Session {
            config,
            directory,
            arp: Arc::new(LogArpHandler),
        }
    }
}

/// ARP handler integration point; the resolution pipeline plugs in here.
struct LogArpHandler;

impl ArpHandler for LogArpHandler {
    fn process_packet(&self, frame: &[u8]) {
        tracing::debug!("ARP frame of {} bytes received", frame.len());
    }
}

/// Forwarding-backend integration point for the device driver layer.
///
/// Logs the rule pushes a driver would apply.
struct LogForwardingBackend;

#[async_trait]
impl ForwardingBackend for LogForwardingBackend {
    async fn install(&self, device: &str, port_name: &str, ctx: &RuleContext) -> SyncResult<()> {
        info!(
            "install rules: device={} port={} vni={}",
            device, port_name, ctx.segmentation_id
        );
        Ok(())
    }

    async fn remove(&self, device: &str, port_name: &str, ctx: &RuleContext) -> SyncResult<()> {
        info!(
            "remove rules: device={} port={} vni={}",
            device, port_name, ctx.segmentation_id
        );
        Ok(())
    }
}

/// DHCP-store integration point.
struct LogDhcpStore;

#[async_trait]
impl DhcpStore for LogDhcpStore {
    async fn set_binding(
        &self,
        mac: &str,
        ip: Ipv4Addr,
        _authoritative: bool,
        options: &DhcpOptions,
    ) -> SyncResult<()> {
        info!(
            "set binding: {} -> {} (mask {}, dns {})",
            mac, ip, options.subnet_mask, options.domain_server
        );
        Ok(())
    }

    async fn remove_binding(&self, mac: &str) -> SyncResult<()> {
        info!("remove binding: {}", mac);
        Ok(())
    }
}

/// Topology-store integration point; empty until a platform source is wired.
struct EmptyTopology;

#[async_trait]
impl TopologyView for EmptyTopology {
    async fn devices(&self) -> Vec<String> {
        vec![]
    }

    async fn ports(&self, _device: &str) -> Vec<SwitchPort> {
        vec![]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    info!("--- Starting switchsyncd ---");

    let manager = SwitchingManager::new(
        Arc::new(FileConfigStore::new(&args.config)),
        Arc::new(EmptyTopology),
        Arc::new(HttpSessionFactory),
        Arc::new(LogForwardingBackend),
        Arc::new(LogDhcpStore),
    );
    manager.activate().await?;

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    manager.deactivate().await;
    Ok(())
}
