//! Tenant-network directory client.
//!
//! The directory returns full snapshots of networks, subnets, and ports;
//! all filtering happens client-side. Entities are fetched fresh on every
//! call; the core keeps no cache, which makes it tolerant to eventual
//! external updates at the cost of repeated directory calls.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use switchsync_common::{SyncError, SyncResult};

use crate::config::SwitchingConfig;
use crate::types::{TenantNetwork, TenantPort, TenantSubnet};

/// Read-only access to the tenant-network directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetches all tenant networks.
    async fn networks(&self) -> SyncResult<Vec<TenantNetwork>>;

    /// Fetches all tenant subnets.
    async fn subnets(&self) -> SyncResult<Vec<TenantSubnet>>;

    /// Fetches all tenant ports.
    async fn ports(&self) -> SyncResult<Vec<TenantPort>>;
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    networks: Vec<TenantNetwork>,
}

#[derive(Debug, Deserialize)]
struct SubnetEnvelope {
    subnets: Vec<TenantSubnet>,
}

#[derive(Debug, Deserialize)]
struct PortEnvelope {
    ports: Vec<TenantPort>,
}

/// Directory client speaking the OpenStack-style networking REST API.
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    base: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpDirectoryClient {
    /// Builds a client bound to the given configuration.
    pub fn new(config: &SwitchingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: config.directory_endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, operation: &str) -> SyncResult<T> {
        let url = format!("{}/v2.0/{}", self.base, path);
        let mut request = self.http.get(&url);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|err| SyncError::directory(operation, err.to_string()))?
            .error_for_status()
            .map_err(|err| SyncError::directory(operation, err.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|err| SyncError::directory(operation, err.to_string()))
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn networks(&self) -> SyncResult<Vec<TenantNetwork>> {
        let envelope: NetworkEnvelope = self.fetch("networks", "networks").await?;
        Ok(envelope.networks)
    }

    async fn subnets(&self) -> SyncResult<Vec<TenantSubnet>> {
        let envelope: SubnetEnvelope = self.fetch("subnets", "subnets").await?;
        Ok(envelope.subnets)
    }

    async fn ports(&self) -> SyncResult<Vec<TenantPort>> {
        let envelope: PortEnvelope = self.fetch("ports", "ports").await?;
        Ok(envelope.ports)
    }
}
