//! Daemon configuration and the configuration store.
//!
//! The configuration object carries the directory endpoint, credentials, and
//! the administrative flow-pushing toggle. It is fetched from a
//! [`ConfigStore`] on activation and on every configuration-changed event;
//! an absent configuration leaves the daemon idle until one appears.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Switching-synchronizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchingConfig {
    /// Base URL of the tenant-network directory API.
    pub directory_endpoint: String,

    /// Base URL of the identity service, if authentication is delegated.
    #[serde(default)]
    pub identity_endpoint: Option<String>,

    /// Directory API user.
    #[serde(default)]
    pub username: Option<String>,

    /// Directory API password.
    #[serde(default)]
    pub password: Option<String>,

    /// Administrative dry-run toggle: suppress all backend install/remove
    /// and DHCP calls while leaving event processing and logging active.
    #[serde(default)]
    pub do_not_push_flows: bool,
}

/// Source of the current configuration object.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetches the current configuration, or `None` if absent.
    async fn current(&self) -> Option<SwitchingConfig>;
}

/// Configuration store backed by a YAML file.
///
/// The file is re-read on every fetch so a configuration-changed event
/// always observes the latest contents. A missing or unparseable file is
/// reported as "no configuration".
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Creates a store reading from the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn current(&self) -> Option<SwitchingConfig> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    "Configuration file {} not readable: {}",
                    self.path.display(),
                    err
                );
                return None;
            }
        };
        match serde_yaml::from_str::<SwitchingConfig>(&raw) {
            Ok(config) => Some(config),
            Err(err) => {
                error!(
                    "Configuration file {} is malformed: {}",
                    self.path.display(),
                    err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_store_loads_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "directory_endpoint: http://neutron.example:9696\n\
             username: admin\n\
             password: secret\n\
             do_not_push_flows: true"
        )
        .unwrap();

        let store = FileConfigStore::new(file.path());
        let config = store.current().await.unwrap();
        assert_eq!(config.directory_endpoint, "http://neutron.example:9696");
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert!(config.do_not_push_flows);
        assert!(config.identity_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_file_store_missing_file() {
        let store = FileConfigStore::new("/nonexistent/switchsyncd.yaml");
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn test_file_store_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ not yaml").unwrap();

        let store = FileConfigStore::new(file.path());
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn test_reload_observes_changes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "directory_endpoint: http://a:9696\n").unwrap();

        let store = FileConfigStore::new(file.path());
        assert_eq!(
            store.current().await.unwrap().directory_endpoint,
            "http://a:9696"
        );

        std::fs::write(
            file.path(),
            "directory_endpoint: http://b:9696\ndo_not_push_flows: true\n",
        )
        .unwrap();
        let reloaded = store.current().await.unwrap();
        assert_eq!(reloaded.directory_endpoint, "http://b:9696");
        assert!(reloaded.do_not_push_flows);
    }
}
