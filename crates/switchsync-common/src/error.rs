//! Error types for synchronizer operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Errors are
//! scoped to a single port or event: callers log them and move on rather
//! than halting a lane or a resync pass.

use thiserror::Error;

/// Result type alias for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while reconciling switch state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No configuration object is available yet.
    #[error("No switching configuration available")]
    ConfigMissing,

    /// An operation was invoked before the manager was configured.
    #[error("Manager is not configured")]
    NotConfigured,

    /// Tenant-network directory call failed.
    #[error("Directory operation failed: {operation}: {message}")]
    Directory {
        /// The operation that failed (e.g., "networks", "ports").
        operation: String,
        /// Error message.
        message: String,
    },

    /// A tenant entity field could not be parsed.
    #[error("Malformed field {field}={value:?}: {message}")]
    MalformedField {
        /// The field name (e.g., "segment_id", "cidr").
        field: String,
        /// The raw value.
        value: String,
        /// Error message.
        message: String,
    },

    /// No subnet exists for a tenant network.
    #[error("No subnet found for network '{network_id}'")]
    SubnetNotFound {
        /// The tenant network identity.
        network_id: String,
    },

    /// Forwarding-rule backend call failed.
    #[error("Backend operation failed: {operation}: {message}")]
    Backend {
        /// The operation that failed ("install" or "remove").
        operation: String,
        /// Error message.
        message: String,
    },

    /// DHCP binding store call failed.
    #[error("DHCP store operation failed: {operation}: {message}")]
    DhcpStore {
        /// The operation that failed ("set_binding" or "remove_binding").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl SyncError {
    /// Creates a directory error.
    pub fn directory(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directory {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-field error.
    pub fn malformed_field(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedField {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates a subnet-not-found error.
    pub fn subnet_not_found(network_id: impl Into<String>) -> Self {
        Self::SubnetNotFound {
            network_id: network_id.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a DHCP store error.
    pub fn dhcp_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DhcpStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error only aborts the operation for a single
    /// port or subnet, leaving the rest of the batch unaffected.
    pub fn is_per_port(&self) -> bool {
        !matches!(self, SyncError::ConfigMissing | SyncError::NotConfigured)
    }
}
