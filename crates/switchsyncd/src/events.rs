//! Topology and configuration event types.
//!
//! Events arrive from external sources and are serialized onto the two
//! processing lanes. Both unions are matched exhaustively; variants the
//! synchronizer does not care about are no-ops, not errors.

use crate::types::SwitchPort;

/// A switch-layer topology notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// A switch appeared.
    SwitchAdded {
        /// Switch/device identity.
        device: String,
    },
    /// A switch became reachable or unreachable.
    SwitchAvailabilityChanged {
        /// Switch/device identity.
        device: String,
        /// True if the switch is now reachable.
        available: bool,
    },
    /// A port appeared on a switch.
    PortAdded {
        /// Switch/device identity.
        device: String,
        /// Port snapshot.
        port: SwitchPort,
    },
    /// A port changed on a switch (including enable/disable).
    PortUpdated {
        /// Switch/device identity.
        device: String,
        /// Port snapshot after the change.
        port: SwitchPort,
    },
    /// A port disappeared from a switch.
    PortRemoved {
        /// Switch/device identity.
        device: String,
        /// Last-known port snapshot.
        port: SwitchPort,
    },
    /// A host disappeared from the topology.
    HostRemoved {
        /// Host identity.
        host: String,
    },
}

/// A configuration-registry notification.
///
/// Only additions and updates trigger a reload; removals are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEvent {
    /// Configuration object was added.
    Added,
    /// Configuration object was updated.
    Updated,
    /// Configuration object was removed.
    Removed,
}
