//! Common plumbing for the tenant-network switching synchronizer.
//!
//! This crate provides the pieces shared by the synchronizer daemon and any
//! future control-plane components:
//!
//! - [`SyncError`]: the error taxonomy for directory, backend, and DHCP
//!   collaborator calls
//! - [`EventLane`]: a named, strictly-ordered single-worker event queue
//!
//! # Architecture
//!
//! Event delivery is concurrent (topology notifications, configuration
//! notifications, and administrative calls arrive on independent tasks), but
//! all state-changing work is confined to serialized lanes. Each lane is an
//! [`EventLane`]: callers enqueue without blocking, a single worker processes
//! events one at a time in FIFO order, and a failure in one event never halts
//! the lane.

mod error;
mod lane;

pub use error::{SyncError, SyncResult};
pub use lane::EventLane;
