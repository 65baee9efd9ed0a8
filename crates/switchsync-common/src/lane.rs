//! Serialized event-processing lanes.
//!
//! A lane turns concurrent event delivery into strict one-at-a-time in-order
//! processing. The synchronizer runs two independent lanes (topology and
//! configuration) so a slow reconfiguration cannot delay routine
//! port-up/port-down handling and vice versa.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::SyncError;

/// A named, single-worker FIFO event queue.
///
/// `submit()` enqueues an event for asynchronous processing and never blocks
/// the caller. The worker processes events strictly in submission order;
/// processing of one event completes (success or failure) before the next
/// begins. A handler failure is logged and the lane continues; no event is
/// retried automatically. No ordering is guaranteed across different lanes.
pub struct EventLane<E> {
    name: String,
    tx: mpsc::UnboundedSender<E>,
    worker: JoinHandle<()>,
}

impl<E: Send + 'static> EventLane<E> {
    /// Spawns a lane worker running `handler` for each submitted event.
    pub fn spawn<H, Fut>(name: impl Into<String>, mut handler: H) -> Self
    where
        H: FnMut(E) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send,
    {
        let name = name.into();
        let worker_name = name.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<E>();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = handler(event).await {
                    warn!("{} lane: event dropped after failure: {}", worker_name, err);
                }
            }
            debug!("{} lane: drained, worker exiting", worker_name);
        });

        Self { name, tx, worker }
    }

    /// Returns the lane name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues an event for in-order processing.
    ///
    /// Returns false if the lane has already been shut down.
    pub fn submit(&self, event: E) -> bool {
        if self.tx.send(event).is_err() {
            warn!("{} lane: submit after shutdown, event dropped", self.name);
            return false;
        }
        true
    }

    /// Shuts the lane down, draining already-queued events first.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.worker.await {
            error!("{} lane: worker panicked: {}", self.name, err);
        }
    }
}
