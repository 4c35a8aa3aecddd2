//! Latest-value mailbox between a maintenance session and the aggregator
//!
//! The producer overwrites a single guarded slot and never waits. The
//! consumer gets whatever the slot holds on every read and only waits while
//! nothing has been produced yet, so a slow display never sees queued, stale
//! snapshots.

use crate::maintenance::types::MaintenanceSnapshot;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Slot {
    latest: Option<MaintenanceSnapshot>,
    closed: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    notify: Notify,
}

/// Create a connected sender/receiver pair for one node.
pub fn relay(endpoint: impl Into<String>) -> (RelaySender, RelayReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            latest: None,
            closed: false,
        }),
        notify: Notify::new(),
    });

    let sender = RelaySender {
        endpoint: endpoint.into(),
        shared: shared.clone(),
    };
    (sender, RelayReceiver { shared })
}

/// Producer half. Dropping it closes the relay.
pub struct RelaySender {
    endpoint: String,
    shared: Arc<Shared>,
}

impl RelaySender {
    /// Replace the held snapshot.
    pub fn publish(&self, snapshot: MaintenanceSnapshot) {
        self.shared.slot.lock().latest = Some(snapshot);
        self.shared.notify.notify_waiters();
    }

    /// Override the held snapshot as failed, or synthesize one if nothing
    /// was produced yet.
    pub fn fail(&self, message: impl Into<String>) {
        {
            let mut slot = self.shared.slot.lock();
            let failed = match slot.latest.take() {
                Some(snapshot) => snapshot.with_failure(message),
                None => MaintenanceSnapshot::failed(self.endpoint.clone(), message),
            };
            slot.latest = Some(failed);
        }
        self.shared.notify.notify_waiters();
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for RelaySender {
    fn drop(&mut self) {
        self.shared.slot.lock().closed = true;
        self.shared.notify.notify_waiters();
    }
}

/// Consumer half.
pub struct RelayReceiver {
    shared: Arc<Shared>,
}

impl RelayReceiver {
    /// Latest snapshot, waiting only until the first one exists.
    ///
    /// Returns `None` once the sender is gone or `cancel` fires.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<MaintenanceSnapshot> {
        loop {
            // Registered before the check so a publish in between is not lost.
            let notified = self.shared.notify.notified();
            {
                let slot = self.shared.slot.lock();
                if slot.closed {
                    return None;
                }
                if let Some(snapshot) = &slot.latest {
                    return Some(snapshot.clone());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Held snapshot without waiting, even after close.
    pub fn peek(&self) -> Option<MaintenanceSnapshot> {
        self.shared.slot.lock().latest.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }
}
