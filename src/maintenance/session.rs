//! Per-node maintenance state machine
//!
//! A session owns one node's maintenance run end to end: it polls the node,
//! starts the job the first time it finds the node idle, and stops once the
//! node reaches a terminal state. Every successful poll is published to the
//! node's relay before the transition is evaluated.

use crate::client::{NodeClient, NodeMaintenanceState};
use crate::maintenance::relay::{relay, RelayReceiver, RelaySender};
use crate::maintenance::types::{MaintenanceConfig, MaintenanceSnapshot, SessionOutcome};
use crate::metrics;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a session does after observing a node state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Issue the start request
    Start,
    /// Keep polling
    Poll,
    /// Terminate with the given outcome
    Stop(SessionOutcome),
}

/// Transition table for one poll result.
pub fn next_action(state: NodeMaintenanceState, started: bool, error: &str) -> SessionAction {
    match (state, started) {
        (NodeMaintenanceState::Idle, false) => SessionAction::Start,
        // back to idle after our own start: the run is over
        (NodeMaintenanceState::Idle, true) => SessionAction::Stop(SessionOutcome::Returned),
        (NodeMaintenanceState::Running, _) => SessionAction::Poll,
        (NodeMaintenanceState::Succeeded, _) => SessionAction::Stop(SessionOutcome::Succeeded),
        (NodeMaintenanceState::Failed, _) => {
            SessionAction::Stop(SessionOutcome::Failed(error.to_string()))
        }
    }
}

pub struct MaintenanceSession {
    client: Arc<dyn NodeClient>,
    config: Arc<MaintenanceConfig>,
    endpoint: String,
    started: bool,
}

impl MaintenanceSession {
    pub fn new(client: Arc<dyn NodeClient>, config: Arc<MaintenanceConfig>) -> Self {
        let endpoint = client.endpoint();
        Self {
            client,
            config,
            endpoint,
            started: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether this session has issued its start request.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Poll once and apply the transition. Returns the outcome when the
    /// session should terminate.
    pub async fn poll_once(&mut self, relay: &RelaySender) -> Option<SessionOutcome> {
        let status = match self.client.maintenance_status().await {
            Ok(status) => status,
            Err(e) => {
                // transient; keep polling
                warn!(endpoint = %self.endpoint, error = %e, "maintenance status poll failed");
                metrics::record_maintenance_poll(&self.endpoint, false);
                relay.fail(e.to_string());
                return None;
            }
        };
        metrics::record_maintenance_poll(&self.endpoint, true);
        relay.publish(MaintenanceSnapshot::from_status(self.endpoint.clone(), &status));

        match next_action(status.status, self.started, &status.error) {
            SessionAction::Start => {
                let config = &self.config;
                match self
                    .client
                    .start_maintenance(config.rate, &config.time_range, &config.drives, &config.buckets)
                    .await
                {
                    Ok(()) => {
                        info!(endpoint = %self.endpoint, "disk maintenance started");
                        metrics::record_maintenance_started(&self.endpoint);
                        self.started = true;
                        None
                    }
                    Err(e) => {
                        warn!(endpoint = %self.endpoint, error = %e, "failed to start disk maintenance");
                        relay.fail(e.to_string());
                        Some(SessionOutcome::StartFailed(e.to_string()))
                    }
                }
            }
            SessionAction::Poll => None,
            SessionAction::Stop(outcome) => Some(outcome),
        }
    }

    /// Drive the node until it terminates or `cancel` fires.
    ///
    /// After a terminal state the last snapshot stays in the relay for the
    /// configured grace period; the relay closes when this returns.
    pub async fn run(mut self, relay: RelaySender, cancel: CancellationToken) -> SessionOutcome {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = ticker.tick() => {}
            }

            // a node that never answers must not outlive cancellation
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                polled = self.poll_once(&relay) => polled,
            };
            if let Some(outcome) = polled {
                break outcome;
            }
        };

        info!(endpoint = %self.endpoint, outcome = outcome.as_label(), "maintenance session finished");
        metrics::record_session_finished(outcome.as_label());

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = time::sleep(self.config.grace_period()) => {}
        }
        drop(relay);
        outcome
    }

    fn cancelled(&self) -> SessionOutcome {
        debug!(endpoint = %self.endpoint, "maintenance session cancelled");
        metrics::record_session_finished(SessionOutcome::Cancelled.as_label());
        SessionOutcome::Cancelled
    }

    /// Run the session on its own task, returning the consumer side of its relay.
    pub fn spawn(self, cancel: CancellationToken) -> (RelayReceiver, JoinHandle<SessionOutcome>) {
        let (tx, rx) = relay(self.endpoint.clone());
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }
}
