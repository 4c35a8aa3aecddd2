//! Maintenance run across a set of nodes
//!
//! Spawns one session per node, drives the aggregator until every session
//! has closed, then asks for confirmation before cleaning up on each node.

use crate::client::{ClientError, ClientResult, NodeClient};
use crate::maintenance::aggregator::{AggregatorExit, MaintenanceAggregator};
use crate::maintenance::error::{MaintenanceError, MaintenanceResult};
use crate::maintenance::session::MaintenanceSession;
use crate::maintenance::types::{MaintenanceConfig, MaintenanceSnapshot, SessionOutcome};
use crate::metrics;
use crate::prompt::Confirm;
use futures::future::join_all;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const CLEANUP_PROMPT: &str =
    "finish disk maintenance, choose yes to clean, no to do nothing [Yes|No]";

/// Pick the nodes a start/finish command applies to.
pub fn select_nodes(
    clients: Vec<Arc<dyn NodeClient>>,
    endpoints: &[String],
    all_nodes: bool,
) -> MaintenanceResult<Vec<Arc<dyn NodeClient>>> {
    if all_nodes {
        return Ok(clients);
    }
    if endpoints.is_empty() {
        return Err(MaintenanceError::NoNodesSelected);
    }

    let wanted: HashSet<&str> = endpoints.iter().map(String::as_str).collect();
    let known: HashSet<String> = clients.iter().map(|c| c.endpoint()).collect();
    let unknown: Vec<String> = endpoints
        .iter()
        .filter(|e| !known.contains(e.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(MaintenanceError::UnknownEndpoints(unknown));
    }

    Ok(clients
        .into_iter()
        .filter(|c| wanted.contains(c.endpoint().as_str()))
        .collect())
}

/// One-shot status of a single node.
pub async fn query_status(client: &dyn NodeClient) -> ClientResult<MaintenanceSnapshot> {
    let status = client.maintenance_status().await?;
    Ok(MaintenanceSnapshot::from_status(client.endpoint(), &status))
}

/// Per-node result of a cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub finished: Vec<String>,
    pub failed: Vec<(String, ClientError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Finish maintenance on every node; one failure does not stop the rest.
pub async fn finish_nodes(clients: &[Arc<dyn NodeClient>]) -> CleanupReport {
    let results = join_all(clients.iter().map(|client| async move {
        (client.endpoint(), client.finish_maintenance().await)
    }))
    .await;

    let mut report = CleanupReport::default();
    for (endpoint, result) in results {
        match result {
            Ok(()) => {
                info!(endpoint = %endpoint, "disk maintenance finished");
                metrics::record_cleanup(&endpoint, true);
                report.finished.push(endpoint);
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "failed to finish disk maintenance");
                metrics::record_cleanup(&endpoint, false);
                report.failed.push((endpoint, e));
            }
        }
    }
    report
}

#[derive(Debug)]
pub struct MaintenanceReport {
    pub exit: AggregatorExit,
    pub outcomes: Vec<(String, SessionOutcome)>,
    pub snapshots: Vec<Option<MaintenanceSnapshot>>,
    /// `None` when cleanup was skipped (cancelled or declined)
    pub cleanup: Option<CleanupReport>,
}

pub struct MaintenanceCoordinator {
    clients: Vec<Arc<dyn NodeClient>>,
    config: Arc<MaintenanceConfig>,
}

impl MaintenanceCoordinator {
    pub fn new(clients: Vec<Arc<dyn NodeClient>>, config: MaintenanceConfig) -> Self {
        Self {
            clients,
            config: Arc::new(config),
        }
    }

    pub async fn run<W: Write>(
        &self,
        out: W,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> MaintenanceResult<MaintenanceReport> {
        if self.clients.is_empty() {
            return Err(MaintenanceError::NoNodesSelected);
        }

        let sessions_cancel = cancel.child_token();
        let mut feeds = Vec::with_capacity(self.clients.len());
        let mut handles = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            let session = MaintenanceSession::new(client.clone(), self.config.clone());
            let endpoint = session.endpoint().to_string();
            let (feed, handle) = session.spawn(sessions_cancel.clone());
            feeds.push(feed);
            handles.push((endpoint, handle));
        }

        let mut aggregator = MaintenanceAggregator::new(feeds, self.config.poll_interval, out);
        let exit = match aggregator.run(cancel).await {
            Ok(exit) => exit,
            Err(e) => {
                sessions_cancel.cancel();
                return Err(e);
            }
        };

        let mut outcomes = Vec::with_capacity(handles.len());
        for (endpoint, handle) in handles {
            let outcome = handle
                .await
                .map_err(|e| MaintenanceError::SessionTask(e.to_string()))?;
            outcomes.push((endpoint, outcome));
        }
        let snapshots = aggregator.snapshots().to_vec();

        let cleanup = match exit {
            AggregatorExit::Cancelled => None,
            AggregatorExit::Completed if confirm.confirm(CLEANUP_PROMPT) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    report = finish_nodes(&self.clients) => Some(report),
                }
            }
            AggregatorExit::Completed => None,
        };

        Ok(MaintenanceReport {
            exit,
            outcomes,
            snapshots,
            cleanup,
        })
    }
}
