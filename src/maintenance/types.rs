use crate::client::{MaintenanceStatus, NodeMaintenanceState, VolumeMaintenanceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters shared by every node's maintenance session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// How often each node is polled and the table refreshed
    pub poll_interval: Duration,

    /// Throttle forwarded to the node, opaque to us
    pub rate: f64,

    /// Window in which the node may run the job, opaque to us
    pub time_range: String,

    /// Drives to maintain (empty = all)
    pub drives: Vec<String>,

    /// Buckets to maintain (empty = all)
    pub buckets: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            rate: 0.9,
            time_range: "02:00:00-08:00:00".to_string(),
            drives: Vec::new(),
            buckets: Vec::new(),
        }
    }
}

impl MaintenanceConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How long a finished session keeps its final snapshot visible.
    pub fn grace_period(&self) -> Duration {
        self.poll_interval * 3
    }
}

/// Point-in-time view of one node's maintenance progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceSnapshot {
    pub endpoint: String,
    pub status: NodeMaintenanceState,
    pub current_volume: String,
    pub current_detail: String,
    pub completed_volumes: usize,
    pub total_volumes: usize,
    pub message: String,
    pub captured_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl MaintenanceSnapshot {
    pub fn from_status(endpoint: impl Into<String>, status: &MaintenanceStatus) -> Self {
        let mut completed = 0;
        let mut current_volume = String::new();
        let mut current_detail = String::new();

        for (name, volume) in &status.volumes {
            match volume.status {
                VolumeMaintenanceState::Completed => completed += 1,
                // last one examined wins
                VolumeMaintenanceState::Running | VolumeMaintenanceState::Failed => {
                    current_volume = name.clone();
                    current_detail = volume.log.clone();
                }
                VolumeMaintenanceState::Waiting => {}
            }
        }

        let captured_at = Utc::now();
        let elapsed = status
            .start_time
            .and_then(|start| (captured_at - start).to_std().ok())
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into(),
            status: status.status,
            current_volume,
            current_detail,
            completed_volumes: completed,
            total_volumes: status.volumes.len(),
            message: status.error.clone(),
            captured_at,
            elapsed,
        }
    }

    /// Snapshot for a node we could not get any status from.
    pub fn failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: NodeMaintenanceState::Failed,
            current_volume: String::new(),
            current_detail: String::new(),
            completed_volumes: 0,
            total_volumes: 0,
            message: message.into(),
            captured_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Same view, overridden as failed with `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.status = NodeMaintenanceState::Failed;
        self.message = message.into();
        self
    }

    /// Time since this snapshot was taken.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or_default()
    }
}

/// How a node's session ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Node reported success
    Succeeded,
    /// Node went back to idle after we started it
    Returned,
    /// Node reported failure
    Failed(String),
    /// The start request itself was rejected
    StartFailed(String),
    /// Operator interrupt
    Cancelled,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Succeeded | SessionOutcome::Returned)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            SessionOutcome::Succeeded => "succeeded",
            SessionOutcome::Returned => "returned",
            SessionOutcome::Failed(_) => "failed",
            SessionOutcome::StartFailed(_) => "start_failed",
            SessionOutcome::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::VolumeStatus;
    use std::collections::BTreeMap;

    fn volume(status: VolumeMaintenanceState, log: &str) -> VolumeStatus {
        VolumeStatus {
            status,
            log: log.to_string(),
        }
    }

    #[test]
    fn test_snapshot_counts_volumes() {
        let mut volumes = BTreeMap::new();
        volumes.insert("/data1".to_string(), volume(VolumeMaintenanceState::Completed, ""));
        volumes.insert("/data2".to_string(), volume(VolumeMaintenanceState::Completed, ""));
        volumes.insert("/data3".to_string(), volume(VolumeMaintenanceState::Running, "dumping"));
        volumes.insert("/data4".to_string(), volume(VolumeMaintenanceState::Waiting, ""));

        let status = MaintenanceStatus {
            status: NodeMaintenanceState::Running,
            volumes,
            error: String::new(),
            start_time: Some(Utc::now() - chrono::Duration::seconds(30)),
        };

        let snap = MaintenanceSnapshot::from_status("10.0.0.1:9000", &status);
        assert_eq!(snap.completed_volumes, 2);
        assert_eq!(snap.total_volumes, 4);
        assert_eq!(snap.current_volume, "/data3");
        assert_eq!(snap.current_detail, "dumping");
        assert!(snap.elapsed >= Duration::from_secs(29));
    }

    #[test]
    fn test_snapshot_current_is_last_examined() {
        let mut volumes = BTreeMap::new();
        volumes.insert("/a".to_string(), volume(VolumeMaintenanceState::Failed, "io error"));
        volumes.insert("/b".to_string(), volume(VolumeMaintenanceState::Running, "compacting"));
        volumes.insert("/c".to_string(), volume(VolumeMaintenanceState::Completed, ""));

        let status = MaintenanceStatus {
            volumes,
            ..MaintenanceStatus::idle()
        };
        let snap = MaintenanceSnapshot::from_status("n1", &status);
        assert_eq!(snap.current_volume, "/b");
        assert_eq!(snap.current_detail, "compacting");
        assert_eq!(snap.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_with_failure_keeps_progress() {
        let status = MaintenanceStatus {
            status: NodeMaintenanceState::Running,
            ..MaintenanceStatus::idle()
        };
        let snap = MaintenanceSnapshot::from_status("n1", &status).with_failure("timeout");
        assert_eq!(snap.status, NodeMaintenanceState::Failed);
        assert_eq!(snap.message, "timeout");
        assert_eq!(snap.endpoint, "n1");
    }

    #[test]
    fn test_grace_period() {
        let config = MaintenanceConfig::default().with_poll_interval(Duration::from_millis(200));
        assert_eq!(config.grace_period(), Duration::from_millis(600));
        assert_eq!(MaintenanceConfig::default().time_range, "02:00:00-08:00:00");
    }

    #[test]
    fn test_outcome_success() {
        assert!(SessionOutcome::Succeeded.is_success());
        assert!(SessionOutcome::Returned.is_success());
        assert!(!SessionOutcome::Failed("x".into()).is_success());
        assert!(!SessionOutcome::Cancelled.is_success());
    }
}
