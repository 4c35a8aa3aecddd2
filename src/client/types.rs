use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Overall maintenance state reported by a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeMaintenanceState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl NodeMaintenanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMaintenanceState::Idle => "idle",
            NodeMaintenanceState::Running => "running",
            NodeMaintenanceState::Succeeded => "succeeded",
            NodeMaintenanceState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeMaintenanceState::Succeeded | NodeMaintenanceState::Failed
        )
    }
}

impl fmt::Display for NodeMaintenanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-volume state inside a node's maintenance run. Written by the node only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMaintenanceState {
    Waiting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeStatus {
    pub status: VolumeMaintenanceState,
    #[serde(default)]
    pub log: String,
}

/// Raw maintenance status as returned by [`super::NodeClient::maintenance_status`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceStatus {
    pub status: NodeMaintenanceState,
    /// Volume path -> state. Ordered so that "last examined" is stable.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeStatus>,
    #[serde(default)]
    pub error: String,
    pub start_time: Option<DateTime<Utc>>,
}

impl MaintenanceStatus {
    pub fn idle() -> Self {
        Self {
            status: NodeMaintenanceState::Idle,
            volumes: BTreeMap::new(),
            error: String::new(),
            start_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealScanMode {
    #[default]
    Normal,
    Deep,
}

impl std::str::FromStr for HealScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(HealScanMode::Normal),
            "deep" => Ok(HealScanMode::Deep),
            other => Err(format!("unknown scan mode: {other}")),
        }
    }
}

/// Options forwarded verbatim with every heal call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealOpts {
    pub scan_mode: HealScanMode,
    pub recursive: bool,
    pub dry_run: bool,
    pub remove: bool,
    /// Erasure set index -> drive indexes to restrict the heal to.
    #[serde(default)]
    pub disks_index: BTreeMap<usize, Vec<usize>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveState {
    /// The node did not evaluate this drive.
    #[default]
    Unknown,
    Ok,
    Missing,
    Corrupted,
    Offline,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealDriveInfo {
    pub endpoint: String,
    pub state: DriveState,
}

impl HealDriveInfo {
    pub fn new(endpoint: impl Into<String>, state: DriveState) -> Self {
        Self {
            endpoint: endpoint.into(),
            state,
        }
    }
}

/// Outcome of healing one object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealResultItem {
    pub bucket: String,
    pub object: String,
    pub before: Vec<HealDriveInfo>,
    pub after: Vec<HealDriveInfo>,
    pub object_size: u64,
    #[serde(default)]
    pub data_blocks: usize,
    #[serde(default)]
    pub parity_blocks: usize,
}

impl HealResultItem {
    /// Drives in `Ok` state before and after the heal.
    pub fn online_counts(&self) -> (usize, usize) {
        (count_state(&self.before, DriveState::Ok), count_state(&self.after, DriveState::Ok))
    }

    pub fn missing_counts(&self) -> (usize, usize) {
        (
            count_state(&self.before, DriveState::Missing),
            count_state(&self.after, DriveState::Missing),
        )
    }

    pub fn corrupted_counts(&self) -> (usize, usize) {
        (
            count_state(&self.before, DriveState::Corrupted),
            count_state(&self.after, DriveState::Corrupted),
        )
    }

    pub fn offline_counts(&self) -> (usize, usize) {
        (
            count_state(&self.before, DriveState::Offline),
            count_state(&self.after, DriveState::Offline),
        )
    }

    /// Data/parity split, falling back to an even split when the node left it out.
    pub fn erasure_layout(&self) -> (usize, usize) {
        if self.data_blocks > 0 {
            return (self.data_blocks, self.parity_blocks);
        }
        let drives = self.before.len().max(self.after.len());
        let parity = drives / 2;
        (drives - parity, parity)
    }
}

fn count_state(drives: &[HealDriveInfo], state: DriveState) -> usize {
    drives.iter().filter(|d| d.state == state).count()
}
