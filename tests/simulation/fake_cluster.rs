//! In-process stand-in for a cluster of storage nodes
//!
//! Nodes replay a scripted sequence of maintenance statuses and answer heal
//! calls with configurable drive layouts and failures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use clustermend::client::{
    ClientError, ClientResult, DriveState, HealDriveInfo, HealOpts, HealResultItem,
    MaintenanceStatus, NodeClient, NodeMaintenanceState, VolumeMaintenanceState, VolumeStatus,
};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Build a raw status with `completed` of `volumes` done and the next one running.
pub fn status(state: NodeMaintenanceState, volumes: usize, completed: usize) -> MaintenanceStatus {
    let mut map = BTreeMap::new();
    for i in 0..volumes {
        let status = if i < completed {
            VolumeMaintenanceState::Completed
        } else if i == completed && state == NodeMaintenanceState::Running {
            VolumeMaintenanceState::Running
        } else {
            VolumeMaintenanceState::Waiting
        };
        map.insert(
            format!("/data{i}"),
            VolumeStatus {
                status,
                log: format!("scanned {}%", completed * 100 / volumes.max(1)),
            },
        );
    }
    MaintenanceStatus {
        status: state,
        volumes: map,
        error: String::new(),
        start_time: Some(Utc::now()),
    }
}

pub fn failed_status(message: &str) -> MaintenanceStatus {
    MaintenanceStatus {
        error: message.to_string(),
        ..status(NodeMaintenanceState::Failed, 2, 1)
    }
}

pub struct SimulatedNode {
    endpoint: String,
    script: Mutex<VecDeque<MaintenanceStatus>>,
    pub starts: AtomicUsize,
    pub finishes: AtomicUsize,
    finish_error: Option<ClientError>,

    drives: Vec<String>,
    /// Drive indexes the node leaves unevaluated
    unknown_drives: HashSet<usize>,
    /// Drive indexes still missing after the heal
    missing_drives: HashSet<usize>,
    fail_keys: HashSet<String>,
    failure_rate: f64,
    heal_latency: Duration,
    /// Status polls and heals never get an answer
    unresponsive: bool,
    pub healed: Mutex<Vec<(String, String)>>,
}

impl SimulatedNode {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            script: Mutex::new(VecDeque::from([MaintenanceStatus::idle()])),
            starts: AtomicUsize::new(0),
            finishes: AtomicUsize::new(0),
            finish_error: None,
            drives: (1..=4)
                .map(|i| format!("http://{endpoint}/data{i}"))
                .collect(),
            unknown_drives: HashSet::new(),
            missing_drives: HashSet::new(),
            fail_keys: HashSet::new(),
            failure_rate: 0.0,
            heal_latency: Duration::ZERO,
            unresponsive: false,
            healed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, script: Vec<MaintenanceStatus>) -> Self {
        *self.script.lock() = script.into();
        self
    }

    pub fn with_finish_error(mut self, message: &str) -> Self {
        self.finish_error = Some(ClientError::Request {
            endpoint: self.endpoint.clone(),
            message: message.to_string(),
        });
        self
    }

    pub fn with_unknown_drives(mut self, drives: &[usize]) -> Self {
        self.unknown_drives = drives.iter().copied().collect();
        self
    }

    pub fn with_missing_drives(mut self, drives: &[usize]) -> Self {
        self.missing_drives = drives.iter().copied().collect();
        self
    }

    pub fn with_fail_keys(mut self, keys: &[&str]) -> Self {
        self.fail_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    pub fn with_heal_latency(mut self, latency: Duration) -> Self {
        self.heal_latency = latency;
        self
    }

    pub fn unresponsive(mut self) -> Self {
        self.unresponsive = true;
        self
    }

    pub fn into_client(self: Arc<Self>) -> Arc<dyn NodeClient> {
        self
    }

    pub fn healed_keys(&self) -> Vec<String> {
        self.healed.lock().iter().map(|(_, key)| key.clone()).collect()
    }

    fn drive_states(&self, after: bool) -> Vec<HealDriveInfo> {
        self.drives
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                let state = if self.unknown_drives.contains(&i) {
                    DriveState::Unknown
                } else if !after || self.missing_drives.contains(&i) {
                    DriveState::Missing
                } else {
                    DriveState::Ok
                };
                HealDriveInfo::new(endpoint.clone(), state)
            })
            .collect()
    }
}

#[async_trait]
impl NodeClient for SimulatedNode {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn maintenance_status(&self) -> ClientResult<MaintenanceStatus> {
        if self.unresponsive {
            return std::future::pending().await;
        }
        let mut script = self.script.lock();
        let status = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        status.ok_or_else(|| ClientError::InvalidResponse(self.endpoint.clone(), "empty script".into()))
    }

    async fn start_maintenance(
        &self,
        _rate: f64,
        _time_range: &str,
        _drives: &[String],
        _buckets: &[String],
    ) -> ClientResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish_maintenance(&self) -> ClientResult<()> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        match &self.finish_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn heal_object(
        &self,
        bucket: &str,
        object: &str,
        _opts: &HealOpts,
    ) -> ClientResult<HealResultItem> {
        if self.unresponsive {
            return std::future::pending().await;
        }
        if !self.heal_latency.is_zero() {
            tokio::time::sleep(self.heal_latency).await;
        }
        self.healed
            .lock()
            .push((bucket.to_string(), object.to_string()));

        let unlucky = self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate);
        if unlucky || self.fail_keys.contains(object) {
            return Err(ClientError::Unreachable(
                self.endpoint.clone(),
                "connection reset".to_string(),
            ));
        }

        Ok(HealResultItem {
            bucket: bucket.to_string(),
            object: object.to_string(),
            before: self.drive_states(false),
            after: self.drive_states(true),
            object_size: 1024,
            data_blocks: 2,
            parity_blocks: 2,
        })
    }
}
