//! Remote node administration contract
//!
//! The orchestration core never talks to the network itself; every call to a
//! storage node goes through [`NodeClient`]. One client addresses exactly one
//! node, so a cluster alias expands into one client per reachable server.

pub mod error;
pub mod types;

pub use error::{ClientError, ClientResult};
pub use types::{
    DriveState, HealDriveInfo, HealOpts, HealResultItem, HealScanMode, MaintenanceStatus,
    NodeMaintenanceState, VolumeMaintenanceState, VolumeStatus,
};

use async_trait::async_trait;

/// Administration calls against a single storage node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Address of the node this client talks to, e.g. `10.0.0.7:9000`.
    fn endpoint(&self) -> String;

    /// Current disk-maintenance status of the node.
    async fn maintenance_status(&self) -> ClientResult<MaintenanceStatus>;

    /// Kick off disk maintenance. `rate` and `time_range` are passed through
    /// untouched; empty `drives`/`buckets` mean "all".
    async fn start_maintenance(
        &self,
        rate: f64,
        time_range: &str,
        drives: &[String],
        buckets: &[String],
    ) -> ClientResult<()>;

    /// Remove the temporary state left behind by a maintenance run.
    async fn finish_maintenance(&self) -> ClientResult<()>;

    /// Heal one object and report its drive states before and after.
    async fn heal_object(
        &self,
        bucket: &str,
        object: &str,
        opts: &HealOpts,
    ) -> ClientResult<HealResultItem>;
}
