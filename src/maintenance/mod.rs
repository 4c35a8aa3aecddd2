//! Disk maintenance across the cluster
//!
//! One [`MaintenanceSession`] per node feeds a latest-value [`relay`] that the
//! [`MaintenanceAggregator`] reads on a fixed tick to redraw a single table.

pub mod aggregator;
pub mod coordinator;
pub mod error;
pub mod relay;
pub mod render;
pub mod session;
pub mod types;

pub use crate::client::{NodeMaintenanceState, VolumeMaintenanceState};
pub use aggregator::{AggregatorExit, MaintenanceAggregator};
pub use coordinator::{
    finish_nodes, query_status, select_nodes, CleanupReport, MaintenanceCoordinator,
    MaintenanceReport,
};
pub use error::{MaintenanceError, MaintenanceResult};
pub use relay::{relay, RelayReceiver, RelaySender};
pub use session::{next_action, MaintenanceSession, SessionAction};
pub use types::{MaintenanceConfig, MaintenanceSnapshot, SessionOutcome};
