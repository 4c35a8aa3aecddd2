//! Operator-side control core for an object-storage cluster.
//!
//! Two workflows are driven from here:
//! - disk maintenance, run independently on every node and shown as one
//!   live table ([`maintenance`])
//! - healing of a large, externally supplied object list with crash-safe
//!   resumption and per-server rate control ([`heal`])
//!
//! The network side lives behind [`client::NodeClient`]; the interactive
//! side behind [`prompt::Confirm`].

pub mod client;
pub mod heal;
pub mod maintenance;
pub mod metrics;
pub mod prompt;

pub use client::{ClientError, ClientResult, NodeClient};
pub use heal::{HealError, HealItemStatus, HealJobStore, HealResult};
pub use maintenance::{MaintenanceError, MaintenanceResult, MaintenanceSnapshot};
pub use prompt::Confirm;
