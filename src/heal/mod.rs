//! Healing of an externally supplied object list
//!
//! A job keeps a hard link to the list and one status byte per line under
//! `<work dir>/heal/object-list/<list name>/`, so an interrupted run picks up
//! where it stopped. The [`HealScanner`] offers pending lines to a
//! [`WorkerPool`] that calls each server at a bounded rate.

pub mod error;
pub mod healer;
pub mod pool;
pub mod progress;
pub mod reconcile;
pub mod runner;
pub mod scanner;
pub mod store;
pub mod types;

pub use error::{HealError, HealResult};
pub use healer::{classify_item, NodeHealer};
pub use pool::{ObjectHealer, PoolReport, WorkerExit, WorkerPool, WorkerTally};
pub use progress::{
    item_health, progress_channel, HealProgress, HealthColor, ProgressCounters, ProgressMode,
    ProgressReporter,
};
pub use reconcile::{parse_drive_endpoint, reconcile, TargetSet};
pub use runner::{heal_object_list, HealRunReport, HealRunner};
pub use scanner::{HealScanner, HealWorkItem, ScanSummary};
pub use store::{count_and_validate_lines, list_jobs, HealJobStore, StatusWriter};
pub use types::{HealItemStatus, HealJobConfig, StatusTally, STATUS_ENCODING_VERSION};
