use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealError {
    #[error("Invalid object list format at line {line}: {content:?}")]
    InvalidFormat { line: u64, content: String },

    #[error("Invalid object list path: {0}")]
    InvalidListPath(PathBuf),

    #[error("Status record has {status} entries but the list has {lines} lines")]
    StatusMismatch { status: u64, lines: u64 },

    #[error("Invalid heal target: {0}")]
    InvalidTarget(String),

    #[error("Invalid rate: {0} requests per second")]
    InvalidQps(u32),

    #[error("No healer configured")]
    NoHealers,

    #[error("Client error: {0}")]
    ClientError(#[from] crate::client::ClientError),

    #[error("Heal task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type HealResult<T> = Result<T, HealError>;
