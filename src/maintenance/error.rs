use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("No node selected: pass endpoints or choose all nodes")]
    NoNodesSelected,

    #[error("Unknown endpoints: {0:?}")]
    UnknownEndpoints(Vec<String>),

    #[error("Client error: {0}")]
    ClientError(#[from] crate::client::ClientError),

    #[error("Session task failed: {0}")]
    SessionTask(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type MaintenanceResult<T> = Result<T, MaintenanceError>;
