use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Node {0} is unreachable: {1}")]
    Unreachable(String, String),

    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("Node {0} returned an unexpected response: {1}")]
    InvalidResponse(String, String),
}

pub type ClientResult<T> = Result<T, ClientError>;
