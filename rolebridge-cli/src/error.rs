//! Client error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Server rejected the request or the stream ended with an error frame
    #[error("Request failed: {0}")]
    Failed(String),

    /// User stopped the request; not a failure
    #[error("Cancelled by user")]
    Cancelled,

    /// Server response does not follow the stream protocol
    #[error("Unexpected server response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
