//! Error taxonomy shared by every instance operation
//!
//! Message texts are part of the wire contract: control-plane
//! consumers branch on them, so they must not be reworded.

use thiserror::Error;

/// Errors produced by instance lifecycle and configuration operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad instance name, bad server type at creation, or malformed
    /// start arguments
    #[error("{0}")]
    Validation(String),

    /// Operation violates a lifecycle precondition
    #[error("{0}")]
    State(String),

    /// Write or read attempted on a process that is not alive
    #[error("I/O channel is down")]
    ChannelDown,

    /// Request for an operation or type the engine does not model
    #[error("{0}")]
    NotSupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
