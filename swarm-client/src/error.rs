//! Error types for the swarm client

use thiserror::Error;

use crate::animation::AnimationState;
use crate::protocol::ProtocolError;

/// Swarm client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket-level failure. Always resolved by reconnecting, never fatal on its own.
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    /// Malformed frame or envelope. The single message is dropped.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by a flight or LED primitive.
    #[error("Device error: {0}")]
    Device(String),

    #[error("Time sync failed: {0}")]
    TimeSync(String),

    /// Local write failure while storing a received file.
    #[error("File transfer failed: {0}")]
    FileTransfer(String),

    #[error("Animation session already active ({0})")]
    SessionActive(AnimationState),

    #[error("Animation is empty")]
    EmptyAnimation,

    /// Operator or signal requested termination.
    #[error("Shutdown requested")]
    Shutdown,
}

impl ClientError {
    /// Whether the node must stop instead of logging and carrying on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Config(_) | ClientError::Device(_) | ClientError::Shutdown
        )
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(e: toml::de::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(e: toml::ser::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
