use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// No channel pairs and no legacy pair: the relay runs but routes nothing.
    #[error("No source/destination channels configured")]
    ConfigurationMissing,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed channel reference: {0}")]
    MalformedChannelReference(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RelayError {
    /// Short error code string, used in logs and command replies.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::ConfigurationMissing => "CONFIGURATION_MISSING",
            RelayError::AlreadyExists(_) => "ALREADY_EXISTS",
            RelayError::NotFound(_) => "NOT_FOUND",
            RelayError::MalformedChannelReference(_) => "MALFORMED_CHANNEL_REFERENCE",
            RelayError::Transport(_) => "TRANSPORT_ERROR",
            RelayError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Failures of the outbound send capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Send timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Unknown channel: {0}")]
    UnknownChannel(u64),
}

pub type Result<T> = std::result::Result<T, RelayError>;
