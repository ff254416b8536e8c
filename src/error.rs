//! Error types shared by the codec, broker and pipelines.

/// Result type for voteshare operations.
pub type Result<T> = std::result::Result<T, VoteShareError>;

/// Errors that can occur while relaying votes.
#[derive(Debug, thiserror::Error)]
pub enum VoteShareError {
    /// A vote could not be encoded (field exceeds the wire length prefix).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Inbound bytes were truncated or otherwise not a valid vote encoding.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Connection or protocol failure talking to the broker.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Operation attempted on a pool that has been shut down.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for VoteShareError {
    fn from(e: redis::RedisError) -> Self {
        VoteShareError::Broker(e.to_string())
    }
}
