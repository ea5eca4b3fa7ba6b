//! eth-failover error types

use ethers::providers::{ProviderError, RpcError};

/// eth-failover error types
#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    // Configuration errors
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    #[error("invalid {field}: {value} (must be shorter than {limit} characters)")]
    NameTooLong {
        field: &'static str,
        value: String,
        limit: usize,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    // Connection errors
    #[error("failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("connection to {0} is closed")]
    Closed(String),

    // Caller-side context errors; these never trigger failover
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    // Remote/transport errors
    #[error("JSON-RPC error ({code}): {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found")]
    NotFound,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    // Metrics backend
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl FailoverError {
    /// Whether this error reports that the caller's own context was canceled
    /// or ran past its deadline, as opposed to a failure of the endpoint.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }

    /// Whether this error is a configuration error raised at construction.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig(_)
                | Self::NameTooLong { .. }
                | Self::InvalidConfig { .. }
                | Self::Configuration(_)
        )
    }
}

impl From<ProviderError> for FailoverError {
    fn from(err: ProviderError) -> Self {
        // Keep the node's error code and message intact
        if let Some(resp) = err.as_error_response() {
            return FailoverError::Rpc {
                code: resp.code,
                message: resp.message.clone(),
                data: resp.data.clone(),
            };
        }
        FailoverError::Transport(err.to_string())
    }
}

/// Result type alias for eth-failover operations
pub type Result<T> = std::result::Result<T, FailoverError>;
