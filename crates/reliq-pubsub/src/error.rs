use thiserror::Error;

/// PubSub error types
#[derive(Error, Debug)]
pub enum PubSubError {
    #[error("Store error: {source}")]
    Store {
        #[from]
        source: reliq_store::StoreError,
    },

    #[error("Config error: {source}")]
    Config {
        #[from]
        source: reliq_config::ConfigError,
    },

    #[error("Publish error: {message}")]
    Publish { message: String },

    #[error("Acknowledgment error: {message}")]
    Ack { message: String },

    #[error("Delivery error: {message}")]
    Delivery { message: String },

    #[error("Payload missing for message '{key}'")]
    PayloadMissing { key: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Client shut down")]
    Shutdown,
}

impl PubSubError {
    /// Create a publish error
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Create an acknowledgment error
    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack {
            message: message.into(),
        }
    }

    /// Create a delivery error
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    /// Create a payload-missing error
    pub fn payload_missing(key: impl Into<String>) -> Self {
        Self::PayloadMissing { key: key.into() }
    }

    /// Whether retrying the failed operation can help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { source } => source.is_retryable(),
            Self::Config { .. } => false,
            Self::Publish { .. } => true,
            Self::Ack { .. } => true,
            Self::Delivery { .. } => true,
            Self::PayloadMissing { .. } => false,
            Self::Serialization { .. } => false,
            Self::Shutdown => false,
        }
    }

    /// Get the error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store { .. } => "store",
            Self::Config { .. } => "config",
            Self::Publish { .. } => "publish",
            Self::Ack { .. } => "ack",
            Self::Delivery { .. } => "delivery",
            Self::PayloadMissing { .. } => "payload_missing",
            Self::Serialization { .. } => "serialization",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Result type alias for pub/sub operations
pub type Result<T> = std::result::Result<T, PubSubError>;
