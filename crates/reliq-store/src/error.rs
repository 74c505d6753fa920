use thiserror::Error;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Query error: {message}")]
    Query { message: String },

    #[error("Wrong type for key '{key}': expected {expected}")]
    WrongType { key: String, expected: String },

    #[error("Store closed")]
    Closed,

    #[error("Config error: {source}")]
    Config {
        #[from]
        source: reliq_config::ConfigError,
    },
}

impl StoreError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a wrong-type error
    pub fn wrong_type(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::WrongType {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Whether retrying the failed operation can help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Query { .. } => true,
            Self::WrongType { .. } => false,
            Self::Closed => false,
            Self::Config { .. } => false,
        }
    }

    /// Get the error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Query { .. } => "query",
            Self::WrongType { .. } => "wrong_type",
            Self::Closed => "closed",
            Self::Config { .. } => "config",
        }
    }
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
