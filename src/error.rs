//! Error types for the price stream core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io(err.to_string())
    }
}

/// Ticker registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown ticker: {0}")]
    NotFound(String),

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: String },
}

/// History ring lookups
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// No sample old enough for the requested lookback
    #[error("No price available for {0} at the requested time")]
    Unavailable(String),

    /// No samples inside the requested window
    #[error("No samples for {0} in the requested window")]
    Empty(String),
}

/// Subscription registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("Unknown subscriber: {0}")]
    UnknownSubscriber(u64),
}

/// Push failures towards a single subscriber
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Send timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Outbound queue full")]
    QueueFull,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Inbound message errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedType(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

/// Persistence sink failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Store failed: {0}")]
    StoreFailed(String),

    #[error("Store timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Error severity levels
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Low,      // Expected churn: closed sockets, bad client input
    Medium,   // Recoverable, but an operator should know
    High,     // Affects functionality
    Critical, // Process cannot continue
}

impl ErrorSeverity {
    pub fn from_error(error: &StreamError) -> Self {
        match error {
            StreamError::Transport(_) => ErrorSeverity::Low,
            StreamError::Protocol(_) => ErrorSeverity::Low,
            StreamError::Registry(RegistryError::NotFound(_)) => ErrorSeverity::Low,
            StreamError::Registry(RegistryError::InvalidPrice { .. }) => ErrorSeverity::Medium,
            StreamError::History(_) => ErrorSeverity::Low,
            StreamError::Subscription(_) => ErrorSeverity::Low,
            StreamError::Sink(SinkError::Timeout(_)) => ErrorSeverity::Medium,
            StreamError::Sink(_) => ErrorSeverity::Medium,
            StreamError::Io(_) => ErrorSeverity::High,
            StreamError::Configuration(_) => ErrorSeverity::Critical,
        }
    }
}

/// Error reporter for structured logging
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report(error: &StreamError, operation: &str) {
        match ErrorSeverity::from_error(error) {
            ErrorSeverity::Critical => {
                tracing::error!("CRITICAL: {} failed: {}", operation, error);
            }
            ErrorSeverity::High => {
                tracing::error!("{} failed: {}", operation, error);
            }
            ErrorSeverity::Medium => {
                tracing::warn!("{} failed: {}", operation, error);
            }
            ErrorSeverity::Low => {
                tracing::debug!("{} failed: {}", operation, error);
            }
        }
    }
}
