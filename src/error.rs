/// Error type for gateway operations.
///
/// Every driver-facing variant wraps the driver's own error unmodified, so
/// callers can inspect it through [`std::error::Error::source`] or
/// [`GatewayError::driver_error`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Connection acquisition failed: {0}")]
    ConnectionAcquisition(#[source] sqlx::Error),

    #[error("Transaction start failed: {0}")]
    TransactionStart(#[source] sqlx::Error),

    #[error("Transaction commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Transaction rollback failed: {0}")]
    Rollback(#[source] sqlx::Error),

    #[error("Query execution failed: {0}")]
    QueryExecution(#[source] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// The underlying driver error, if this failure came from the driver.
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::ConnectionAcquisition(err)
            | Self::TransactionStart(err)
            | Self::Commit(err)
            | Self::Rollback(err)
            | Self::QueryExecution(err) => Some(err),
            Self::Configuration(_) => None,
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type returned by [`Driver`](crate::Driver) implementations
pub type DriverResult<T> = Result<T, sqlx::Error>;
