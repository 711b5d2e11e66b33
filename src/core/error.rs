/// DBAL Error Module
///
/// This module defines the error taxonomy for the database access layer.
/// Every failure except a failed log write propagates to the caller.
use crate::driver::DriverError;
use thiserror::Error;

/// Error type for connection, query and cursor operations.
///
/// - Configuration conflicts (mutating credentials while connected)
/// - Connection failures reported by the driver
/// - Statement preparation and execution failures
/// - Cursor misuse after the statement was released
#[derive(Error, Debug)]
pub enum DbalError {
    /// A connection parameter was changed while a live handle exists
    #[error("A valid connection is already established; connection parameters cannot be changed")]
    ConnectionAlreadyEstablished,

    /// The driver could not establish a connection
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        code: i64,
        #[source]
        source: Option<DriverError>,
    },

    /// The SQL statement could not be prepared
    #[error("{0}")]
    Prepare(String),

    /// The SQL statement failed during binding or execution
    #[error("{0}")]
    Execute(String),

    /// A cursor operation was invoked without an attached statement
    #[error("The result cursor has no statement attached")]
    CursorUnavailable,

    /// Transaction-related errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Credential loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row hydration errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbalError {
    /// Wraps a driver failure raised while connecting, keeping its message and code.
    pub fn connection(err: DriverError) -> Self {
        DbalError::Connection {
            message: err.message.clone(),
            code: err.code,
            source: Some(err),
        }
    }

    /// Classifies a driver failure raised while preparing, binding or executing.
    pub fn execution(err: &DriverError) -> Self {
        DbalError::Execute(format!("{} - {}", err.sqlstate, err.message))
    }
}

/// Type alias for Result to use DbalError as the error type.
pub type Result<T> = std::result::Result<T, DbalError>;
