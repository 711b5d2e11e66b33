//! A thin database access layer.
//!
//! A [`ConnectionManager`] holds credentials and connects lazily on first use.
//! [`ConnectionManager::query`] prepares, binds and executes raw SQL and returns a
//! [`ResultCursor`] whose fetch mode selects the shape of the rows it hands back.

// Core infrastructure modules
pub mod core;

pub mod config;
pub mod driver;
pub mod logging;

#[cfg(test)]
mod test_utils;

pub use crate::config::{load_credentials, Credentials};
pub use crate::core::db::{
    BindKind, ConnectionFactory, ConnectionManager, FetchMode, Params, QueryLogEntry, Record, ResultCursor, Row,
    RowKey, TransactionState, Value,
};
pub use crate::core::{DbalError, Result};
pub use crate::logging::{CriticalLogger, LogSink, TracingLogger};
