//! Driver capability
//!
//! The SQL engine is an external collaborator. These traits are the subset of
//! its capabilities the connection and cursor layers need: connect, run
//! session statements, prepare, bind, execute, inspect errors and fetch.

pub mod sqlite;

use crate::core::db::value::{BindKind, Params, Record, Value};
use std::collections::BTreeMap;
use std::fmt;

pub use sqlite::SqliteDriver;

/// Driver-specific connection or statement options
pub type Options = BTreeMap<String, String>;

/// Client-side statement emulation switch
pub const ATTR_EMULATE_PREPARES: &str = "emulate_prepares";
/// Persistent connection switch
pub const ATTR_PERSISTENT: &str = "persistent";
/// Error reporting mode
pub const ATTR_ERRMODE: &str = "errmode";
/// Default row shape
pub const ATTR_DEFAULT_FETCH_MODE: &str = "default_fetch_mode";

/// Options every connection is opened with, overriding user options
pub fn forced_options() -> Options {
    [
        (ATTR_EMULATE_PREPARES, "false"),
        (ATTR_PERSISTENT, "true"),
        (ATTR_ERRMODE, "exception"),
        (ATTR_DEFAULT_FETCH_MODE, "class"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// A failure reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverError {
    /// Five-character SQLSTATE
    pub sqlstate: String,
    /// Driver-specific error code
    pub code: i64,
    pub message: String,
}

impl DriverError {
    pub fn new(sqlstate: &str, code: i64, message: impl Into<String>) -> Self {
        DriverError {
            sqlstate: sqlstate.to_string(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SQLSTATE[{}] ({}): {}", self.sqlstate, self.code, self.message)
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Extended error information for the last statement operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub driver_code: Option<i64>,
    pub message: Option<String>,
}

/// Returns true when an error code is the "no error" sentinel (all zeros or blank)
pub fn is_success_code(code: &str) -> bool {
    code.trim_matches(|c: char| c == '0' || c.is_whitespace() || c == '\0' || c == '\u{b}')
        .is_empty()
}

/// Opens driver sessions
pub trait Driver {
    /// Fallback name when a session reports none of its own
    fn name(&self) -> &str;

    fn connect(
        &self,
        dsn: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &Options,
    ) -> DriverResult<Box<dyn Handle>>;
}

/// An open driver session
pub trait Handle {
    /// Runs a statement without a result set, returning the affected row count
    fn exec(&self, sql: &str) -> DriverResult<usize>;

    /// Prepares a statement; `Ok(None)` means the driver produced no statement
    fn prepare(&self, sql: &str, options: &Options) -> DriverResult<Option<Box<dyn Statement>>>;

    /// Driver name read back from the session
    fn driver_name(&self) -> String;

    fn last_insert_id(&self) -> i64;

    /// Whether the session has an open transaction, however it was started
    fn in_transaction(&self) -> bool;

    /// Applies the connection character set.
    ///
    /// The charset and collation are interpolated as literal SQL text:
    /// `SET NAMES` accepts no bound parameters, so callers must pass trusted values.
    fn configure_session(&self, charset: &str, collation: Option<&str>) -> DriverResult<()> {
        if let Some(collation) = collation.filter(|c| !c.is_empty()) {
            self.exec(&format!("SET NAMES '{}' COLLATE '{}'", charset, collation))?;
        }
        self.exec(&format!("SET CHARACTER SET '{}'", charset))?;
        Ok(())
    }
}

/// A prepared statement bound to a driver session
pub trait Statement {
    fn query_string(&self) -> &str;

    fn bind_value(&mut self, placeholder: &str, value: &Value, kind: BindKind) -> DriverResult<bool>;

    /// Executes the statement, optionally binding `params` first
    fn execute(&mut self, params: Option<&Params>) -> DriverResult<bool>;

    fn error_code(&self) -> Option<String>;

    fn error_info(&self) -> ErrorInfo;

    fn row_count(&self) -> usize;

    fn fetch(&mut self) -> DriverResult<Option<Record>>;

    fn fetch_all(&mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.fetch()? {
            records.push(record);
        }
        Ok(records)
    }
}
