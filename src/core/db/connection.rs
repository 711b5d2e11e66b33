/// Connection Management Module
///
/// This module owns connection credentials and the lazily established driver
/// handle. Credentials can be changed only while no handle exists; once
/// connected, every setter fails with `ConnectionAlreadyEstablished`.
///
/// A `ConnectionManager` is meant for a single owner. It holds `Rc` state and
/// is therefore neither `Send` nor `Sync`; callers serialize access themselves.

use crate::config::Credentials;
use crate::core::db::cursor::ResultCursor;
use crate::core::db::query::{QueryExecutor, QueryLog, QueryLogEntry};
use crate::core::db::value::Params;
use crate::core::{DbalError, Result};
use crate::driver::{forced_options, Driver, Handle, Options, SqliteDriver};
use crate::logging::{substitute, LogSink};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Transaction in progress
    Transaction,
}

/// Creates connection managers from credentials
#[derive(Clone)]
pub struct ConnectionFactory {
    driver: Rc<dyn Driver>,
}

impl ConnectionFactory {
    pub fn new(driver: Rc<dyn Driver>) -> Self {
        ConnectionFactory { driver }
    }

    pub fn create_connection(&self, credentials: Credentials) -> ConnectionManager {
        ConnectionManager::with_driver(credentials, Rc::clone(&self.driver))
    }
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        ConnectionFactory::new(Rc::new(SqliteDriver::new()))
    }
}

/// Connection manager for database operations
pub struct ConnectionManager {
    credentials: Credentials,
    driver: Rc<dyn Driver>,
    handle: Option<Box<dyn Handle>>,
    query_log: QueryLog,
    log_sink: Option<LogSink>,
}

impl ConnectionManager {
    /// Creates a manager using the bundled SQLite driver
    pub fn new(credentials: Credentials) -> Self {
        Self::with_driver(credentials, Rc::new(SqliteDriver::new()))
    }

    pub fn with_driver(credentials: Credentials, driver: Rc<dyn Driver>) -> Self {
        let query_log = QueryLog::new(credentials.query_logs);
        ConnectionManager {
            credentials,
            driver,
            handle: None,
            query_log,
            log_sink: None,
        }
    }

    /// Fails when a live handle exists
    fn ensure_disconnected(&self) -> Result<()> {
        if self.handle.is_some() {
            return Err(DbalError::ConnectionAlreadyEstablished);
        }
        Ok(())
    }

    /// Connects to the database, replacing any existing handle.
    ///
    /// Opens the session with the merged options, then applies the charset and
    /// collation. If no driver name was configured, it is read back from the session,
    /// falling back to the driver's own name when the session reports none.
    ///
    /// # Errors
    ///
    /// Returns `DbalError::Connection` wrapping the driver failure.
    pub fn connect(&mut self) -> Result<()> {
        let dsn = self.credentials.dsn().to_string();
        let options = self.options();
        debug!("Connecting to {}", dsn);

        let handle = self
            .driver
            .connect(
                &dsn,
                self.credentials.username.as_deref(),
                self.credentials.password.as_deref(),
                &options,
            )
            .map_err(DbalError::connection)?;

        if let Some(charset) = self.credentials.charset.as_deref().filter(|c| !c.is_empty()) {
            handle
                .configure_session(charset, self.credentials.collation.as_deref())
                .map_err(DbalError::connection)?;
        }

        if self.credentials.driver.is_none() {
            let reported = handle.driver_name();
            self.credentials.driver = Some(if reported.is_empty() {
                self.driver.name().to_string()
            } else {
                reported
            });
        }

        self.handle = Some(handle);
        Ok(())
    }

    /// Drops the handle; the next operation that needs one reconnects
    pub fn disconnect(&mut self) {
        self.handle = None;
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns the live handle, connecting first if needed
    pub fn handle(&mut self) -> Result<&dyn Handle> {
        if self.handle.is_none() {
            self.connect()?;
        }
        match self.handle.as_deref() {
            Some(handle) => Ok(handle),
            None => Err(DbalError::Connection {
                message: "No connection handle available".to_string(),
                code: 0,
                source: None,
            }),
        }
    }

    pub fn set_database(&mut self, database: &str) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.database = database.to_string();
        Ok(self)
    }

    pub fn database(&self) -> &str {
        &self.credentials.database
    }

    pub fn set_host(&mut self, host: &str) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.host = host.to_string();
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.credentials.host
    }

    pub fn set_port(&mut self, port: u16) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.port = port;
        Ok(self)
    }

    pub fn port(&self) -> u16 {
        self.credentials.port
    }

    /// Sets the charset; without a collation, `<charset>_unicode_ci` is used
    pub fn set_charset(&mut self, charset: &str, collation: Option<&str>) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.set_charset(charset, collation);
        Ok(self)
    }

    pub fn charset(&self) -> Option<&str> {
        self.credentials.charset.as_deref()
    }

    pub fn collation(&self) -> Option<&str> {
        self.credentials.collation.as_deref()
    }

    pub fn set_dsn(&mut self, dsn: &str) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.set_dsn(dsn);
        Ok(self)
    }

    /// Returns the explicit DSN, or the one synthesized (and cached) from the discrete fields
    pub fn dsn(&self) -> &str {
        self.credentials.dsn()
    }

    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.username = username.map(String::from);
        Ok(self)
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.username.as_deref()
    }

    pub fn set_password(&mut self, password: Option<&str>) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.password = password.map(String::from);
        Ok(self)
    }

    pub fn password(&self) -> Option<&str> {
        self.credentials.password.as_deref()
    }

    pub fn set_driver(&mut self, driver: &str) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.driver = Some(driver.to_string());
        Ok(self)
    }

    pub fn driver(&self) -> Option<&str> {
        self.credentials.driver.as_deref()
    }

    /// Merges driver options into the configured ones
    pub fn set_options(&mut self, options: Options) -> Result<&mut Self> {
        self.ensure_disconnected()?;
        self.credentials.options.extend(options);
        Ok(self)
    }

    /// Configured options overlaid with the options every connection is forced to use
    pub fn options(&self) -> Options {
        let mut options = self.credentials.options.clone();
        options.extend(forced_options());
        options
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.credentials.debug = debug;
        self
    }

    pub fn debug(&self) -> bool {
        self.credentials.debug
    }

    pub fn set_log(&mut self, sink: Option<LogSink>) -> &mut Self {
        self.log_sink = sink;
        self
    }

    /// Enables or disables recording of query log entries
    pub fn set_query_logging(&mut self, enabled: bool) -> &mut Self {
        self.credentials.query_logs = enabled;
        self.query_log.set_enabled(enabled);
        self
    }

    pub fn query_logging(&self) -> bool {
        self.query_log.is_enabled()
    }

    /// Records a query log entry timed from `start`, when query logging is enabled
    pub fn add_query_log(&mut self, query: &str, args: Option<&Params>, start: std::time::Instant) {
        self.query_log.add(query, args, start);
    }

    pub fn query_logs(&self) -> &[QueryLogEntry] {
        self.query_log.entries()
    }

    /// Formats `message` with the `substitutions` and sends it to the log sink.
    ///
    /// Returns whether the sink accepted the message; never fails.
    pub fn write_log(&self, message: &str, substitutions: &[(&str, &str)]) -> bool {
        let sink = match &self.log_sink {
            Some(sink) => sink,
            None => return false,
        };
        let message = if substitutions.is_empty() {
            message.to_string()
        } else {
            substitute(message, substitutions)
        };
        sink.write(&message)
    }

    /// Executes `sql` with optional parameters and per-call statement options.
    ///
    /// Connects first if no handle exists.
    ///
    /// # Example
    ///
    /// ```
    /// use dbal::{ConnectionManager, Credentials, Params};
    ///
    /// let mut conn = ConnectionManager::new(Credentials::default());
    /// conn.set_dsn("sqlite::memory:")?;
    /// conn.query("CREATE TABLE t (name TEXT)", None, None)?;
    /// conn.query("INSERT INTO t VALUES (:name)", Some(&Params::new().with("name", "x")), None)?;
    /// let row = conn.query("SELECT name FROM t", None, None)?.row()?;
    /// assert!(row.is_some());
    /// # Ok::<(), dbal::DbalError>(())
    /// ```
    pub fn query(&mut self, sql: &str, params: Option<&Params>, options: Option<&Options>) -> Result<ResultCursor> {
        if self.handle.is_none() {
            self.connect()?;
        }
        let handle = self.handle.as_deref().ok_or_else(|| DbalError::Connection {
            message: "No connection handle available".to_string(),
            code: 0,
            source: None,
        })?;
        if self.credentials.debug {
            debug!("Query: {}", sql);
        }

        let mut executor = QueryExecutor::new(
            handle,
            &self.credentials.query_options,
            &mut self.query_log,
            self.log_sink.as_ref(),
        );
        executor.execute(sql, params, options)
    }

    /// Runs a statement directly on the handle, returning the affected row count
    pub fn exec(&mut self, sql: &str) -> Result<usize> {
        self.handle()?.exec(sql).map_err(|e| DbalError::execution(&e))
    }

    pub fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.handle()?.last_insert_id())
    }

    /// Transaction state as reported by the live session.
    ///
    /// Transactions opened or closed by any statement count, whether they went
    /// through `exec`, `query` or the helpers below.
    pub fn transaction_state(&self) -> TransactionState {
        match self.handle.as_deref() {
            Some(handle) if handle.in_transaction() => TransactionState::Transaction,
            _ => TransactionState::Autocommit,
        }
    }

    pub fn begin_transaction(&mut self) -> Result<&mut Self> {
        if self.handle()?.in_transaction() {
            return Err(DbalError::Transaction("Transaction already in progress".to_string()));
        }
        self.exec("BEGIN")?;
        Ok(self)
    }

    pub fn commit(&mut self) -> Result<&mut Self> {
        self.end_transaction("COMMIT")
    }

    pub fn roll_back(&mut self) -> Result<&mut Self> {
        self.end_transaction("ROLLBACK")
    }

    fn end_transaction(&mut self, sql: &str) -> Result<&mut Self> {
        if !self.handle()?.in_transaction() {
            return Err(DbalError::Transaction("No transaction in progress".to_string()));
        }
        self.exec(sql)?;
        Ok(self)
    }
}

/// Cloning yields a disconnected sibling: same credentials and driver, no
/// handle, and an empty query log.
impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        let mut clone = ConnectionManager::with_driver(self.credentials.clone(), Rc::clone(&self.driver));
        clone.log_sink = self.log_sink.clone();
        clone
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dsn", &self.credentials.dsn())
            .field("connected", &self.handle.is_some())
            .field("transaction_state", &self.transaction_state())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.transaction_state() == TransactionState::Transaction {
            warn!("Dropping connection with an open transaction");
        }
    }
}
