//! SQLite driver
//!
//! Bundled driver built on rusqlite. Statements own a reference-counted
//! connection so a result cursor can outlive the call that produced it.

use super::{Driver, DriverError, DriverResult, ErrorInfo, Handle, Options, Statement};
use crate::core::db::value::{BindKind, Params, Record, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// SQLSTATE reported for every SQLite failure
const GENERAL_ERROR: &str = "HY000";
/// SQLSTATE reported for an unknown placeholder
const INVALID_PARAMETER: &str = "HY093";
/// SQLSTATE reported for a value that cannot be bound as the requested kind
const INVALID_PARAMETER_TYPE: &str = "HY105";

/// Opens SQLite sessions from `sqlite:` DSNs.
///
/// Accepted forms: `sqlite::memory:`, `sqlite:<path>` and the key-value form
/// `sqlite:host=..;port=..;dbname=<path>;charset=..`, where only `dbname` is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        SqliteDriver
    }

    /// Extracts the database path from a DSN
    fn database_path(dsn: &str) -> DriverResult<String> {
        let rest = dsn
            .strip_prefix("sqlite:")
            .ok_or_else(|| DriverError::new("IM001", 0, format!("could not find driver for DSN '{}'", dsn)))?;

        if rest.contains("dbname=") {
            let path = rest
                .split(';')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| key.trim() == "dbname")
                .map(|(_, value)| value.trim().to_string())
                .unwrap_or_default();
            return Ok(path);
        }

        Ok(rest.to_string())
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(
        &self,
        dsn: &str,
        _username: Option<&str>,
        _password: Option<&str>,
        options: &Options,
    ) -> DriverResult<Box<dyn Handle>> {
        let path = Self::database_path(dsn)?;
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(driver_error)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(driver_error)?;

        if let Some(timeout) = options.get("busy_timeout").and_then(|t| t.parse::<u64>().ok()) {
            conn.busy_timeout(Duration::from_millis(timeout)).map_err(driver_error)?;
        }

        debug!("Opened SQLite session for {:?}", path);
        Ok(Box::new(SqliteHandle { conn: Rc::new(conn) }))
    }
}

/// Maps a rusqlite failure onto the driver error shape
fn driver_error(err: rusqlite::Error) -> DriverError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => DriverError::new(
            GENERAL_ERROR,
            failure.extended_code as i64,
            message.clone().unwrap_or_else(|| err.to_string()),
        ),
        _ => DriverError::new(GENERAL_ERROR, 0, err.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Converts a value to what SQLite stores for the declared kind.
///
/// Text that does not parse as an integer, and blobs, cannot be bound as `Int`.
fn to_sql(value: &Value, kind: BindKind) -> DriverResult<SqlValue> {
    let not_an_integer = |shown: &str| {
        DriverError::new(
            INVALID_PARAMETER_TYPE,
            0,
            format!("Invalid parameter type: {} cannot be bound as an integer", shown),
        )
    };
    Ok(match (kind, value) {
        (BindKind::Null, _) | (_, Value::Null) => SqlValue::Null,
        (BindKind::Int, Value::Integer(i)) => SqlValue::Integer(*i),
        (BindKind::Int, Value::Bool(b)) => SqlValue::Integer(*b as i64),
        (BindKind::Int, Value::Real(f)) => SqlValue::Integer(*f as i64),
        (BindKind::Int, Value::Text(s)) => SqlValue::Integer(
            s.trim()
                .parse()
                .map_err(|_| not_an_integer(&format!("'{}'", s)))?,
        ),
        (BindKind::Int, Value::Blob(_)) => return Err(not_an_integer("a blob")),
        (BindKind::Str, Value::Blob(b)) => SqlValue::Blob(b.clone()),
        (BindKind::Str, Value::Text(s)) => SqlValue::Text(s.clone()),
        (BindKind::Str, Value::Bool(b)) => SqlValue::Text((*b as i64).to_string()),
        (BindKind::Str, Value::Integer(i)) => SqlValue::Text(i.to_string()),
        (BindKind::Str, Value::Real(f)) => SqlValue::Text(f.to_string()),
    })
}

/// Named placeholders of a prepared statement, colon included
fn parameter_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    (1..=stmt.parameter_count())
        .filter_map(|index| stmt.parameter_name(index))
        .map(String::from)
        .collect()
}

/// An open SQLite session
pub struct SqliteHandle {
    conn: Rc<Connection>,
}

impl Handle for SqliteHandle {
    fn exec(&self, sql: &str) -> DriverResult<usize> {
        self.conn.execute(sql, []).map_err(driver_error)
    }

    fn prepare(&self, sql: &str, options: &Options) -> DriverResult<Option<Box<dyn Statement>>> {
        if sql.trim().is_empty() {
            return Ok(None);
        }

        let cached = options.get("cached").map(|v| v != "false").unwrap_or(true);
        let parameters = if cached {
            parameter_names(&*self.conn.prepare_cached(sql).map_err(driver_error)?)
        } else {
            parameter_names(&self.conn.prepare(sql).map_err(driver_error)?)
        };

        Ok(Some(Box::new(SqliteStatement {
            conn: Rc::clone(&self.conn),
            sql: sql.to_string(),
            cached,
            parameters,
            bindings: Vec::new(),
            columns: Vec::<String>::new().into(),
            buffer: VecDeque::new(),
            row_count: 0,
            executed: false,
            last_error: None,
        })))
    }

    fn driver_name(&self) -> String {
        "sqlite".to_string()
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// SQLite fixes the text encoding per database file, so there is no session statement to run.
    fn configure_session(&self, charset: &str, _collation: Option<&str>) -> DriverResult<()> {
        debug!("Ignoring session charset {} for SQLite", charset);
        Ok(())
    }
}

/// A prepared SQLite statement with its buffered result set
pub struct SqliteStatement {
    conn: Rc<Connection>,
    sql: String,
    cached: bool,
    parameters: Vec<String>,
    bindings: Vec<(String, SqlValue)>,
    columns: Rc<[String]>,
    buffer: VecDeque<Vec<Value>>,
    row_count: usize,
    executed: bool,
    last_error: Option<DriverError>,
}

impl SqliteStatement {
    fn run(&mut self) -> rusqlite::Result<()> {
        let conn = Rc::clone(&self.conn);
        let mut cached_stmt;
        let mut plain_stmt;
        let stmt: &mut rusqlite::Statement<'_> = if self.cached {
            cached_stmt = conn.prepare_cached(&self.sql)?;
            &mut cached_stmt
        } else {
            plain_stmt = conn.prepare(&self.sql)?;
            &mut plain_stmt
        };

        for (key, value) in &self.bindings {
            let index = stmt
                .parameter_index(key)?
                .ok_or_else(|| rusqlite::Error::InvalidParameterName(key.clone()))?;
            stmt.raw_bind_parameter(index, value)?;
        }

        self.buffer.clear();
        if stmt.column_count() > 0 {
            self.columns = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
                .into();
            let column_count = self.columns.len();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(from_sql(row.get_ref(i)?));
                }
                self.buffer.push_back(values);
            }
            self.row_count = self.buffer.len();
        } else {
            self.row_count = stmt.raw_execute()?;
        }
        Ok(())
    }
}

impl Statement for SqliteStatement {
    fn query_string(&self) -> &str {
        &self.sql
    }

    fn bind_value(&mut self, placeholder: &str, value: &Value, kind: BindKind) -> DriverResult<bool> {
        if !self.parameters.iter().any(|name| name == placeholder) {
            return Err(DriverError::new(
                INVALID_PARAMETER,
                0,
                format!("Invalid parameter number: parameter {} was not defined", placeholder),
            ));
        }

        let value = to_sql(value, kind)?;
        match self.bindings.iter_mut().find(|(k, _)| k == placeholder) {
            Some(binding) => binding.1 = value,
            None => self.bindings.push((placeholder.to_string(), value)),
        }
        Ok(true)
    }

    fn execute(&mut self, params: Option<&Params>) -> DriverResult<bool> {
        if let Some(params) = params {
            for (key, value) in params.iter() {
                let placeholder = crate::core::db::value::placeholder(key);
                self.bind_value(&placeholder, value, BindKind::infer(value))?;
            }
        }

        self.executed = true;
        match self.run() {
            Ok(()) => {
                self.last_error = None;
                Ok(true)
            }
            Err(err) => {
                let err = driver_error(err);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn error_code(&self) -> Option<String> {
        if !self.executed {
            return None;
        }
        Some(match &self.last_error {
            Some(err) => err.sqlstate.clone(),
            None => "00000".to_string(),
        })
    }

    fn error_info(&self) -> ErrorInfo {
        match &self.last_error {
            Some(err) => ErrorInfo {
                sqlstate: err.sqlstate.clone(),
                driver_code: Some(err.code),
                message: Some(err.message.clone()),
            },
            None => ErrorInfo {
                sqlstate: "00000".to_string(),
                driver_code: None,
                message: None,
            },
        }
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn fetch(&mut self) -> DriverResult<Option<Record>> {
        Ok(self
            .buffer
            .pop_front()
            .map(|values| Record::new(Rc::clone(&self.columns), values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Box<dyn Handle> {
        SqliteDriver::new()
            .connect("sqlite::memory:", None, None, &Options::new())
            .unwrap()
    }

    #[test]
    fn test_database_path_parsing() {
        assert_eq!(SqliteDriver::database_path("sqlite::memory:").unwrap(), ":memory:");
        assert_eq!(SqliteDriver::database_path("sqlite:/tmp/app.db").unwrap(), "/tmp/app.db");
        assert_eq!(
            SqliteDriver::database_path("sqlite:host=127.0.0.1;port=3306;dbname=app.db;charset=utf8").unwrap(),
            "app.db"
        );
        assert!(SqliteDriver::database_path("mysql:host=localhost").is_err());
    }

    #[test]
    fn test_prepare_execute_fetch() {
        let handle = open();
        handle.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        handle.exec("INSERT INTO t (name) VALUES ('Alice'), ('Bob')").unwrap();

        let mut stmt = handle
            .prepare("SELECT id, name FROM t WHERE name = :name", &Options::new())
            .unwrap()
            .unwrap();
        assert!(stmt.bind_value(":name", &Value::from("Bob"), BindKind::Str).unwrap());
        assert!(stmt.execute(None).unwrap());
        assert_eq!(stmt.error_code().as_deref(), Some("00000"));
        assert_eq!(stmt.row_count(), 1);

        let record = stmt.fetch().unwrap().unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(2)));
        assert!(stmt.fetch().unwrap().is_none());
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let handle = open();
        handle.exec("CREATE TABLE t (id INTEGER)").unwrap();
        let mut stmt = handle
            .prepare("SELECT * FROM t WHERE id = :id", &Options::new())
            .unwrap()
            .unwrap();
        let err = stmt.bind_value(":nope", &Value::from(1), BindKind::Int).unwrap_err();
        assert_eq!(err.sqlstate, INVALID_PARAMETER);
    }

    #[test]
    fn test_uncached_statement_binds_and_executes() {
        let handle = open();
        handle.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        handle.exec("INSERT INTO t (name) VALUES ('Alice'), ('Bob')").unwrap();

        let options: Options = [("cached".to_string(), "false".to_string())].into_iter().collect();
        let mut stmt = handle
            .prepare("SELECT name FROM t WHERE id = :id", &options)
            .unwrap()
            .unwrap();
        let err = stmt.bind_value(":name", &Value::from("x"), BindKind::Str).unwrap_err();
        assert_eq!(err.sqlstate, INVALID_PARAMETER);

        assert!(stmt.bind_value(":id", &Value::from(2), BindKind::Int).unwrap());
        assert!(stmt.execute(None).unwrap());
        let record = stmt.fetch().unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn test_non_numeric_text_is_not_bound_as_integer() {
        let handle = open();
        handle.exec("CREATE TABLE t (id INTEGER)").unwrap();
        let mut stmt = handle
            .prepare("SELECT * FROM t WHERE id = :id", &Options::new())
            .unwrap()
            .unwrap();

        let err = stmt.bind_value(":id", &Value::from("abc"), BindKind::Int).unwrap_err();
        assert_eq!(err.sqlstate, INVALID_PARAMETER_TYPE);
        let err = stmt.bind_value(":id", &Value::Blob(vec![1, 2]), BindKind::Int).unwrap_err();
        assert_eq!(err.sqlstate, INVALID_PARAMETER_TYPE);

        assert!(stmt.bind_value(":id", &Value::from(" 42 "), BindKind::Int).unwrap());
    }

    #[test]
    fn test_in_transaction_follows_the_session() {
        let handle = open();
        assert!(!handle.in_transaction());
        handle.exec("BEGIN IMMEDIATE").unwrap();
        assert!(handle.in_transaction());
        handle.exec("COMMIT").unwrap();
        assert!(!handle.in_transaction());
    }

    #[test]
    fn test_empty_sql_yields_no_statement() {
        let handle = open();
        assert!(handle.prepare("   ", &Options::new()).unwrap().is_none());
    }

    #[test]
    fn test_dml_row_count() {
        let handle = open();
        handle.exec("CREATE TABLE t (id INTEGER)").unwrap();
        let mut stmt = handle
            .prepare("INSERT INTO t (id) VALUES (1), (2), (3)", &Options::new())
            .unwrap()
            .unwrap();
        stmt.execute(None).unwrap();
        assert_eq!(stmt.row_count(), 3);
        assert_eq!(handle.last_insert_id(), 3);
    }

    #[test]
    fn test_syntax_error_maps_to_general_error() {
        let handle = open();
        let err = handle.prepare("SELEC 1", &Options::new()).err().unwrap();
        assert_eq!(err.sqlstate, GENERAL_ERROR);
        assert!(err.message.contains("syntax error"));
    }
}
