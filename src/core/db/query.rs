/// Query Execution Module
///
/// This module prepares, binds and executes SQL against a driver handle,
/// records timing entries in the query log, and classifies failures.
/// Every failed attempt is logged (query log entry plus a diagnostic line
/// on the configured sink) before the original error is returned.

use crate::core::db::cursor::ResultCursor;
use crate::core::db::value::Params;
use crate::core::{DbalError, Result};
use crate::driver::{is_success_code, Handle, Options};
use crate::logging::{interpolate_sql, LogSink};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// One executed (or attempted) query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub args: Option<Params>,
    /// Elapsed seconds, rounded to microseconds
    pub timer: f64,
}

/// Append-only sequence of query log entries, recorded only while enabled
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    enabled: bool,
    entries: Vec<QueryLogEntry>,
}

impl QueryLog {
    pub fn new(enabled: bool) -> Self {
        QueryLog {
            enabled,
            entries: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Records the time elapsed since `start`; a no-op while disabled
    pub fn add(&mut self, query: &str, args: Option<&Params>, start: Instant) {
        if !self.enabled {
            return;
        }
        let elapsed = start.elapsed().as_secs_f64();
        self.entries.push(QueryLogEntry {
            query: query.to_string(),
            args: args.cloned(),
            timer: (elapsed * 1_000_000.0).round() / 1_000_000.0,
        });
    }

    pub fn entries(&self) -> &[QueryLogEntry] {
        &self.entries
    }
}

/// Query execution service that operates on a driver handle
pub struct QueryExecutor<'a> {
    handle: &'a dyn Handle,
    query_options: &'a Options,
    log: &'a mut QueryLog,
    sink: Option<&'a LogSink>,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        handle: &'a dyn Handle,
        query_options: &'a Options,
        log: &'a mut QueryLog,
        sink: Option<&'a LogSink>,
    ) -> Self {
        QueryExecutor {
            handle,
            query_options,
            log,
            sink,
        }
    }

    /// Prepares, binds and executes `sql`, returning a cursor over the result.
    ///
    /// Per-call `options` take precedence over the default query options.
    ///
    /// # Errors
    ///
    /// - `DbalError::Prepare` if the driver produced no statement
    /// - `DbalError::Execute` if binding or execution failed, or the
    ///   statement reports a non-zero error code afterwards
    pub fn execute(
        &mut self,
        sql: &str,
        params: Option<&Params>,
        options: Option<&Options>,
    ) -> Result<ResultCursor> {
        let start = Instant::now();
        let mut logged = false;

        match self.run(sql, params, options, start, &mut logged) {
            Ok(cursor) => Ok(cursor),
            Err(err) => {
                if !logged {
                    self.log.add(sql, params, start);
                }
                let message = format!("{}\nSQL : \"{}\"", err, interpolate_sql(sql, params));
                warn!("Query failed: {}", message);
                if let Some(sink) = self.sink {
                    sink.write(&message);
                }
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        sql: &str,
        params: Option<&Params>,
        options: Option<&Options>,
        start: Instant,
        logged: &mut bool,
    ) -> Result<ResultCursor> {
        let mut merged = self.query_options.clone();
        if let Some(options) = options {
            merged.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let statement = self
            .handle
            .prepare(sql, &merged)
            .map_err(|e| DbalError::execution(&e))?
            .ok_or_else(|| DbalError::Prepare("The SQL query could not be prepared.".to_string()))?;
        let mut cursor = ResultCursor::new(statement);

        if let Some(params) = params.filter(|p| !p.is_empty()) {
            cursor.bind_values(params)?;
        }

        if !cursor.execute(None)? {
            return Err(DbalError::Execute("The SQL query could not be executed.".to_string()));
        }
        self.log.add(sql, params, start);
        *logged = true;
        debug!("Executed query: {}", sql);

        let statement = cursor.statement()?;
        if let Some(code) = statement.error_code() {
            if !is_success_code(&code) {
                if let Some(message) = statement.error_info().message {
                    return Err(DbalError::Execute(format!("{} - {}", code, message)));
                }
            }
        }

        Ok(cursor)
    }
}
