//! Log sinks for query failure diagnostics
//!
//! Writing to a sink is best effort: failures are swallowed and reported
//! only through the boolean result of `write_log`.

use crate::core::db::value::Params;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::rc::Rc;
use tracing::{error, warn};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid"));

/// An object that accepts critical log messages
pub trait CriticalLogger {
    fn critical(&self, message: &str);
}

/// Forwards critical messages to `tracing` at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl CriticalLogger for TracingLogger {
    fn critical(&self, message: &str) {
        error!(target: "dbal", "{}", message);
    }
}

/// Where `write_log` sends formatted messages
#[derive(Clone)]
pub enum LogSink {
    /// Called with each message
    Callback(Rc<dyn Fn(&str)>),
    /// File path template, appended to on each call.
    ///
    /// Supports `{timestamp}`, `{date}`, `{datetime}`, `{year}`, `{month}`,
    /// `{day}`, `{hour}`, `{minute}` and `{second}`.
    Path(String),
    /// Receives each message through `critical`
    Logger(Rc<dyn CriticalLogger>),
}

impl LogSink {
    pub fn callback(f: impl Fn(&str) + 'static) -> Self {
        LogSink::Callback(Rc::new(f))
    }

    pub fn logger(logger: impl CriticalLogger + 'static) -> Self {
        LogSink::Logger(Rc::new(logger))
    }

    /// Sends a message to the sink; returns whether it was delivered
    pub fn write(&self, message: &str) -> bool {
        match self {
            LogSink::Callback(f) => {
                f(message);
                true
            }
            LogSink::Path(template) => {
                let path = resolve_path(template, Local::now());
                match append(&path, message) {
                    Ok(written) => written,
                    Err(e) => {
                        warn!("Could not write log file {}: {}", path, e);
                        false
                    }
                }
            }
            LogSink::Logger(logger) => {
                logger.critical(message);
                true
            }
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Callback(_) => f.write_str("LogSink::Callback"),
            LogSink::Path(path) => f.debug_tuple("LogSink::Path").field(path).finish(),
            LogSink::Logger(_) => f.write_str("LogSink::Logger"),
        }
    }
}

fn append(path: &str, message: &str) -> std::io::Result<bool> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())?;
    Ok(!message.is_empty())
}

/// Replaces the time tokens of a log path template
pub fn resolve_path(template: &str, now: DateTime<Local>) -> String {
    let timestamp = now.timestamp().to_string();
    let date = now.format("%Y-%m-%d").to_string();
    let datetime = now.format("%Y-%m-%d-%H-%M-%S").to_string();
    let year = now.format("%Y").to_string();
    let month = now.format("%m").to_string();
    let day = now.format("%d").to_string();
    let hour = now.format("%H").to_string();
    let minute = now.format("%M").to_string();
    let second = now.format("%S").to_string();

    substitute(
        template,
        &[
            ("{timestamp}", timestamp.as_str()),
            ("{date}", date.as_str()),
            ("{datetime}", datetime.as_str()),
            ("{year}", year.as_str()),
            ("{month}", month.as_str()),
            ("{day}", day.as_str()),
            ("{hour}", hour.as_str()),
            ("{minute}", minute.as_str()),
            ("{second}", second.as_str()),
        ],
    )
}

/// Replaces every occurrence of each key with its value.
///
/// Longer keys win over their prefixes and replaced text is never scanned again.
pub fn substitute(text: &str, pairs: &[(&str, &str)]) -> String {
    let mut pairs: Vec<&(&str, &str)> = pairs.iter().filter(|(k, _)| !k.is_empty()).collect();
    pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while !rest.is_empty() {
        for (key, value) in &pairs {
            if let Some(tail) = rest.strip_prefix(key) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Renders SQL with its `:name` placeholders replaced by literal values, for diagnostics only
pub fn interpolate_sql(sql: &str, params: Option<&Params>) -> String {
    let params = match params {
        Some(p) if !p.is_empty() => p,
        _ => return sql.to_string(),
    };
    PLACEHOLDER_RE
        .replace_all(sql, |caps: &regex::Captures<'_>| match params.get(&caps[1]) {
            Some(value) => value.to_sql_literal(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
