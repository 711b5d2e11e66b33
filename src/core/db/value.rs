/// Values, Parameters and Records
///
/// This module defines the value types exchanged with the driver: parameter
/// values and their inferred binding kinds on the way in, fetched records on
/// the way out.

use serde::Serialize;
use std::rc::Rc;

/// A single SQL value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Bool(bool),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Renders the value as an SQL literal for diagnostic output
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Bool(b) => (*b as i64).to_string(),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(b) => format!("<BLOB: {} bytes>", b.len()),
        }
    }

    /// Converts the value to JSON for typed row hydration
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Real(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::from(s.as_str()),
            Value::Blob(b) => serde_json::Value::from(b.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type used when attaching a value to a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Int,
    Null,
    Str,
}

impl BindKind {
    /// Infers the binding kind from the shape of a value.
    ///
    /// Integers and booleans bind as `Int`, null as `Null`, everything else
    /// (including reals and blobs) as `Str`.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Integer(_) | Value::Bool(_) => BindKind::Int,
            Value::Null => BindKind::Null,
            _ => BindKind::Str,
        }
    }
}

/// Normalizes a parameter key to its leading-colon placeholder form
pub fn placeholder(key: &str) -> String {
    format!(":{}", key.trim_start_matches(':'))
}

/// Named query parameters, kept in insertion order
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named value, replacing an earlier value under the same key
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let bare = key.trim_start_matches(':');
        match self.entries.iter_mut().find(|(k, _)| k.trim_start_matches(':') == bare) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let key = key.trim_start_matches(':');
        self.entries
            .iter()
            .find(|(k, _)| k.trim_start_matches(':') == key)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(&k.into(), v);
        }
        params
    }
}

/// One fetched row: shared column names plus the row's values
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Rc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Rc<[String]>, values: Vec<Value>) -> Self {
        Record { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Looks a value up by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Looks a value up by zero-based column position
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns.iter().cloned().zip(self.values).collect()
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}
