/// Result Cursor Module
///
/// A `ResultCursor` wraps one executed statement. It binds parameters with
/// inferred kinds, and hands rows back in the shape selected by its current
/// fetch mode. Switching the mode affects the next `row()`/`rows()` call.

use crate::core::db::value::{placeholder, BindKind, Params, Record, Value};
use crate::core::{DbalError, Result};
use crate::driver::Statement;
use serde::de::DeserializeOwned;

/// Shape of the rows returned by `row()` and `rows()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Generic record, optionally tagged with a class name
    Class(Option<String>),
    /// Generic record
    Object,
    /// Column name to value pairs
    Assoc,
    /// Record resolved by name or position on access
    Lazy,
    /// Every value under both its column name and its position
    Both,
}

impl Default for FetchMode {
    fn default() -> Self {
        FetchMode::Class(None)
    }
}

/// Key of an entry in a `Row::Both` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKey {
    Name(String),
    Index(usize),
}

/// A row shaped by a fetch mode
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Produced by `Class` and `Object`
    Object { class: Option<String>, record: Record },
    Assoc(Vec<(String, Value)>),
    Lazy(Record),
    Both(Vec<(RowKey, Value)>),
}

impl Row {
    fn shape(record: Record, mode: &FetchMode) -> Self {
        match mode {
            FetchMode::Class(class) => Row::Object {
                class: class.clone(),
                record,
            },
            FetchMode::Object => Row::Object { class: None, record },
            FetchMode::Assoc => Row::Assoc(record.into_pairs()),
            FetchMode::Lazy => Row::Lazy(record),
            FetchMode::Both => {
                let mut entries = Vec::with_capacity(record.len() * 2);
                for (i, (name, value)) in record.into_pairs().into_iter().enumerate() {
                    entries.push((RowKey::Name(name), value.clone()));
                    entries.push((RowKey::Index(i), value));
                }
                Row::Both(entries)
            }
        }
    }

    /// Looks a value up by column name, whatever the shape
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Row::Object { record, .. } | Row::Lazy(record) => record.get(column),
            Row::Assoc(pairs) => pairs.iter().find(|(k, _)| k == column).map(|(_, v)| v),
            Row::Both(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, RowKey::Name(n) if n == column))
                .map(|(_, v)| v),
        }
    }

    /// Looks a value up by position; `Assoc` rows have no positional access
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Object { record, .. } | Row::Lazy(record) => record.get_index(index),
            Row::Assoc(_) => None,
            Row::Both(entries) => entries
                .iter()
                .find(|(k, _)| *k == RowKey::Index(index))
                .map(|(_, v)| v),
        }
    }
}

/// Cursor over one prepared and executed statement.
///
/// Intended for single-owner use; the underlying statement is not thread-safe.
pub struct ResultCursor {
    statement: Option<Box<dyn Statement>>,
    mode: FetchMode,
}

impl ResultCursor {
    pub fn new(statement: Box<dyn Statement>) -> Self {
        ResultCursor {
            statement: Some(statement),
            mode: FetchMode::default(),
        }
    }

    /// Returns the wrapped statement
    ///
    /// # Errors
    ///
    /// Returns `DbalError::CursorUnavailable` once the cursor has been closed.
    pub fn statement(&mut self) -> Result<&mut (dyn Statement + 'static)> {
        self.statement.as_deref_mut().ok_or(DbalError::CursorUnavailable)
    }

    /// Releases the statement; later operations fail with `CursorUnavailable`
    pub fn close(&mut self) {
        self.statement = None;
    }

    pub fn query_string(&mut self) -> Result<String> {
        Ok(self.statement()?.query_string().to_string())
    }

    /// Binds one value, inferring its binding kind
    pub fn bind_value(&mut self, key: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        let key = placeholder(key);
        let kind = BindKind::infer(&value);
        self.statement()?
            .bind_value(&key, &value, kind)
            .map_err(|e| DbalError::execution(&e))
    }

    /// Binds every parameter in insertion order, stopping at the first failure
    pub fn bind_values(&mut self, params: &Params) -> Result<bool> {
        for (key, value) in params.iter() {
            self.bind_value(key, value.clone())?;
        }
        Ok(true)
    }

    /// Executes the statement again, optionally binding `params` first
    pub fn execute(&mut self, params: Option<&Params>) -> Result<bool> {
        self.statement()?
            .execute(params)
            .map_err(|e| DbalError::execution(&e))
    }

    pub fn fetch_mode(&self) -> &FetchMode {
        &self.mode
    }

    pub fn as_class(&mut self, class: Option<&str>) -> &mut Self {
        self.mode = FetchMode::Class(class.map(String::from));
        self
    }

    pub fn as_object(&mut self) -> &mut Self {
        self.mode = FetchMode::Object;
        self
    }

    pub fn as_assoc(&mut self) -> &mut Self {
        self.mode = FetchMode::Assoc;
        self
    }

    pub fn as_lazy(&mut self) -> &mut Self {
        self.mode = FetchMode::Lazy;
        self
    }

    pub fn as_array(&mut self) -> &mut Self {
        self.mode = FetchMode::Both;
        self
    }

    /// Alias of `as_array`
    pub fn as_both(&mut self) -> &mut Self {
        self.as_array()
    }

    /// Fetches the next row, or `None` when the result set is exhausted
    pub fn row(&mut self) -> Result<Option<Row>> {
        let mode = self.mode.clone();
        let record = self
            .statement()?
            .fetch()
            .map_err(|e| DbalError::execution(&e))?;
        Ok(record.map(|r| Row::shape(r, &mode)))
    }

    /// Fetches every remaining row, or `None` when nothing was found
    pub fn rows(&mut self) -> Result<Option<Vec<Row>>> {
        let mode = self.mode.clone();
        let records = self
            .statement()?
            .fetch_all()
            .map_err(|e| DbalError::execution(&e))?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records.into_iter().map(|r| Row::shape(r, &mode)).collect()))
    }

    /// Fetches the next row and deserializes it by column name
    pub fn row_into<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let record = self
            .statement()?
            .fetch()
            .map_err(|e| DbalError::execution(&e))?;
        match record {
            Some(record) => Ok(Some(serde_json::from_value(record.to_json())?)),
            None => Ok(None),
        }
    }

    /// Fetches every remaining row and deserializes each by column name
    pub fn rows_into<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        let records = self
            .statement()?
            .fetch_all()
            .map_err(|e| DbalError::execution(&e))?;
        records
            .iter()
            .map(|r| serde_json::from_value(r.to_json()).map_err(DbalError::from))
            .collect()
    }

    /// Number of rows affected or returned by the last execution
    pub fn num_rows(&mut self) -> Result<usize> {
        Ok(self.statement()?.row_count())
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("query", &self.statement.as_ref().map(|s| s.query_string()))
            .field("mode", &self.mode)
            .finish()
    }
}
