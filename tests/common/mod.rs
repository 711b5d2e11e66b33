//! Recording driver for tests that need to observe what reaches the driver.

#![allow(dead_code)]

use dbal::driver::{Driver, DriverError, DriverResult, ErrorInfo, Handle, Options, Statement};
use dbal::{BindKind, Params, Record, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Everything the mock driver saw, plus knobs for the failures it should report
#[derive(Debug, Default)]
pub struct MockState {
    pub connects: Vec<(String, Option<String>, Option<String>, Options)>,
    pub execs: Vec<String>,
    pub prepared: Vec<(String, Options)>,
    pub binds: Vec<(String, Value, BindKind)>,
    pub executions: usize,
    /// Session transaction flag, driven by BEGIN / COMMIT / ROLLBACK statements
    pub in_transaction: bool,

    pub fail_connect: bool,
    pub prepare_returns_none: bool,
    pub execute_returns_false: bool,
    /// Driver name the session reports; `None` reports "mock"
    pub session_driver_name: Option<String>,
    /// Error code and message reported after an otherwise successful execution
    pub error_after_execute: Option<(String, String)>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Rc<RefCell<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let driver = Self::new();
        {
            let mut state = driver.state.borrow_mut();
            state.columns = columns.iter().map(|c| c.to_string()).collect();
            state.rows = rows;
        }
        driver
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mockdb"
    }

    fn connect(
        &self,
        dsn: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &Options,
    ) -> DriverResult<Box<dyn Handle>> {
        let mut state = self.state.borrow_mut();
        if state.fail_connect {
            return Err(DriverError::new("HY000", 2002, "Connection refused"));
        }
        state.connects.push((
            dsn.to_string(),
            username.map(String::from),
            password.map(String::from),
            options.clone(),
        ));
        Ok(Box::new(MockHandle {
            state: Rc::clone(&self.state),
        }))
    }
}

pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
}

impl Handle for MockHandle {
    fn exec(&self, sql: &str) -> DriverResult<usize> {
        let mut state = self.state.borrow_mut();
        state.execs.push(sql.to_string());
        let keyword = sql.split_whitespace().next().unwrap_or_default().to_uppercase();
        match keyword.as_str() {
            "BEGIN" | "START" => state.in_transaction = true,
            "COMMIT" | "ROLLBACK" => state.in_transaction = false,
            _ => {}
        }
        Ok(0)
    }

    fn prepare(&self, sql: &str, options: &Options) -> DriverResult<Option<Box<dyn Statement>>> {
        let mut state = self.state.borrow_mut();
        state.prepared.push((sql.to_string(), options.clone()));
        if state.prepare_returns_none {
            return Ok(None);
        }
        Ok(Some(Box::new(MockStatement {
            state: Rc::clone(&self.state),
            sql: sql.to_string(),
            buffer: VecDeque::new(),
            executed: false,
        })))
    }

    fn driver_name(&self) -> String {
        self.state
            .borrow()
            .session_driver_name
            .clone()
            .unwrap_or_else(|| "mock".to_string())
    }

    fn last_insert_id(&self) -> i64 {
        0
    }

    fn in_transaction(&self) -> bool {
        self.state.borrow().in_transaction
    }
}

pub struct MockStatement {
    state: Rc<RefCell<MockState>>,
    sql: String,
    buffer: VecDeque<Vec<Value>>,
    executed: bool,
}

impl Statement for MockStatement {
    fn query_string(&self) -> &str {
        &self.sql
    }

    fn bind_value(&mut self, placeholder: &str, value: &Value, kind: BindKind) -> DriverResult<bool> {
        self.state
            .borrow_mut()
            .binds
            .push((placeholder.to_string(), value.clone(), kind));
        Ok(true)
    }

    fn execute(&mut self, params: Option<&Params>) -> DriverResult<bool> {
        if let Some(params) = params {
            for (key, value) in params.iter() {
                self.bind_value(key, value, BindKind::infer(value))?;
            }
        }
        let mut state = self.state.borrow_mut();
        state.executions += 1;
        self.executed = true;
        self.buffer = state.rows.iter().cloned().collect();
        Ok(!state.execute_returns_false)
    }

    fn error_code(&self) -> Option<String> {
        if !self.executed {
            return None;
        }
        match &self.state.borrow().error_after_execute {
            Some((code, _)) => Some(code.clone()),
            None => Some("00000".to_string()),
        }
    }

    fn error_info(&self) -> ErrorInfo {
        match &self.state.borrow().error_after_execute {
            Some((code, message)) => ErrorInfo {
                sqlstate: code.clone(),
                driver_code: Some(1),
                message: Some(message.clone()),
            },
            None => ErrorInfo::default(),
        }
    }

    fn row_count(&self) -> usize {
        self.state.borrow().rows.len()
    }

    fn fetch(&mut self) -> DriverResult<Option<Record>> {
        let columns: Rc<[String]> = self.state.borrow().columns.clone().into();
        Ok(self.buffer.pop_front().map(|values| Record::new(columns, values)))
    }
}
