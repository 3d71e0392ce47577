//! A scripted, in-memory [`Driver`] that records every call.
//!
//! Connections are labelled by the descriptor's database name, so tests give
//! each logical connection its own database.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection};
use crate::error::SqlSrvError;
use crate::results::ResultSet;
use crate::types::{Encoding, RowValues};

/// One recorded driver interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Connect { conn: String, dsn: String },
    Query { conn: String, sql: String, params: Vec<RowValues> },
    Execute { conn: String, sql: String, params: Vec<RowValues> },
    Batch { conn: String, sql: String },
    Begin { conn: String },
    Commit { conn: String },
    Rollback { conn: String },
    TransactionDepth { conn: String },
    LastInsertId { conn: String },
    SetEncoding { conn: String, encoding: Encoding },
    SetQueryTimeout { conn: String, timeout: Option<Duration> },
}

impl DriverCall {
    #[must_use]
    pub fn conn(&self) -> &str {
        match self {
            DriverCall::Connect { conn, .. }
            | DriverCall::Query { conn, .. }
            | DriverCall::Execute { conn, .. }
            | DriverCall::Batch { conn, .. }
            | DriverCall::Begin { conn }
            | DriverCall::Commit { conn }
            | DriverCall::Rollback { conn }
            | DriverCall::TransactionDepth { conn }
            | DriverCall::LastInsertId { conn }
            | DriverCall::SetEncoding { conn, .. }
            | DriverCall::SetQueryTimeout { conn, .. } => conn,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<DriverCall>,
    connect_failures: HashSet<String>,
    begin_failures: HashSet<String>,
    commit_failures: HashSet<String>,
    rollback_failures: HashSet<String>,
    lost_transactions: HashSet<String>,
    failing_batches: Vec<String>,
    failing_executes: Vec<String>,
    results: Vec<(String, ResultSet)>,
    rows_affected: Vec<(String, u64)>,
    next_id: i64,
}

impl Script {
    fn record(&mut self, call: DriverCall) {
        self.calls.push(call);
    }
}

/// In-memory driver for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    script: Arc<Mutex<Script>>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a connection directly, bypassing any registry.
    #[must_use]
    pub fn open_connection(&self, label: &str) -> Box<dyn DriverConnection> {
        Box::new(MemoryConnection::new(label, Arc::clone(&self.script)))
    }

    pub fn fail_connect(&self, database: &str) {
        self.script().connect_failures.insert(database.to_string());
    }

    pub fn fail_begin(&self, conn: &str) {
        self.script().begin_failures.insert(conn.to_string());
    }

    pub fn fail_commit(&self, conn: &str) {
        self.script().commit_failures.insert(conn.to_string());
    }

    pub fn fail_rollback(&self, conn: &str) {
        self.script().rollback_failures.insert(conn.to_string());
    }

    /// Make `conn` report no open transaction to `@@TRANCOUNT`, as if the
    /// server had aborted it.
    pub fn lose_transaction(&self, conn: &str) {
        self.script().lost_transactions.insert(conn.to_string());
    }

    /// Fail any unparameterized batch containing `fragment`.
    pub fn fail_batch_containing(&self, fragment: &str) {
        self.script().failing_batches.push(fragment.to_string());
    }

    /// Fail any parameterized execute containing `fragment`.
    pub fn fail_execute_containing(&self, fragment: &str) {
        self.script().failing_executes.push(fragment.to_string());
    }

    /// Queries containing `fragment` return `rows`.
    pub fn set_result(&self, fragment: &str, rows: ResultSet) {
        self.script().results.push((fragment.to_string(), rows));
    }

    /// Executes containing `fragment` report `rows` affected (default 1).
    pub fn set_rows_affected(&self, fragment: &str, rows: u64) {
        self.script().rows_affected.push((fragment.to_string(), rows));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.script().calls.clone()
    }

    #[must_use]
    pub fn calls_for(&self, conn: &str) -> Vec<DriverCall> {
        self.script()
            .calls
            .iter()
            .filter(|c| c.conn() == conn)
            .cloned()
            .collect()
    }

    /// Unparameterized SQL sent to `conn`, in order.
    #[must_use]
    pub fn batches(&self, conn: &str) -> Vec<String> {
        self.calls_for(conn)
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Batch { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Parameterized executes sent to `conn`, in order.
    #[must_use]
    pub fn executes(&self, conn: &str) -> Vec<(String, Vec<RowValues>)> {
        self.calls_for(conn)
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Execute { sql, params, .. } => Some((sql, params)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, SqlSrvError> {
        let label = descriptor.database().to_string();
        {
            let mut script = self.script();
            script.record(DriverCall::Connect {
                conn: label.clone(),
                dsn: descriptor.dsn(),
            });
            if script.connect_failures.contains(&label) {
                return Err(SqlSrvError::ConnectionError(format!(
                    "login failed for database {label}"
                )));
            }
        }
        Ok(self.open_connection(&label))
    }
}

/// Connection half of [`MemoryDriver`].
#[derive(Debug)]
pub struct MemoryConnection {
    label: String,
    script: Arc<Mutex<Script>>,
    open: bool,
    last_id: Option<i64>,
}

impl MemoryConnection {
    fn new(label: &str, script: Arc<Mutex<Script>>) -> Self {
        Self {
            label: label.to_string(),
            script,
            open: false,
            last_id: None,
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self, what: &str) -> SqlSrvError {
        SqlSrvError::ExecutionError(format!("{what} failed on {}", self.label))
    }
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, SqlSrvError> {
        let mut script = self.script();
        script.record(DriverCall::Query {
            conn: self.label.clone(),
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(script
            .results
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, SqlSrvError> {
        let (affected, new_id) = {
            let mut script = self.script();
            script.record(DriverCall::Execute {
                conn: self.label.clone(),
                sql: sql.to_string(),
                params: params.to_vec(),
            });
            if script.failing_executes.iter().any(|f| sql.contains(f.as_str())) {
                return Err(self.failure("execute"));
            }
            let affected = script
                .rows_affected
                .iter()
                .find(|(fragment, _)| sql.contains(fragment.as_str()))
                .map_or(1, |(_, rows)| *rows);
            let is_insert = sql
                .trim_start()
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"));
            let new_id = if is_insert && affected > 0 {
                script.next_id += 1;
                Some(script.next_id)
            } else {
                None
            };
            (affected, new_id)
        };
        if new_id.is_some() {
            self.last_id = new_id;
        }
        Ok(affected)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlSrvError> {
        let mut script = self.script();
        script.record(DriverCall::Batch {
            conn: self.label.clone(),
            sql: sql.to_string(),
        });
        if script.failing_batches.iter().any(|f| sql.contains(f.as_str())) {
            return Err(self.failure("batch"));
        }
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), SqlSrvError> {
        {
            let mut script = self.script();
            script.record(DriverCall::Begin {
                conn: self.label.clone(),
            });
            if script.begin_failures.contains(&self.label) {
                return Err(self.failure("begin"));
            }
        }
        if self.open {
            return Err(SqlSrvError::ExecutionError(format!(
                "a transaction is already open on {}",
                self.label
            )));
        }
        self.open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlSrvError> {
        {
            let mut script = self.script();
            script.record(DriverCall::Commit {
                conn: self.label.clone(),
            });
            if script.commit_failures.contains(&self.label) {
                return Err(self.failure("commit"));
            }
        }
        if !self.open {
            return Err(SqlSrvError::ExecutionError(format!(
                "no open transaction to commit on {}",
                self.label
            )));
        }
        self.open = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlSrvError> {
        {
            let mut script = self.script();
            script.record(DriverCall::Rollback {
                conn: self.label.clone(),
            });
            if script.rollback_failures.contains(&self.label) {
                return Err(self.failure("rollback"));
            }
        }
        if !self.open {
            return Err(SqlSrvError::ExecutionError(format!(
                "no open transaction to roll back on {}",
                self.label
            )));
        }
        self.open = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open
    }

    async fn transaction_depth(&mut self) -> Result<i64, SqlSrvError> {
        let mut script = self.script();
        script.record(DriverCall::TransactionDepth {
            conn: self.label.clone(),
        });
        if script.lost_transactions.contains(&self.label) {
            return Ok(0);
        }
        Ok(i64::from(self.open))
    }

    async fn last_insert_id(&mut self) -> Result<Option<i64>, SqlSrvError> {
        self.script().record(DriverCall::LastInsertId {
            conn: self.label.clone(),
        });
        Ok(self.last_id)
    }

    fn set_encoding(&mut self, encoding: Encoding) {
        self.script().record(DriverCall::SetEncoding {
            conn: self.label.clone(),
            encoding,
        });
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.script().record(DriverCall::SetQueryTimeout {
            conn: self.label.clone(),
            timeout,
        });
    }
}
