//! The connection registry: one live connection per logical name, with
//! transaction boundaries broadcast to every registered connection.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tokio::sync::{Mutex, MutexGuard};

use crate::credentials::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection};
use crate::error::SqlSrvError;

/// Shared handle to a registered connection.
pub type ConnectionHandle = Arc<ManagedConnection>;

/// A registered connection. Statements lock it for their duration.
pub struct ManagedConnection {
    name: String,
    created_at: DateTime<Utc>,
    conn: Mutex<Box<dyn DriverConnection>>,
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("conn", &"<DriverConnection>")
            .finish()
    }
}

impl ManagedConnection {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Exclusive access to the underlying driver connection.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn DriverConnection>> {
        self.conn.lock().await
    }
}

/// What commit/rollback do when one connection fails part way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CommitMode {
    /// Finish connections in registration order and stop at the first
    /// failure. Connections already committed stay committed and the
    /// transaction flag stays set.
    #[default]
    Sequential,
    /// Check every connection still holds an open transaction before the
    /// first commit, rolling everything back if one does not; after a late
    /// commit failure roll back the connections not yet committed. The flag
    /// is always cleared. Without two-phase commit, connections committed
    /// before a late failure cannot be undone.
    Atomic,
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Commit,
    Rollback,
}

impl Finish {
    fn method(self) -> &'static str {
        match self {
            Finish::Commit => "ConnectionRegistry::commit()",
            Finish::Rollback => "ConnectionRegistry::rollback()",
        }
    }

    async fn apply(self, conn: &mut dyn DriverConnection) -> Result<(), SqlSrvError> {
        match self {
            Finish::Commit => conn.commit().await,
            Finish::Rollback => conn.rollback().await,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<ConnectionHandle>,
    transaction_active: bool,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<&ConnectionHandle> {
        self.entries.iter().find(|handle| handle.name == name)
    }
}

/// Maps logical connection names to live connections.
///
/// Construct one per process (or per tenant) and share it behind an `Arc`.
/// Entry creation and the begin/commit/rollback broadcasts each run under
/// one registry-wide lock, so they never interleave.
pub struct ConnectionRegistry {
    driver: Arc<dyn Driver>,
    commit_mode: CommitMode,
    state: Mutex<RegistryState>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("commit_mode", &self.commit_mode)
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            commit_mode: CommitMode::default(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Registry backed by the tiberius driver.
    #[cfg(feature = "mssql")]
    #[must_use]
    pub fn mssql() -> Self {
        Self::new(Arc::new(crate::mssql::MssqlDriver))
    }

    #[must_use]
    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    #[must_use]
    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// Return the connection registered under `name`, opening it first if
    /// needed.
    ///
    /// An existing handle is returned as is; it is never health-checked or
    /// reopened. A new connection gets the descriptor's charset and, while a
    /// registry transaction is active, begins a transaction before it is
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ConnectionError` if the driver cannot connect,
    /// or the driver's error if joining the active transaction fails. In
    /// both cases nothing is registered.
    pub async fn get_or_create(
        &self,
        name: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ConnectionHandle, SqlSrvError> {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.find(name) {
            return Ok(handle.clone());
        }

        tracing::debug!(
            connection = name,
            dsn = %descriptor.connection_string(),
            "opening connection"
        );
        let mut conn = self.driver.connect(descriptor).await?;
        conn.set_encoding(descriptor.charset());

        if state.transaction_active {
            conn.begin_transaction().await.map_err(|e| {
                SqlSrvError::execution(
                    &format!("ConnectionRegistry::get_or_create() [{name}]"),
                    e,
                )
            })?;
        }

        let handle = Arc::new(ManagedConnection {
            name: name.to_string(),
            created_at: Utc::now(),
            conn: Mutex::new(conn),
        });
        state.entries.push(handle.clone());
        Ok(handle)
    }

    /// The handle registered under `name`, if any.
    pub async fn get(&self, name: &str) -> Option<ConnectionHandle> {
        self.state.lock().await.find(name).cloned()
    }

    /// Registered names in registration order.
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.entries.iter().map(|h| h.name.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Whether new connections will join a registry-wide transaction.
    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.transaction_active
    }

    /// Begin a transaction on every registered connection, then mark the
    /// registry as transactional so later connections join too.
    ///
    /// Calling this while a transaction is already open fails on the first
    /// connection; nested transactions are not supported.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError` naming the connection that
    /// refused. Connections before it have already begun and the flag is
    /// left unset.
    pub async fn begin_transaction(&self) -> Result<(), SqlSrvError> {
        let mut state = self.state.lock().await;
        tracing::info!(
            connections = state.entries.len(),
            "beginning transaction on all connections"
        );
        for handle in &state.entries {
            handle.lock().await.begin_transaction().await.map_err(|e| {
                SqlSrvError::execution(
                    &format!("ConnectionRegistry::begin_transaction() [{}]", handle.name),
                    e,
                )
            })?;
        }
        state.transaction_active = true;
        Ok(())
    }

    /// Commit every registered connection in registration order.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::UninitializedConnection` if nothing is
    /// registered, and `SqlSrvError::PartialTransaction` if a connection
    /// fails; see [`CommitMode`] for what happens to the others.
    pub async fn commit(&self) -> Result<(), SqlSrvError> {
        self.finish(Finish::Commit).await
    }

    /// Roll back every registered connection in registration order.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    pub async fn rollback(&self) -> Result<(), SqlSrvError> {
        self.finish(Finish::Rollback).await
    }

    async fn finish(&self, finish: Finish) -> Result<(), SqlSrvError> {
        let mut state = self.state.lock().await;
        if state.entries.is_empty() {
            return Err(SqlSrvError::UninitializedConnection {
                method: finish.method(),
            });
        }
        tracing::info!(
            connections = state.entries.len(),
            mode = ?self.commit_mode,
            "{}",
            finish.method()
        );

        match self.commit_mode {
            CommitMode::Sequential => {
                finish_sequential(&state.entries, finish).await?;
                state.transaction_active = false;
                Ok(())
            }
            CommitMode::Atomic => {
                state.transaction_active = false;
                match finish {
                    Finish::Commit => commit_atomic(&state.entries).await,
                    Finish::Rollback => rollback_all(&state.entries).await,
                }
            }
        }
    }
}

async fn finish_sequential(entries: &[ConnectionHandle], finish: Finish) -> Result<(), SqlSrvError> {
    let mut completed = Vec::with_capacity(entries.len());
    for handle in entries {
        let mut conn = handle.lock().await;
        if let Err(e) = finish.apply(&mut **conn).await {
            tracing::warn!(
                connection = handle.name(),
                completed = ?completed,
                error = %e,
                "{} failed part way; completed connections are not undone",
                finish.method()
            );
            return Err(SqlSrvError::PartialTransaction {
                method: finish.method(),
                failed: handle.name().to_string(),
                completed,
                message: e.to_string(),
            });
        }
        completed.push(handle.name().to_string());
    }
    Ok(())
}

async fn commit_atomic(entries: &[ConnectionHandle]) -> Result<(), SqlSrvError> {
    let method = Finish::Commit.method();

    for handle in entries {
        let check = handle.lock().await.transaction_depth().await;
        let problem = match check {
            Ok(depth) if depth > 0 => None,
            Ok(_) => Some("no open transaction".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(problem) = problem {
            rollback_best_effort(entries).await;
            return Err(SqlSrvError::PartialTransaction {
                method,
                failed: handle.name().to_string(),
                completed: Vec::new(),
                message: format!("pre-commit check failed, all connections rolled back: {problem}"),
            });
        }
    }

    let mut completed = Vec::with_capacity(entries.len());
    for (idx, handle) in entries.iter().enumerate() {
        let result = handle.lock().await.commit().await;
        if let Err(e) = result {
            tracing::warn!(
                connection = handle.name(),
                completed = ?completed,
                error = %e,
                "commit failed after pre-check; rolling back the remainder"
            );
            rollback_best_effort(&entries[idx..]).await;
            return Err(SqlSrvError::PartialTransaction {
                method,
                failed: handle.name().to_string(),
                completed,
                message: e.to_string(),
            });
        }
        completed.push(handle.name().to_string());
    }
    Ok(())
}

/// Roll back every connection, continuing past failures, and report them all.
async fn rollback_all(entries: &[ConnectionHandle]) -> Result<(), SqlSrvError> {
    let mut completed = Vec::with_capacity(entries.len());
    let mut failed = Vec::new();
    let mut messages = Vec::new();
    for handle in entries {
        let result = handle.lock().await.rollback().await;
        match result {
            Ok(()) => completed.push(handle.name().to_string()),
            Err(e) => {
                failed.push(handle.name().to_string());
                messages.push(e.to_string());
            }
        }
    }
    if failed.is_empty() {
        return Ok(());
    }
    Err(SqlSrvError::PartialTransaction {
        method: Finish::Rollback.method(),
        failed: failed.join(", "),
        completed,
        message: messages.join("; "),
    })
}

async fn rollback_best_effort(entries: &[ConnectionHandle]) {
    if let Err(e) = rollback_all(entries).await {
        tracing::warn!(error = %e, "rollback after failed commit was incomplete");
    }
}
