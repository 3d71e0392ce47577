//! The caller-facing API: a [`Session`] bound to one registered connection.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;

use crate::credentials::{ConnectionDescriptor, CredentialSource};
use crate::error::SqlSrvError;
use crate::executor::{
    ConstraintScope, InsertedId, StatementContext, ToggleTarget, run_insert_get_id, run_query,
    run_transactional_procedure, run_write, set_foreign_keys,
};
use crate::params::Params;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::results::{ResultSet, Row};
use crate::types::{Direction, Encoding, OperationKind, RowValues};

/// Connection-level `SET` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionOption {
    AnsiNulls,
    AnsiPadding,
    AnsiWarnings,
    ArithAbort,
    NoCount,
}

impl SessionOption {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            SessionOption::AnsiNulls => "ANSI_NULLS",
            SessionOption::AnsiPadding => "ANSI_PADDING",
            SessionOption::AnsiWarnings => "ANSI_WARNINGS",
            SessionOption::ArithAbort => "ARITHABORT",
            SessionOption::NoCount => "NOCOUNT",
        }
    }
}

/// Outcome of [`Session::status`].
#[derive(Debug)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
    /// The usable session when `connected` is true.
    pub session: Option<Session>,
}

/// A handle on one named connection of a shared [`ConnectionRegistry`].
///
/// Cloning is cheap; clones share the connection. Transaction calls act on
/// the whole registry, not just this session's connection.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sqlsrv_middleware::prelude::*;
///
/// # async fn demo() -> Result<(), SqlSrvError> {
/// let registry = Arc::new(ConnectionRegistry::mssql());
/// let sales = Session::connect(&registry, CredentialSource::Environment("SALES".into())).await?;
///
/// Session::begin_transaction(&registry).await?;
/// sales
///     .update(
///         "UPDATE Orders SET status = :status WHERE id = :id",
///         NamedParams::new().bind("status", "shipped").bind("id", 42),
///     )
///     .await?;
/// Session::commit(&registry).await?;
///
/// let open = sales
///     .select("SELECT id, total FROM Orders WHERE status = 'open'", ())?
///     .order_by("total", Direction::Desc)
///     .first()
///     .await?;
/// # let _ = open;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
    constraints: ConstraintScope,
}

impl Session {
    /// Resolve `source` and bind to its registered connection, opening it on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns the resolver's `MissingCredential`/`ConfigError`, or the
    /// registry's `ConnectionError`.
    pub async fn connect(
        registry: &Arc<ConnectionRegistry>,
        source: CredentialSource,
    ) -> Result<Self, SqlSrvError> {
        let (name, descriptor) = source.resolve()?;
        Self::open(registry, &name, &descriptor).await
    }

    /// Bind to the connection registered as `name`, opening it with
    /// `descriptor` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::get_or_create`].
    pub async fn open(
        registry: &Arc<ConnectionRegistry>,
        name: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self, SqlSrvError> {
        let handle = registry.get_or_create(name, descriptor).await?;
        Ok(Self {
            registry: Arc::clone(registry),
            handle,
            constraints: ConstraintScope::Checked,
        })
    }

    /// Like [`connect`](Self::connect), but reports failure as a status
    /// instead of an error.
    pub async fn status(
        registry: &Arc<ConnectionRegistry>,
        source: CredentialSource,
    ) -> ConnectionStatus {
        match Self::connect(registry, source).await {
            Ok(session) => ConnectionStatus {
                connected: true,
                message: "Connection Successful".to_string(),
                session: Some(session),
            },
            Err(e) => ConnectionStatus {
                connected: false,
                message: e.to_string(),
                session: None,
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// A copy of this session whose writes run with constraints disabled on
    /// `tables`, or on the statement's own table when `tables` is empty.
    /// The own table is the first object name after the verb (and `INTO` or
    /// `FROM`), so a `MERGE` or a CTE-led write needs explicit tables.
    #[must_use]
    pub fn no_check_constraint<I, S>(&self, tables: I) -> Session
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Session {
            registry: Arc::clone(&self.registry),
            handle: Arc::clone(&self.handle),
            constraints: ConstraintScope::Unchecked {
                tables: tables.into_iter().map(Into::into).collect(),
            },
        }
    }

    fn context(
        &self,
        kind: OperationKind,
        sql: &str,
        params: Params,
    ) -> Result<StatementContext, SqlSrvError> {
        Ok(StatementContext::new(kind, sql, params)?.with_constraints(self.constraints.clone()))
    }

    /// Prepare a `SELECT`. Nothing runs until a terminal call on the
    /// returned [`Selection`].
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::InvalidStatement` or
    /// `SqlSrvError::InvalidParameterShape`.
    pub fn select(&self, sql: &str, params: impl Into<Params>) -> Result<Selection, SqlSrvError> {
        let ctx = self.context(OperationKind::Select, sql, params.into())?;
        Ok(Selection::new(Arc::clone(&self.handle), ctx))
    }

    /// Run an `UPDATE`; `false` when no row was affected.
    ///
    /// # Errors
    ///
    /// Validation errors, or `SqlSrvError::ExecutionError`.
    pub async fn update(&self, sql: &str, params: impl Into<Params>) -> Result<bool, SqlSrvError> {
        let ctx = self.context(OperationKind::Update, sql, params.into())?;
        run_write(&self.handle, &ctx).await
    }

    /// Run an `INSERT`, once per parameter set for a batch.
    ///
    /// # Errors
    ///
    /// Validation errors, or `SqlSrvError::ExecutionError`.
    pub async fn insert(&self, sql: &str, params: impl Into<Params>) -> Result<bool, SqlSrvError> {
        let ctx = self.context(OperationKind::Insert, sql, params.into())?;
        run_write(&self.handle, &ctx).await
    }

    /// Run an `INSERT` and return the generated identity (one per set for a
    /// batch).
    ///
    /// # Errors
    ///
    /// Validation errors, or `SqlSrvError::ExecutionError`.
    pub async fn insert_get_id(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<InsertedId, SqlSrvError> {
        let ctx = self.context(OperationKind::InsertGetId, sql, params.into())?;
        run_insert_get_id(&self.handle, &ctx).await
    }

    /// Run a `DELETE`; `false` when no row was affected.
    ///
    /// # Errors
    ///
    /// Validation errors, or `SqlSrvError::ExecutionError`.
    pub async fn delete(&self, sql: &str, params: impl Into<Params>) -> Result<bool, SqlSrvError> {
        let ctx = self.context(OperationKind::Delete, sql, params.into())?;
        run_write(&self.handle, &ctx).await
    }

    /// Prepare an `EXEC` whose rows are read through the returned
    /// [`Selection`].
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::InvalidStatement` or
    /// `SqlSrvError::InvalidParameterShape`.
    pub fn execute_procedure(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Selection, SqlSrvError> {
        let ctx = self.context(OperationKind::ExecuteProcedure, sql, params.into())?;
        Ok(Selection::new(Arc::clone(&self.handle), ctx))
    }

    /// Run an `EXEC` for its side effects.
    ///
    /// # Errors
    ///
    /// Validation errors, or `SqlSrvError::ExecutionError`.
    pub async fn execute_transactional_procedure(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<bool, SqlSrvError> {
        let ctx = self.context(OperationKind::ExecuteTransactionalProcedure, sql, params.into())?;
        run_transactional_procedure(&self.handle, &ctx).await
    }

    /// Begin a transaction on every connection of `registry`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::begin_transaction`].
    pub async fn begin_transaction(registry: &ConnectionRegistry) -> Result<(), SqlSrvError> {
        registry.begin_transaction().await
    }

    /// # Errors
    ///
    /// See [`ConnectionRegistry::commit`].
    pub async fn commit(registry: &ConnectionRegistry) -> Result<(), SqlSrvError> {
        registry.commit().await
    }

    /// # Errors
    ///
    /// See [`ConnectionRegistry::rollback`].
    pub async fn rollback(registry: &ConnectionRegistry) -> Result<(), SqlSrvError> {
        registry.rollback().await
    }

    /// `None` removes the limit.
    ///
    /// A timeout only stops waiting. The server keeps running the
    /// statement and its reply is left on the stream, so the connection
    /// refuses every later call. Reconnect it under a new registry.
    pub async fn set_query_timeout(&self, timeout: Option<Duration>) {
        self.handle.lock().await.set_query_timeout(timeout);
    }

    pub async fn set_encoding(&self, encoding: Encoding) {
        self.handle.lock().await.set_encoding(encoding);
    }

    /// Issue `SET <option> ON|OFF` on this connection.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError` if the driver rejects it.
    pub async fn set_option(&self, option: SessionOption, on: bool) -> Result<(), SqlSrvError> {
        let sql = format!("SET {} {}", option.keyword(), if on { "ON" } else { "OFF" });
        self.handle
            .lock()
            .await
            .execute_batch(&sql)
            .await
            .map_err(|e| SqlSrvError::execution("Session::set_option()", e))
    }

    /// Disable constraints on `tables`, or on every table when empty.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError`.
    pub async fn disable_foreign_keys(&self, tables: &[String]) -> Result<(), SqlSrvError> {
        self.toggle_foreign_keys(tables, false, "Session::disable_foreign_keys()")
            .await
    }

    /// Re-enable constraints on `tables`, or on every table when empty.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError`.
    pub async fn enable_foreign_keys(&self, tables: &[String]) -> Result<(), SqlSrvError> {
        self.toggle_foreign_keys(tables, true, "Session::enable_foreign_keys()")
            .await
    }

    async fn toggle_foreign_keys(
        &self,
        tables: &[String],
        enable: bool,
        method: &'static str,
    ) -> Result<(), SqlSrvError> {
        let target = if tables.is_empty() {
            ToggleTarget::All
        } else {
            ToggleTarget::Tables(tables)
        };
        let mut conn = self.handle.lock().await;
        set_foreign_keys(&mut **conn, target, enable)
            .await
            .map_err(|e| SqlSrvError::execution(method, e))
    }
}

/// A row-returning statement that runs on the first terminal call and
/// caches its rows for every later one.
#[derive(Debug)]
pub struct Selection {
    handle: ConnectionHandle,
    ctx: StatementContext,
    ordering: Option<(String, Direction)>,
    rows: OnceCell<ResultSet>,
}

impl Selection {
    fn new(handle: ConnectionHandle, ctx: StatementContext) -> Self {
        Self {
            handle,
            ctx,
            ordering: None,
            rows: OnceCell::new(),
        }
    }

    /// Order rows by `column`. Applies to rows already fetched as well.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        if let Some(rows) = self.rows.take() {
            self.rows = OnceCell::new_with(Some(rows.order_by(column, direction)));
        }
        self.ordering = Some((column.to_string(), direction));
        self
    }

    #[must_use]
    pub fn statement(&self) -> &StatementContext {
        &self.ctx
    }

    /// Whether the statement has already run.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.rows.initialized()
    }

    async fn rows(&self) -> Result<&ResultSet, SqlSrvError> {
        self.rows
            .get_or_try_init(|| async {
                let rows = run_query(&self.handle, &self.ctx).await?;
                Ok::<_, SqlSrvError>(match &self.ordering {
                    Some((column, direction)) => rows.order_by(column, *direction),
                    None => rows,
                })
            })
            .await
    }

    /// All rows.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn get(&self) -> Result<ResultSet, SqlSrvError> {
        Ok(self.rows().await?.clone())
    }

    /// All rows, without copying.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn into_result_set(self) -> Result<ResultSet, SqlSrvError> {
        self.rows().await?;
        self.rows.into_inner().ok_or_else(|| {
            SqlSrvError::ExecutionError("Selection::into_result_set() - no rows cached".into())
        })
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn first(&self) -> Result<Option<Row>, SqlSrvError> {
        Ok(self.rows().await?.first().cloned())
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn last(&self) -> Result<Option<Row>, SqlSrvError> {
        Ok(self.rows().await?.last().cloned())
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn count(&self) -> Result<usize, SqlSrvError> {
        Ok(self.rows().await?.len())
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn pluck(&self, column: &str) -> Result<Vec<RowValues>, SqlSrvError> {
        Ok(self.rows().await?.pluck(column))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn sum(&self, column: &str) -> Result<f64, SqlSrvError> {
        Ok(self.rows().await?.sum(column))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn avg(&self, column: &str) -> Result<Option<f64>, SqlSrvError> {
        Ok(self.rows().await?.avg(column))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn min(&self, column: &str) -> Result<Option<RowValues>, SqlSrvError> {
        Ok(self.rows().await?.min(column))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn max(&self, column: &str) -> Result<Option<RowValues>, SqlSrvError> {
        Ok(self.rows().await?.max(column))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn chunk(&self, size: usize) -> Result<Vec<ResultSet>, SqlSrvError> {
        Ok(self.rows().await?.chunk(size))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn slice(
        &self,
        offset: usize,
        length: Option<usize>,
    ) -> Result<ResultSet, SqlSrvError> {
        Ok(self.rows().await?.slice(offset, length))
    }

    /// # Errors
    /// Returns `SqlSrvError::ExecutionError` if the statement fails.
    pub async fn to_json(&self) -> Result<JsonValue, SqlSrvError> {
        Ok(self.rows().await?.to_json())
    }
}
