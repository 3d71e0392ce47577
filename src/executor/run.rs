use crate::driver::DriverConnection;
use crate::error::SqlSrvError;
use crate::params::{NamedParams, Params};
use crate::placeholders::{PreparedStatement, prepare_named};
use crate::registry::ManagedConnection;
use crate::results::ResultSet;
use crate::types::{OperationKind, RowValues};

use super::constraints::ConstraintBracket;
use super::statement::StatementContext;

/// Identity values returned by an id-returning insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertedId {
    /// `None` when the insert affected no rows.
    Single(Option<i64>),
    /// One entry per parameter set, in input order.
    Batch(Vec<Option<i64>>),
}

impl InsertedId {
    /// The single id, or the last id of a batch.
    #[must_use]
    pub fn last(&self) -> Option<i64> {
        match self {
            InsertedId::Single(id) => *id,
            InsertedId::Batch(ids) => ids.last().copied().flatten(),
        }
    }
}

fn parameter_sets(params: &Params) -> Vec<&NamedParams> {
    match params {
        Params::Single(set) => vec![set],
        Params::Batch(sets) => sets.iter().collect(),
    }
}

/// Rewrite placeholders once and bind every parameter set up front, so a
/// missing value fails before anything is sent.
fn prepare(ctx: &StatementContext) -> Result<(PreparedStatement, Vec<Vec<RowValues>>), SqlSrvError> {
    let method = ctx.kind().method_name();
    let prepared = prepare_named(ctx.sql());
    let bound = parameter_sets(ctx.params())
        .into_iter()
        .map(|set| prepared.bind(set))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SqlSrvError::execution(method, e))?;
    Ok((prepared, bound))
}

fn single_set(
    kind: OperationKind,
    bound: Vec<Vec<RowValues>>,
) -> Result<Vec<RowValues>, SqlSrvError> {
    let mut sets = bound.into_iter();
    match (sets.next(), sets.next()) {
        (Some(values), None) => Ok(values),
        _ => Err(SqlSrvError::InvalidParameterShape {
            method: kind.method_name(),
        }),
    }
}

/// Run a row-returning statement: `select` or `execute_procedure`.
///
/// # Errors
///
/// Returns `SqlSrvError::ExecutionError` naming the operation if binding or
/// the driver fails.
pub async fn run_query(
    handle: &ManagedConnection,
    ctx: &StatementContext,
) -> Result<ResultSet, SqlSrvError> {
    let method = ctx.kind().method_name();
    let (prepared, bound) = prepare(ctx)?;
    let values = single_set(ctx.kind(), bound)?;

    let mut conn = handle.lock().await;
    tracing::debug!(
        connection = handle.name(),
        operation = ?ctx.kind(),
        sql = %prepared.sql(),
        "executing query"
    );
    conn.query(prepared.sql(), &values)
        .await
        .map_err(|e| SqlSrvError::execution(method, e))
}

/// Run a write (`update`, `insert`, `delete`) once per parameter set and
/// report whether any row was affected.
///
/// With constraints unchecked, the write is bracketed by
/// `NOCHECK`/`CHECK CONSTRAINT ALL`; the re-enable runs even when the write
/// fails, and the write's error is the one returned.
///
/// # Errors
///
/// Returns `SqlSrvError::ExecutionError` naming the operation.
pub async fn run_write(handle: &ManagedConnection, ctx: &StatementContext) -> Result<bool, SqlSrvError> {
    let method = ctx.kind().method_name();
    let (prepared, bound) = prepare(ctx)?;

    let mut conn = handle.lock().await;
    tracing::debug!(
        connection = handle.name(),
        operation = ?ctx.kind(),
        sql = %prepared.sql(),
        sets = bound.len(),
        "executing write"
    );
    let bracket = ConstraintBracket::disable(&mut **conn, ctx.bracket_tables())
        .await
        .map_err(|e| SqlSrvError::execution(method, e))?;

    let outcome = execute_each(&mut **conn, prepared.sql(), &bound).await;
    let restored = bracket.restore(&mut **conn).await;

    let affected = outcome.map_err(|e| SqlSrvError::execution(method, e))?;
    restored.map_err(|e| SqlSrvError::execution(method, e))?;
    Ok(affected > 0)
}

async fn execute_each(
    conn: &mut dyn DriverConnection,
    sql: &str,
    bound: &[Vec<RowValues>],
) -> Result<u64, SqlSrvError> {
    let mut affected = 0;
    for values in bound {
        affected += conn.execute(sql, values).await?;
    }
    Ok(affected)
}

/// Run an insert and collect the identity generated by each parameter set.
///
/// # Errors
///
/// Returns `SqlSrvError::ExecutionError` naming the operation.
pub async fn run_insert_get_id(
    handle: &ManagedConnection,
    ctx: &StatementContext,
) -> Result<InsertedId, SqlSrvError> {
    let method = ctx.kind().method_name();
    let (prepared, bound) = prepare(ctx)?;

    let mut conn = handle.lock().await;
    tracing::debug!(
        connection = handle.name(),
        sql = %prepared.sql(),
        sets = bound.len(),
        "executing insert returning id"
    );
    let bracket = ConstraintBracket::disable(&mut **conn, ctx.bracket_tables())
        .await
        .map_err(|e| SqlSrvError::execution(method, e))?;

    let outcome = insert_each(&mut **conn, prepared.sql(), &bound).await;
    let restored = bracket.restore(&mut **conn).await;

    let ids = outcome.map_err(|e| SqlSrvError::execution(method, e))?;
    restored.map_err(|e| SqlSrvError::execution(method, e))?;

    if ctx.params().is_batch() {
        Ok(InsertedId::Batch(ids))
    } else {
        Ok(InsertedId::Single(ids.into_iter().next().flatten()))
    }
}

async fn insert_each(
    conn: &mut dyn DriverConnection,
    sql: &str,
    bound: &[Vec<RowValues>],
) -> Result<Vec<Option<i64>>, SqlSrvError> {
    let mut ids = Vec::with_capacity(bound.len());
    for values in bound {
        let affected = conn.execute(sql, values).await?;
        let id = if affected > 0 {
            conn.last_insert_id().await?
        } else {
            None
        };
        ids.push(id);
    }
    Ok(ids)
}

/// Run a procedure for its side effects, draining whatever it returns.
///
/// # Errors
///
/// Returns `SqlSrvError::ExecutionError` naming the operation.
pub async fn run_transactional_procedure(
    handle: &ManagedConnection,
    ctx: &StatementContext,
) -> Result<bool, SqlSrvError> {
    let method = ctx.kind().method_name();
    let (prepared, bound) = prepare(ctx)?;
    let values = single_set(ctx.kind(), bound)?;

    let mut conn = handle.lock().await;
    tracing::debug!(
        connection = handle.name(),
        sql = %prepared.sql(),
        "executing transactional procedure"
    );
    conn.execute(prepared.sql(), &values)
        .await
        .map_err(|e| SqlSrvError::execution(method, e))?;
    Ok(true)
}
