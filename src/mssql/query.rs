use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use tiberius::{ColumnData, FromSql, QueryItem};

use super::config::MssqlClient;
use super::params::bind_query_params;
use crate::error::SqlSrvError;
use crate::results::ResultSet;
use crate::types::{Encoding, RowValues};

/// Run a query and collect the rows of its first result.
///
/// The whole response is drained so the connection is ready for the next
/// statement. A response without any result (DDL, a procedure that only
/// writes) yields an empty set.
pub async fn build_result_set(
    client: &mut MssqlClient,
    sql: &str,
    params: &[RowValues],
    encoding: Encoding,
) -> Result<ResultSet, SqlSrvError> {
    let query = bind_query_params(sql, params);
    let mut stream = query
        .query(client)
        .await
        .map_err(|e| SqlSrvError::ExecutionError(format!("SQL Server query error: {e}")))?;

    let mut result_set = ResultSet::with_capacity(10);
    while let Some(item) = stream
        .try_next()
        .await
        .map_err(|e| SqlSrvError::ExecutionError(format!("SQL Server row fetch error: {e}")))?
    {
        match item {
            QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                let column_names: Vec<String> =
                    meta.columns().iter().map(|c| c.name().to_string()).collect();
                result_set.set_column_names(Arc::new(column_names));
            }
            QueryItem::Row(row) if row.result_index() == 0 => {
                let values = row
                    .cells()
                    .map(|(_, data)| extract_value(data, encoding))
                    .collect::<Result<Vec<_>, _>>()?;
                result_set.add_row_values(values);
            }
            _ => {}
        }
    }

    Ok(result_set)
}

/// Run a statement and sum the rows affected across its results.
pub async fn execute_dml(
    client: &mut MssqlClient,
    sql: &str,
    params: &[RowValues],
) -> Result<u64, SqlSrvError> {
    let query = bind_query_params(sql, params);
    let result = query
        .execute(client)
        .await
        .map_err(|e| SqlSrvError::ExecutionError(format!("SQL Server execute error: {e}")))?;
    Ok(result.rows_affected().iter().sum())
}

/// Run unparameterized SQL, discarding any output.
pub async fn execute_batch(client: &mut MssqlClient, sql: &str) -> Result<(), SqlSrvError> {
    client
        .simple_query(sql)
        .await
        .map_err(|e| SqlSrvError::ExecutionError(format!("SQL Server batch error: {e}")))?
        .into_results()
        .await
        .map_err(|e| SqlSrvError::ExecutionError(format!("SQL Server batch error: {e}")))?;
    Ok(())
}

/// First column of the first row as an integer, if any.
pub async fn query_scalar_int(
    client: &mut MssqlClient,
    sql: &str,
) -> Result<Option<i64>, SqlSrvError> {
    let result_set = build_result_set(client, sql, &[], Encoding::Utf8).await?;
    Ok(result_set
        .first()
        .and_then(|row| row.get_by_index(0))
        .and_then(|value| value.as_int().copied()))
}

/// Convert one cell. String data follows the connection's encoding:
/// `Binary` hands back the raw UTF-8 bytes instead of text.
#[allow(clippy::cast_precision_loss)]
fn extract_value(data: &ColumnData<'static>, encoding: Encoding) -> Result<RowValues, SqlSrvError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| match encoding {
            Encoding::Binary => RowValues::Blob(s.as_bytes().to_vec()),
            _ => RowValues::Text(s.to_string()),
        }),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            RowValues::Float(n.value() as f64 / 10f64.powi(i32::from(n.scale())))
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| RowValues::Text(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => {
            NaiveDate::from_sql(data)?.map(|d| RowValues::Timestamp(d.and_time(NaiveTime::MIN)))
        }
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| RowValues::Text(t.to_string())),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(|dt| RowValues::Timestamp(dt.naive_utc()))
        }
    };
    Ok(value.unwrap_or(RowValues::Null))
}
