use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::config::MssqlClient;
use super::query::{build_result_set, execute_batch, execute_dml, query_scalar_int};
use crate::driver::DriverConnection;
use crate::error::SqlSrvError;
use crate::results::ResultSet;
use crate::types::{Encoding, RowValues};

/// One tiberius client plus the per-connection settings the driver
/// does not track itself.
pub struct MssqlConnection {
    client: MssqlClient,
    encoding: Encoding,
    query_timeout: Option<Duration>,
    state: LinkState,
}

impl MssqlConnection {
    pub(crate) fn new(client: MssqlClient) -> Self {
        Self {
            client,
            encoding: Encoding::default(),
            query_timeout: None,
            state: LinkState::default(),
        }
    }

    async fn finish(&mut self, sql: &str, label: &str) -> Result<(), SqlSrvError> {
        self.state.usable()?;
        match execute_batch(&mut self.client, sql).await {
            Ok(()) => {
                self.state.open = false;
                Ok(())
            }
            Err(e) => {
                let depth = query_scalar_int(&mut self.client, "SELECT @@TRANCOUNT")
                    .await
                    .map(|depth| depth.unwrap_or(0))
                    .ok();
                self.state.resync(depth);
                tracing::warn!(
                    error = %e,
                    trancount = ?depth,
                    open = self.state.open,
                    "{label} failed"
                );
                Err(SqlSrvError::ExecutionError(format!("MSSQL {label} error: {e}")))
            }
        }
    }
}

/// What this side knows about the server session.
#[derive(Debug, Default)]
struct LinkState {
    open: bool,
    /// A call timed out and its response may still be on the wire.
    broken: bool,
}

impl LinkState {
    fn usable(&self) -> Result<(), SqlSrvError> {
        if self.broken {
            return Err(SqlSrvError::ExecutionError(
                "MSSQL connection is unusable after a query timeout; reconnect it".to_string(),
            ));
        }
        Ok(())
    }

    /// `None` from [`limited`] means the limit elapsed.
    fn settle<T>(
        &mut self,
        limit: Option<Duration>,
        outcome: Option<Result<T, SqlSrvError>>,
    ) -> Result<T, SqlSrvError> {
        outcome.unwrap_or_else(|| {
            self.broken = true;
            Err(SqlSrvError::ExecutionError(format!(
                "SQL Server query timed out after {}s",
                limit.unwrap_or_default().as_secs()
            )))
        })
    }

    /// After a failed COMMIT or ROLLBACK the server may have ended the
    /// transaction anyway. Trust `@@TRANCOUNT` when it could be read.
    fn resync(&mut self, depth: Option<i64>) {
        if let Some(depth) = depth {
            self.open = depth > 0;
        }
    }
}

async fn limited<T, F>(limit: Option<Duration>, fut: F) -> Option<Result<T, SqlSrvError>>
where
    F: Future<Output = Result<T, SqlSrvError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[async_trait]
impl DriverConnection for MssqlConnection {
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, SqlSrvError> {
        self.state.usable()?;
        let encoding = self.encoding;
        let outcome = limited(
            self.query_timeout,
            build_result_set(&mut self.client, sql, params, encoding),
        )
        .await;
        self.state.settle(self.query_timeout, outcome)
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, SqlSrvError> {
        self.state.usable()?;
        let outcome = limited(self.query_timeout, execute_dml(&mut self.client, sql, params)).await;
        self.state.settle(self.query_timeout, outcome)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlSrvError> {
        self.state.usable()?;
        let outcome = limited(self.query_timeout, execute_batch(&mut self.client, sql)).await;
        self.state.settle(self.query_timeout, outcome)
    }

    async fn begin_transaction(&mut self) -> Result<(), SqlSrvError> {
        self.state.usable()?;
        if self.state.open {
            return Err(SqlSrvError::ExecutionError(
                "MSSQL begin transaction error: a transaction is already open".to_string(),
            ));
        }
        execute_batch(&mut self.client, "BEGIN TRANSACTION")
            .await
            .map_err(|e| {
                SqlSrvError::ExecutionError(format!("MSSQL begin transaction error: {e}"))
            })?;
        self.state.open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlSrvError> {
        self.finish("COMMIT TRANSACTION", "commit").await
    }

    async fn rollback(&mut self) -> Result<(), SqlSrvError> {
        self.finish("ROLLBACK TRANSACTION", "rollback").await
    }

    fn in_transaction(&self) -> bool {
        self.state.open
    }

    async fn transaction_depth(&mut self) -> Result<i64, SqlSrvError> {
        self.state.usable()?;
        Ok(query_scalar_int(&mut self.client, "SELECT @@TRANCOUNT")
            .await?
            .unwrap_or(0))
    }

    async fn last_insert_id(&mut self) -> Result<Option<i64>, SqlSrvError> {
        self.state.usable()?;
        query_scalar_int(&mut self.client, "SELECT CAST(@@IDENTITY AS BIGINT)").await
    }

    fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    fn set_query_timeout(&mut self, timeout: Option<Duration>) {
        self.query_timeout = timeout;
    }
}
