//! The boundary to the native database driver.
//!
//! The registry and executor only talk to these traits. The `mssql` feature
//! provides the tiberius implementation; the `test-utils` feature provides
//! an in-memory one.

use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::ConnectionDescriptor;
use crate::error::SqlSrvError;
use crate::results::ResultSet;
use crate::types::{Encoding, RowValues};

/// Opens connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a connection within the descriptor's login timeout.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ConnectionError` carrying the driver's message.
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, SqlSrvError>;
}

/// One open connection. Parameters are positional and match `@P1..@Pn`.
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement and materialize the first result's rows. A statement
    /// that produces no result set yields an empty [`ResultSet`].
    async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, SqlSrvError>;

    /// Run a statement, draining any results, and return rows affected.
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, SqlSrvError>;

    /// Run unparameterized SQL (attribute changes, constraint toggles).
    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlSrvError>;

    /// Errors if a transaction is already open; there is no nesting.
    async fn begin_transaction(&mut self) -> Result<(), SqlSrvError>;

    async fn commit(&mut self) -> Result<(), SqlSrvError>;

    async fn rollback(&mut self) -> Result<(), SqlSrvError>;

    /// Whether this connection believes a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Server-side transaction nesting level (`@@TRANCOUNT`).
    async fn transaction_depth(&mut self) -> Result<i64, SqlSrvError>;

    /// Identity generated by the most recent insert on this connection.
    async fn last_insert_id(&mut self) -> Result<Option<i64>, SqlSrvError>;

    fn set_encoding(&mut self, encoding: Encoding);

    /// `None` disables the limit.
    fn set_query_timeout(&mut self, timeout: Option<Duration>);
}
