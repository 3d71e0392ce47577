// MSSQL module - SQL Server access through tiberius
//
// - config: descriptor to tiberius configuration
// - client: TCP / SQL Browser connect with login timeout
// - params: positional parameter binding
// - query: result extraction and statement execution
// - connection: the `DriverConnection` implementation

pub mod client;
pub mod config;
pub mod connection;
pub mod params;
pub mod query;

use async_trait::async_trait;

pub use client::create_mssql_client;
pub use config::MssqlClient;
pub use connection::MssqlConnection;

use crate::credentials::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection};
use crate::error::SqlSrvError;

/// The production [`Driver`]: one tiberius client per registered connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDriver;

#[async_trait]
impl Driver for MssqlDriver {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, SqlSrvError> {
        let client = create_mssql_client(descriptor).await?;
        tracing::info!(dsn = %descriptor.dsn(), "connected to SQL Server");
        Ok(Box::new(MssqlConnection::new(client)))
    }
}
