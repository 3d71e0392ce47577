use tiberius::{Client, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use super::config::{MssqlClient, build_tiberius_config};
use crate::credentials::ConnectionDescriptor;
use crate::error::SqlSrvError;

/// Open a client for `descriptor`, giving up after its login timeout.
///
/// Named instances are located through the SQL Browser service.
///
/// # Errors
/// Returns `SqlSrvError::ConnectionError` if the TCP connect, the login
/// handshake or the timeout fails.
pub async fn create_mssql_client(
    descriptor: &ConnectionDescriptor,
) -> Result<MssqlClient, SqlSrvError> {
    let limit = descriptor.login_timeout();
    tokio::time::timeout(limit, connect(descriptor))
        .await
        .map_err(|_| {
            SqlSrvError::ConnectionError(format!(
                "login to {} timed out after {}s",
                descriptor.dsn(),
                limit.as_secs()
            ))
        })?
}

async fn connect(descriptor: &ConnectionDescriptor) -> Result<MssqlClient, SqlSrvError> {
    let config = build_tiberius_config(descriptor);

    let tcp = if descriptor.instance().is_some() {
        TcpStream::connect_named(&config).await.map_err(|e| {
            SqlSrvError::ConnectionError(format!("SQL Browser lookup failed: {e}"))
        })?
    } else {
        TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| SqlSrvError::ConnectionError(format!("TCP connection error: {e}")))?
    };
    tcp.set_nodelay(true)
        .map_err(|e| SqlSrvError::ConnectionError(format!("TCP configuration error: {e}")))?;

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| SqlSrvError::ConnectionError(format!("SQL Server connection error: {e}")))
}
