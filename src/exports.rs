//! Driver-specific type exports.
//!
//! Conditional feature exports for the SQL Server backend, kept in one place.

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlClient;
#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlConnection;
#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlDriver;
#[cfg(feature = "mssql")]
pub use crate::mssql::create_mssql_client;
#[cfg(feature = "mssql")]
pub use crate::mssql::query::build_result_set as mssql_build_result_set;
