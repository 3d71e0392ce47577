use thiserror::Error;

/// Errors raised by the middleware.
///
/// Every variant carries enough context to name the method or field that
/// failed. Nothing is retried and nothing is turned into `false`, except the
/// documented "zero rows affected" outcome of writes, which is not an error.
#[derive(Debug, Error)]
pub enum SqlSrvError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    /// A required credential field is absent or blank.
    #[error("{source_name}: the key [{field}] is not present or empty")]
    MissingCredential {
        source_name: &'static str,
        field: &'static str,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The driver could not open a connection; wraps the driver's own text.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Wrong SQL verb, or comment tokens left in the statement.
    #[error("{method}: {reason}")]
    InvalidStatement {
        method: &'static str,
        expected: &'static str,
        reason: String,
    },

    #[error(
        "{method}: arrays with multiple parameter sets can only be used for data insertion"
    )]
    InvalidParameterShape { method: &'static str },

    #[error("{method}: the connection to the database is not initialized")]
    UninitializedConnection { method: &'static str },

    /// Commit or rollback failed part way through the registered connections.
    #[error(
        "{method}: failed on connection [{failed}] ({message}); already completed: {completed:?}"
    )]
    PartialTransaction {
        method: &'static str,
        failed: String,
        completed: Vec<String>,
        message: String,
    },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl SqlSrvError {
    pub(crate) fn execution(method: &str, err: impl std::fmt::Display) -> Self {
        SqlSrvError::ExecutionError(format!("{method} - {err}"))
    }
}
