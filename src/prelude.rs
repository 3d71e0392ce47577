//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::credentials::{
    ConnectionDescriptor, ConnectionDescriptorBuilder, ConnectionEntry, ConnectionTable,
    CredentialSource,
};
pub use crate::driver::{Driver, DriverConnection};
pub use crate::error::SqlSrvError;
pub use crate::executor::{ConstraintScope, InsertedId};
pub use crate::params::{NamedParams, Params};
pub use crate::registry::{CommitMode, ConnectionHandle, ConnectionRegistry};
pub use crate::results::{ResultSet, Row};
pub use crate::session::{ConnectionStatus, Selection, Session, SessionOption};
pub use crate::types::{Direction, Encoding, RowValues};

#[cfg(feature = "mssql")]
pub use crate::exports::MssqlDriver;
