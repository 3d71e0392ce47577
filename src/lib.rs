//! Async convenience layer over tiberius for SQL Server.
//!
//! A [`ConnectionRegistry`] keeps one live connection per logical name and
//! broadcasts transaction boundaries to all of them. A [`Session`] binds to
//! one registered connection and runs validated, verb-checked statements
//! with `:name` placeholders; row-returning calls hand back a lazy
//! [`Selection`] with ordering, slicing and aggregation helpers.

pub mod credentials;
pub mod driver;
pub mod error;
pub mod executor;
pub mod exports;
pub mod params;
pub mod placeholders;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod session;
pub mod types;
pub mod validator;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use credentials::{ConnectionDescriptor, ConnectionTable, CredentialSource};
pub use error::SqlSrvError;
pub use executor::InsertedId;
pub use params::{NamedParams, Params};
pub use registry::{CommitMode, ConnectionHandle, ConnectionRegistry};
pub use results::{ResultSet, Row};
pub use session::{ConnectionStatus, Selection, Session, SessionOption};
pub use types::{Direction, Encoding, OperationKind, RowValues};
