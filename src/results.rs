//! Materialized query results and the shaping helpers over them.

mod result_set;
mod row;
mod shape;

pub use result_set::ResultSet;
pub use row::Row;
