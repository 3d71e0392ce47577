//! Test support: a scripted in-memory driver and small fixtures.

mod memory;
pub mod test_helpers;

pub use memory::{DriverCall, MemoryConnection, MemoryDriver};
pub use test_helpers::{create_test_row, result_set};
