mod constraints;
mod run;
mod statement;

pub use constraints::ConstraintBracket;
pub(crate) use constraints::{ToggleTarget, set_foreign_keys};
pub use run::{InsertedId, run_insert_get_id, run_query, run_transactional_procedure, run_write};
pub use statement::{ConstraintScope, StatementContext, target_table};
