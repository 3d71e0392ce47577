//! Statement and parameter-shape checks run before anything reaches the driver.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SqlSrvError;
use crate::params::Params;
use crate::types::OperationKind;

lazy_static! {
    static ref LINE_COMMENT: Regex = Regex::new(r"(?m)(--|//).*$").expect("valid regex");
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").expect("valid regex");
}

const FORBIDDEN_TOKENS: [&str; 6] = ["/*", "*/", "//", "--", "<-", "->"];

/// Remove line and block comments, then reject anything that still looks
/// like a comment marker.
///
/// # Errors
///
/// Returns `SqlSrvError::InvalidStatement` if a comment token survives.
pub fn without_comments(statement: &str, kind: OperationKind) -> Result<String, SqlSrvError> {
    let stripped = LINE_COMMENT.replace_all(statement, "");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, "");

    if let Some(token) = FORBIDDEN_TOKENS.iter().find(|t| stripped.contains(*t)) {
        return Err(SqlSrvError::InvalidStatement {
            method: kind.method_name(),
            expected: kind.verb(),
            reason: format!(
                "the statement contains comments ({token}); please remove them to proceed"
            ),
        });
    }

    Ok(stripped.into_owned())
}

/// Comment-free, single-line, trimmed form of a statement.
fn normalized(statement: &str, kind: OperationKind) -> Result<String, SqlSrvError> {
    let stripped = without_comments(statement, kind)?;
    let flattened: String = stripped
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
        .collect();
    Ok(flattened.trim().to_string())
}

/// Check that `statement` is a valid statement for `kind`.
///
/// # Errors
///
/// Returns `SqlSrvError::InvalidStatement` if comment tokens remain or the
/// statement does not start with the verb of `kind`.
pub fn check_statement(kind: OperationKind, statement: &str) -> Result<(), SqlSrvError> {
    let normalized = normalized(statement, kind)?;
    let verb = kind.verb();
    let starts_with_verb = normalized
        .get(..verb.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(verb));

    if starts_with_verb {
        Ok(())
    } else {
        Err(SqlSrvError::InvalidStatement {
            method: kind.method_name(),
            expected: verb,
            reason: format!("the statement does not start with {verb}, this is required"),
        })
    }
}

/// # Errors
/// See [`check_statement`].
pub fn is_select(statement: &str) -> Result<(), SqlSrvError> {
    check_statement(OperationKind::Select, statement)
}

/// # Errors
/// See [`check_statement`].
pub fn is_update(statement: &str) -> Result<(), SqlSrvError> {
    check_statement(OperationKind::Update, statement)
}

/// # Errors
/// See [`check_statement`].
pub fn is_insert(statement: &str) -> Result<(), SqlSrvError> {
    check_statement(OperationKind::Insert, statement)
}

/// # Errors
/// See [`check_statement`].
pub fn is_delete(statement: &str) -> Result<(), SqlSrvError> {
    check_statement(OperationKind::Delete, statement)
}

/// # Errors
/// See [`check_statement`].
pub fn is_procedure(statement: &str) -> Result<(), SqlSrvError> {
    check_statement(OperationKind::ExecuteProcedure, statement)
}

/// Batch parameters are only meaningful for inserts.
///
/// # Errors
///
/// Returns `SqlSrvError::InvalidParameterShape` for a batch on any other
/// operation.
pub fn check_params(kind: OperationKind, params: &Params) -> Result<(), SqlSrvError> {
    if params.is_batch() && !kind.accepts_batch() {
        return Err(SqlSrvError::InvalidParameterShape {
            method: kind.method_name(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::NamedParams;

    #[test]
    fn accepts_verbs_case_insensitively_after_whitespace() {
        assert!(is_select("  \r\n\tselect * from t").is_ok());
        assert!(is_update("Update t set a = 1").is_ok());
        assert!(is_insert("INSERT INTO t VALUES (1)").is_ok());
        assert!(is_delete("delete from t").is_ok());
        assert!(is_procedure("exec usp_GetOrders").is_ok());
        assert!(is_procedure("EXECUTE usp_GetOrders").is_ok());
    }

    #[test]
    fn rejects_wrong_verb() {
        let err = is_select("DROP TABLE x").unwrap_err();
        assert!(matches!(
            err,
            SqlSrvError::InvalidStatement {
                expected: "SELECT",
                ..
            }
        ));
        assert!(is_update("SELECT 1").is_err());
        assert!(is_delete("").is_err());
    }

    #[test]
    fn stripped_comments_do_not_hide_the_verb() {
        assert!(is_select("-- leading note\nSELECT 1").is_ok());
        assert!(is_select("/* block */ SELECT 1").is_ok());
        assert!(is_delete("/* DELETE */ SELECT 1").is_err());
    }

    #[test]
    fn residual_comment_markers_are_rejected() {
        let err = is_select("SELECT 1 */ FROM t").unwrap_err();
        assert!(err.to_string().contains("*/"));
        assert!(is_select("SELECT a->b FROM t").is_err());
        assert!(is_select("SELECT a <- b").is_err());
    }

    #[test]
    fn batch_params_only_for_inserts() {
        let batch = Params::Batch(vec![NamedParams::new().bind("a", 1)]);
        assert!(check_params(OperationKind::Insert, &batch).is_ok());
        assert!(check_params(OperationKind::InsertGetId, &batch).is_ok());
        for kind in [
            OperationKind::Select,
            OperationKind::Update,
            OperationKind::Delete,
            OperationKind::ExecuteProcedure,
            OperationKind::ExecuteTransactionalProcedure,
        ] {
            assert!(matches!(
                check_params(kind, &batch),
                Err(SqlSrvError::InvalidParameterShape { .. })
            ));
        }
        assert!(check_params(OperationKind::Update, &Params::none()).is_ok());
    }
}
