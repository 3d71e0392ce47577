//! Named-placeholder rewriting.
//!
//! Statements are written with `:name` placeholders; SQL Server wants
//! positional `@P1`, `@P2`, ... parameters. The rewrite walks the statement
//! with a small state machine so that placeholders inside quoted literals,
//! bracketed identifiers and comments are left untouched.

use std::fmt::Write;

use crate::error::SqlSrvError;
use crate::params::NamedParams;
use crate::types::RowValues;

/// A statement rewritten once for positional binding.
///
/// `@P<n>` in [`sql`](Self::sql) refers to `placeholder_names()[n - 1]`; a
/// name used several times maps to a single position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    sql: String,
    names: Vec<String>,
}

impl PreparedStatement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn placeholder_names(&self) -> &[String] {
        &self.names
    }

    /// Positional values for one parameter set.
    ///
    /// Parameters whose placeholder does not occur in the statement are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ExecutionError` if a placeholder has no value.
    pub fn bind(&self, params: &NamedParams) -> Result<Vec<RowValues>, SqlSrvError> {
        self.names
            .iter()
            .map(|name| {
                params.get(name).cloned().ok_or_else(|| {
                    SqlSrvError::ExecutionError(format!("no value bound for placeholder :{name}"))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    LineComment,
    BlockComment(usize),
}

/// Rewrite `:name` placeholders to `@P<n>`.
#[must_use]
pub fn prepare_named(sql: &str) -> PreparedStatement {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut names: Vec<String> = Vec::new();
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'[' => state = State::Bracketed,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                // `::` is T-SQL scope syntax, never a placeholder
                b':' if bytes.get(idx + 1) == Some(&b':') => idx += 1,
                b':' => {
                    if let Some(end) = scan_identifier(bytes, idx + 1) {
                        let name = &sql[idx + 1..end];
                        let position = match names.iter().position(|n| n == name) {
                            Some(position) => position,
                            None => {
                                names.push(name.to_string());
                                names.len() - 1
                            }
                        };
                        out.push_str(&sql[copied..idx]);
                        let _ = write!(out, "@P{}", position + 1);
                        copied = end;
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Bracketed => {
                if b == b']' {
                    if bytes.get(idx + 1) == Some(&b']') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[copied..]);
    PreparedStatement { sql: out, names }
}

fn scan_identifier(bytes: &[u8], start: usize) -> Option<usize> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = start + 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    Some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_named_to_positional() {
        let prepared = prepare_named("UPDATE t SET name = :name WHERE id = :id");
        assert_eq!(prepared.sql(), "UPDATE t SET name = @P1 WHERE id = @P2");
        assert_eq!(prepared.placeholder_names(), ["name", "id"]);
    }

    #[test]
    fn repeated_names_share_a_position() {
        let prepared = prepare_named("SELECT * FROM t WHERE a = :v OR b = :v AND c = :w");
        assert_eq!(prepared.sql(), "SELECT * FROM t WHERE a = @P1 OR b = @P1 AND c = @P2");
    }

    #[test]
    fn skips_literals_brackets_and_scope_operator() {
        let sql = "SELECT ':x', [a:b], \"c:d\" FROM t WHERE d = :d AND s = SCHEMA::dbo";
        let prepared = prepare_named(sql);
        assert_eq!(
            prepared.sql(),
            "SELECT ':x', [a:b], \"c:d\" FROM t WHERE d = @P1 AND s = SCHEMA::dbo"
        );
        assert_eq!(prepared.placeholder_names(), ["d"]);
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let prepared = prepare_named("INSERT INTO t (n) VALUES (N'año'), (:n)");
        assert_eq!(prepared.sql(), "INSERT INTO t (n) VALUES (N'año'), (@P1)");
    }

    #[test]
    fn bind_ignores_unused_and_rejects_missing() {
        let prepared = prepare_named("DELETE FROM t WHERE id = :id");
        let params = NamedParams::new().bind("id", 7).bind("unused", "x");
        assert_eq!(prepared.bind(&params).unwrap(), vec![RowValues::Int(7)]);

        let err = prepared.bind(&NamedParams::new()).unwrap_err();
        assert!(matches!(err, SqlSrvError::ExecutionError(msg) if msg.contains(":id")));
    }
}
