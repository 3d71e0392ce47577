use crate::error::SqlSrvError;
use crate::params::Params;
use crate::types::OperationKind;
use crate::validator::{check_params, check_statement, without_comments};

/// Whether writes run with table constraints disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConstraintScope {
    #[default]
    Checked,
    /// Disable `CHECK`/foreign-key constraints around the write. An empty
    /// list targets the table named by the statement itself.
    Unchecked { tables: Vec<String> },
}

/// A validated statement ready for the executor.
#[derive(Debug, Clone)]
pub struct StatementContext {
    sql: String,
    kind: OperationKind,
    params: Params,
    constraints: ConstraintScope,
}

impl StatementContext {
    /// Validate the statement and parameter shape for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::InvalidStatement` or
    /// `SqlSrvError::InvalidParameterShape`; nothing has touched a
    /// connection at that point.
    pub fn new(
        kind: OperationKind,
        sql: impl Into<String>,
        params: impl Into<Params>,
    ) -> Result<Self, SqlSrvError> {
        let sql = sql.into();
        let params = params.into();
        check_statement(kind, &sql)?;
        check_params(kind, &params)?;
        Ok(Self {
            sql,
            kind,
            params,
            constraints: ConstraintScope::Checked,
        })
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintScope) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[must_use]
    pub fn constraints(&self) -> &ConstraintScope {
        &self.constraints
    }

    /// Tables to bracket for this statement; empty when constraints stay on.
    pub(crate) fn bracket_tables(&self) -> Vec<String> {
        match &self.constraints {
            ConstraintScope::Checked => Vec::new(),
            ConstraintScope::Unchecked { .. } if !self.kind.is_write() => Vec::new(),
            ConstraintScope::Unchecked { tables } if !tables.is_empty() => tables.clone(),
            ConstraintScope::Unchecked { .. } => {
                target_table(self.kind, &self.sql).into_iter().collect()
            }
        }
    }
}

/// Best-effort name of the table a write statement targets: the object name
/// after the verb, skipping `INTO`/`FROM`, cut at whitespace or an opening
/// parenthesis outside `[...]`.
#[must_use]
pub fn target_table(kind: OperationKind, sql: &str) -> Option<String> {
    let stripped = without_comments(sql, kind).ok()?;
    let (_verb, rest) = stripped.trim_start().split_once(char::is_whitespace)?;
    let mut rest = rest.trim_start();
    let word = rest.split(char::is_whitespace).next().unwrap_or_default();
    if word.eq_ignore_ascii_case("INTO") || word.eq_ignore_ascii_case("FROM") {
        rest = rest[word.len()..].trim_start();
    }
    let name = object_name(rest)?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Leading multi-part name of `text`; `None` for an unclosed `[`.
fn object_name(text: &str) -> Option<&str> {
    let mut bracketed = false;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '[' if !bracketed => bracketed = true,
            // `]]` is an escaped bracket inside the identifier
            ']' if bracketed => {
                if matches!(chars.peek(), Some((_, ']'))) {
                    chars.next();
                } else {
                    bracketed = false;
                }
            }
            c if !bracketed && (c.is_whitespace() || c == '(') => return Some(&text[..i]),
            _ => {}
        }
    }
    (!bracketed).then_some(text)
}
