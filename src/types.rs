use std::cmp::Ordering;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

/// Values that can be stored in a result row or bound as a statement parameter.
///
/// ```rust
/// use sqlsrv_middleware::prelude::*;
///
/// let params = NamedParams::new()
///     .bind("id", 1)
///     .bind("name", "alice")
///     .bind("active", true);
/// assert_eq!(params.get("name"), Some(&RowValues::Text("alice".into())));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    /// Numeric view used by the aggregations: integers widen to `f64`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Total order used for sorting and min/max.
    ///
    /// Null sorts first, then booleans, numbers (integers and floats compared
    /// numerically), text, timestamps and finally binary data.
    #[must_use]
    pub fn compare(&self, other: &RowValues) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_float(), other.as_float()) {
            return a.total_cmp(&b);
        }
        match (self, other) {
            (RowValues::Bool(a), RowValues::Bool(b)) => a.cmp(b),
            (RowValues::Text(a), RowValues::Text(b)) => a.cmp(b),
            (RowValues::Timestamp(a), RowValues::Timestamp(b)) => a.cmp(b),
            (RowValues::Blob(a), RowValues::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RowValues::Null => 0,
            RowValues::Bool(_) => 1,
            RowValues::Int(_) | RowValues::Float(_) => 2,
            RowValues::Text(_) => 3,
            RowValues::Timestamp(_) => 4,
            RowValues::Blob(_) => 5,
        }
    }

    /// JSON rendering used by [`crate::results::Row::to_json`].
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => {
                JsonValue::from(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Character-set attribute applied to a connection after it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Encoding {
    /// Character columns are returned as raw bytes.
    Binary,
    /// UTF-8 text (default)
    #[default]
    Utf8,
    /// The server's system code page
    System,
    /// Whatever the driver considers its default
    Default,
}

impl Encoding {
    /// Parse a configured charset name; unknown names fall back to UTF-8.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        <Encoding as ValueEnum>::from_str(value.trim(), true).unwrap_or_default()
    }
}

/// The closed set of statement operations the executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Select,
    Update,
    Insert,
    InsertGetId,
    Delete,
    ExecuteProcedure,
    ExecuteTransactionalProcedure,
}

impl OperationKind {
    /// The SQL verb a statement of this kind must start with.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            OperationKind::Select => "SELECT",
            OperationKind::Update => "UPDATE",
            OperationKind::Insert | OperationKind::InsertGetId => "INSERT",
            OperationKind::Delete => "DELETE",
            OperationKind::ExecuteProcedure | OperationKind::ExecuteTransactionalProcedure => {
                "EXEC"
            }
        }
    }

    /// Public method name used in error messages.
    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            OperationKind::Select => "Session::select()",
            OperationKind::Update => "Session::update()",
            OperationKind::Insert => "Session::insert()",
            OperationKind::InsertGetId => "Session::insert_get_id()",
            OperationKind::Delete => "Session::delete()",
            OperationKind::ExecuteProcedure => "Session::execute_procedure()",
            OperationKind::ExecuteTransactionalProcedure => {
                "Session::execute_transactional_procedure()"
            }
        }
    }

    /// Whether the operation accepts a list of parameter sets.
    #[must_use]
    pub fn accepts_batch(self) -> bool {
        matches!(self, OperationKind::Insert | OperationKind::InsertGetId)
    }

    /// Whether constraint bracketing applies to this operation.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            OperationKind::Update
                | OperationKind::Insert
                | OperationKind::InsertGetId
                | OperationKind::Delete
        )
    }
}

/// Sort direction for [`crate::results::ResultSet::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_parses_case_insensitively_with_fallback() {
        assert_eq!(Encoding::parse_lenient("BINARY"), Encoding::Binary);
        assert_eq!(Encoding::parse_lenient(" system "), Encoding::System);
        assert_eq!(Encoding::parse_lenient("latin1"), Encoding::Utf8);
    }

    #[test]
    fn compare_mixes_ints_and_floats_numerically() {
        assert_eq!(RowValues::Int(2).compare(&RowValues::Float(1.5)), Ordering::Greater);
        assert_eq!(RowValues::Null.compare(&RowValues::Int(0)), Ordering::Less);
        assert_eq!(
            RowValues::Text("a".into()).compare(&RowValues::Int(10)),
            Ordering::Greater
        );
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert_eq!(RowValues::from(none), RowValues::Null);
        assert_eq!(RowValues::from(Some("x")), RowValues::Text("x".into()));
    }
}
