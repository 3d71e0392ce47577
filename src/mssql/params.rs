use tiberius::Query;

use crate::types::RowValues;

/// Bind positional values to a tiberius query in `@P1..@Pn` order.
///
/// The query owns its parameter data, so values are cloned in.
pub fn bind_query_params<'a>(sql: &'a str, params: &[RowValues]) -> Query<'a> {
    let mut query = Query::new(sql);

    for param in params {
        match param {
            RowValues::Int(i) => query.bind(*i),
            RowValues::Float(f) => query.bind(*f),
            RowValues::Text(s) => query.bind(s.clone()),
            RowValues::Bool(b) => query.bind(*b),
            RowValues::Timestamp(dt) => query.bind(*dt),
            RowValues::Null => query.bind(Option::<String>::None),
            RowValues::Blob(bytes) => query.bind(bytes.clone()),
        }
    }

    query
}
