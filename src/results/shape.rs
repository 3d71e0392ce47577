use serde_json::Value as JsonValue;

use super::{ResultSet, Row};
use crate::types::{Direction, RowValues};

impl ResultSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.results.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Row> {
        self.results.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.results.iter()
    }

    /// Stable sort by one column. Rows missing the column sort as NULL.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> ResultSet {
        self.results.sort_by(|a, b| {
            let left = a.get(column).unwrap_or(&RowValues::Null);
            let right = b.get(column).unwrap_or(&RowValues::Null);
            let ordering = left.compare(right);
            match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        });
        self
    }

    #[must_use]
    pub fn reverse(mut self) -> ResultSet {
        self.results.reverse();
        self
    }

    /// Rows `offset..offset + length` (to the end when `length` is `None`).
    /// Out-of-range offsets yield an empty set.
    #[must_use]
    pub fn slice(&self, offset: usize, length: Option<usize>) -> ResultSet {
        let mut out = self.empty_like();
        let rows = self.results.iter().skip(offset);
        match length {
            Some(length) => out.results.extend(rows.take(length).cloned()),
            None => out.results.extend(rows.cloned()),
        }
        out
    }

    /// Split into consecutive sets of `size` rows; the last may be shorter.
    /// A `size` of zero yields no chunks.
    #[must_use]
    pub fn chunk(&self, size: usize) -> Vec<ResultSet> {
        if size == 0 {
            return Vec::new();
        }
        self.results
            .chunks(size)
            .map(|rows| {
                let mut out = self.empty_like();
                out.results.extend_from_slice(rows);
                out
            })
            .collect()
    }

    /// Values of one column, in row order. Rows without the column are skipped.
    #[must_use]
    pub fn pluck(&self, column: &str) -> Vec<RowValues> {
        self.results
            .iter()
            .filter_map(|row| row.get(column).cloned())
            .collect()
    }

    /// Sum of the numeric values of a column; non-numeric values are ignored.
    #[must_use]
    pub fn sum(&self, column: &str) -> f64 {
        self.numeric(column).sum()
    }

    /// Mean of the numeric values of a column, `None` when there are none.
    #[must_use]
    pub fn avg(&self, column: &str) -> Option<f64> {
        let (total, count) = self
            .numeric(column)
            .fold((0.0, 0_u32), |(total, count), value| (total + value, count + 1));
        (count > 0).then(|| total / f64::from(count))
    }

    /// Smallest non-null value of a column.
    #[must_use]
    pub fn min(&self, column: &str) -> Option<RowValues> {
        self.non_null(column).min_by(|a, b| a.compare(b)).cloned()
    }

    /// Largest non-null value of a column.
    #[must_use]
    pub fn max(&self, column: &str) -> Option<RowValues> {
        self.non_null(column).max_by(|a, b| a.compare(b)).cloned()
    }

    #[must_use]
    pub fn filter<F>(&self, mut predicate: F) -> ResultSet
    where
        F: FnMut(&Row) -> bool,
    {
        let mut out = self.empty_like();
        out.results
            .extend(self.results.iter().filter(|row| predicate(row)).cloned());
        out
    }

    pub fn map<T, F>(&self, f: F) -> Vec<T>
    where
        F: FnMut(&Row) -> T,
    {
        self.results.iter().map(f).collect()
    }

    /// Append the rows of `other`. Its rows keep their own column layout.
    #[must_use]
    pub fn merge(mut self, other: ResultSet) -> ResultSet {
        for row in other.results {
            self.add_row(row);
        }
        self
    }

    /// JSON array of row objects.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.results.iter().map(Row::to_json).collect())
    }

    fn numeric<'a>(&'a self, column: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.results
            .iter()
            .filter_map(move |row| row.get(column).and_then(RowValues::as_float))
    }

    fn non_null<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a RowValues> + 'a {
        self.results
            .iter()
            .filter_map(move |row| row.get(column))
            .filter(|value| !value.is_null())
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> ResultSet {
        ResultSet::from_rows(
            vec!["id".into(), "customer".into(), "total".into()],
            vec![
                vec![RowValues::Int(1), "ann".into(), RowValues::Float(12.5)],
                vec![RowValues::Int(2), "bob".into(), RowValues::Int(30)],
                vec![RowValues::Int(3), "cid".into(), RowValues::Null],
                vec![RowValues::Int(4), "ann".into(), RowValues::Float(7.5)],
            ],
        )
    }

    #[test]
    fn aggregates_skip_nulls() {
        let rs = orders();
        assert!((rs.sum("total") - 50.0).abs() < f64::EPSILON);
        assert_eq!(rs.avg("total"), Some(50.0 / 3.0));
        assert_eq!(rs.min("total"), Some(RowValues::Float(7.5)));
        assert_eq!(rs.max("total"), Some(RowValues::Int(30)));
        assert_eq!(rs.avg("missing"), None);
    }

    #[test]
    fn order_by_then_pluck() {
        let rs = orders().order_by("total", Direction::Desc);
        assert_eq!(
            rs.pluck("id"),
            vec![
                RowValues::Int(2),
                RowValues::Int(1),
                RowValues::Int(4),
                RowValues::Int(3)
            ]
        );
    }

    #[test]
    fn slice_and_chunk_keep_columns() {
        let rs = orders();
        let middle = rs.slice(1, Some(2));
        assert_eq!(middle.len(), 2);
        assert_eq!(middle.first().and_then(|r| r.get("customer")), Some(&"bob".into()));
        assert!(rs.slice(10, None).is_empty());

        let chunks = rs.chunk(3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[1].get_column_names().map(|c| c.len()), Some(3));
        assert!(rs.chunk(0).is_empty());
    }

    #[test]
    fn filter_map_merge() {
        let rs = orders();
        let ann = rs.filter(|row| row.get("customer") == Some(&"ann".into()));
        assert_eq!(ann.len(), 2);
        let ids: Vec<i64> = ann.map(|row| *row.get("id").and_then(RowValues::as_int).unwrap());
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(ann.merge(rs.slice(1, Some(1))).len(), 3);
    }

    #[test]
    fn rows_render_as_json_objects() {
        let rs = orders();
        let json = rs.first().map(Row::to_json).unwrap();
        assert_eq!(json["customer"], "ann");
        assert_eq!(json["total"], 12.5);
        assert_eq!(rs.to_json().as_array().map(Vec::len), Some(4));
    }
}
