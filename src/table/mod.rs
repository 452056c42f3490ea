use std::collections::HashSet;

use crate::error::{Error, Result};

/// A table as the source file claims it: header names plus raw string rows.
/// Row lengths are not guaranteed to match the header; the parser repairs
/// that before typing.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
}

/// One typed column. `None` entries are missing values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Number(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Text(_) => ColumnKind::Text,
            Column::Number(_) => ColumnKind::Number,
        }
    }

    pub fn value(&self, row: usize) -> Value {
        match self {
            Column::Text(v) => match v.get(row) {
                Some(Some(s)) => Value::Text(s.clone()),
                _ => Value::Missing,
            },
            Column::Number(v) => match v.get(row) {
                Some(Some(n)) => Value::Number(*n),
                _ => Value::Missing,
            },
        }
    }

    /// Gather rows by index, repeating indices as given. Used by the merge
    /// engine to materialize the left side of a join.
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Text(v) => {
                Column::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
            Column::Number(v) => Column::Number(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Gather rows by optional index; `None` becomes a missing value. Used
    /// for the right side of a left outer join.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Column {
        match self {
            Column::Text(v) => Column::Text(
                indices
                    .iter()
                    .map(|i| i.and_then(|i| v[i].clone()))
                    .collect(),
            ),
            Column::Number(v) => {
                Column::Number(indices.iter().map(|i| i.and_then(|i| v[i])).collect())
            }
        }
    }
}

/// An ordered, uniquely named set of typed columns sharing one row count.
/// Produced only by the parser and the merge engine; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedTable {
    columns: Vec<(String, Column)>,
}

impl TypedTable {
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (name, _) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(Error::Parse(format!("duplicate column name `{name}`")));
            }
        }
        if let Some((first_name, first)) = columns.first() {
            for (name, col) in &columns {
                if col.len() != first.len() {
                    return Err(Error::Parse(format!(
                        "column `{name}` has {} rows but `{first_name}` has {}",
                        col.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(TypedTable { columns })
    }

    pub fn empty() -> Self {
        TypedTable { columns: Vec::new() }
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn value(&self, row: usize, name: &str) -> Option<Value> {
        self.column(name).map(|c| c.value(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_table() -> TypedTable {
        TypedTable::from_columns(vec![
            (
                "code".to_string(),
                Column::Text(vec![Some("01".into()), Some("02".into())]),
            ),
            (
                "value".to_string(),
                Column::Number(vec![Some(1.5), None]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn value_access_and_shape() {
        let t = two_column_table();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.n_columns(), 2);
        assert_eq!(t.value(0, "code"), Some(Value::Text("01".into())));
        assert_eq!(t.value(1, "value"), Some(Value::Missing));
        assert_eq!(t.value(0, "nope"), None);
    }

    #[test]
    fn rejects_duplicate_column_names() {
        let result = TypedTable::from_columns(vec![
            ("a".to_string(), Column::Text(vec![None])),
            ("a".to_string(), Column::Text(vec![None])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_uneven_row_counts() {
        let result = TypedTable::from_columns(vec![
            ("a".to_string(), Column::Text(vec![None, None])),
            ("b".to_string(), Column::Number(vec![Some(1.0)])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn take_repeats_and_take_opt_fills_missing() {
        let col = Column::Number(vec![Some(1.0), Some(2.0)]);
        assert_eq!(
            col.take(&[0, 0, 1]),
            Column::Number(vec![Some(1.0), Some(1.0), Some(2.0)])
        );
        assert_eq!(
            col.take_opt(&[Some(1), None]),
            Column::Number(vec![Some(2.0), None])
        );
    }
}
