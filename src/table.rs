//! In-memory columnar table shared by every pipeline stage.
//!
//! Raw exports are loaded as all-text tables; cleaning replaces columns with
//! typed ones. The same structure is what the store writes to Parquet/CSV and
//! what the analytics read back.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Text(v) => v[row].is_none(),
            ColumnData::Int(v) => v[row].is_none(),
            ColumnData::Float(v) => v[row].is_none(),
            ColumnData::Bool(v) => v[row].is_none(),
            ColumnData::DateTime(v) => v[row].is_none(),
            ColumnData::Date(v) => v[row].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    pub fn is_all_null(&self) -> bool {
        self.null_count() == self.len()
    }

    /// Short dtype label used in reports
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Text(_) => "string",
            ColumnData::Int(_) => "int64",
            ColumnData::Float(_) => "float64",
            ColumnData::Bool(_) => "bool",
            ColumnData::DateTime(_) => "datetime",
            ColumnData::Date(_) => "date",
        }
    }

    /// Text rendering of a cell, `None` for nulls.
    pub fn display(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Text(v) => v[row].clone(),
            ColumnData::Int(v) => v[row].map(|x| x.to_string()),
            ColumnData::Float(v) => v[row].map(|x| x.to_string()),
            ColumnData::Bool(v) => v[row].map(|x| x.to_string()),
            ColumnData::DateTime(v) => v[row].map(|x| x.format("%Y-%m-%d %H:%M:%S").to_string()),
            ColumnData::Date(v) => v[row].map(|x| x.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn json_value(&self, row: usize) -> Value {
        match self {
            ColumnData::Int(v) => v[row].map(Value::from).unwrap_or(Value::Null),
            ColumnData::Float(v) => v[row]
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnData::Bool(v) => v[row].map(Value::Bool).unwrap_or(Value::Null),
            _ => self.display(row).map(Value::String).unwrap_or(Value::Null),
        }
    }

    /// Keep only the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> ColumnData {
        fn keep<T: Clone>(v: &[Option<T>], mask: &[bool]) -> Vec<Option<T>> {
            v.iter()
                .zip(mask)
                .filter(|(_, m)| **m)
                .map(|(x, _)| x.clone())
                .collect()
        }
        match self {
            ColumnData::Text(v) => ColumnData::Text(keep(v, mask)),
            ColumnData::Int(v) => ColumnData::Int(keep(v, mask)),
            ColumnData::Float(v) => ColumnData::Float(keep(v, mask)),
            ColumnData::Bool(v) => ColumnData::Bool(keep(v, mask)),
            ColumnData::DateTime(v) => ColumnData::DateTime(keep(v, mask)),
            ColumnData::Date(v) => ColumnData::Date(keep(v, mask)),
        }
    }

    /// Numeric view (ints widened), used by descriptive statistics
    pub fn as_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            ColumnData::Int(v) => Some(v.iter().map(|x| x.map(|i| i as f64)).collect()),
            ColumnData::Float(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Build an all-text table from a header and string rows.
    pub fn from_text_rows(
        name: impl Into<String>,
        headers: &[String],
        rows: Vec<Vec<Option<String>>>,
    ) -> Self {
        let mut cols: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            let mut cells = row.into_iter();
            for col in cols.iter_mut() {
                col.push(cells.next().flatten());
            }
        }
        Self {
            name: name.into(),
            columns: headers
                .iter()
                .zip(cols)
                .map(|(h, c)| Column::new(h.clone(), ColumnData::Text(c)))
                .collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Insert a column, replacing an existing one with the same name in place.
    pub fn set_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    pub fn take_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    pub fn retain_rows(&mut self, mask: &[bool]) {
        for col in self.columns.iter_mut() {
            col.data = col.data.filter(mask);
        }
    }

    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match &self.column(name)?.data {
            ColumnData::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<&[Option<i64>]> {
        match &self.column(name)?.data {
            ColumnData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<&[Option<f64>]> {
        match &self.column(name)?.data {
            ColumnData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<&[Option<bool>]> {
        match &self.column(name)?.data {
            ColumnData::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn datetime(&self, name: &str) -> Option<&[Option<NaiveDateTime>]> {
        match &self.column(name)?.data {
            ColumnData::DateTime(v) => Some(v),
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<&[Option<NaiveDate>]> {
        match &self.column(name)?.data {
            ColumnData::Date(v) => Some(v),
            _ => None,
        }
    }

    /// Row as a cell-per-column string vector (used for dedup keys and CSV).
    pub fn row_display(&self, row: usize) -> Vec<Option<String>> {
        self.columns.iter().map(|c| c.data.display(row)).collect()
    }

    /// First `n` rows as JSON objects for report samples.
    pub fn sample(&self, n: usize) -> Vec<Map<String, Value>> {
        (0..self.num_rows().min(n))
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data.json_value(row)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_from_text_rows_pads_short_rows() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let table = Table::from_text_rows("t", &headers, vec![vec![s("1")], vec![s("2"), s("x")]]);

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.text("b").unwrap(), &[None, s("x")]);
    }

    #[test]
    fn test_retain_rows_applies_to_every_column() {
        let mut table = Table::new("t");
        table.set_column(Column::new("a", ColumnData::Int(vec![Some(1), Some(2), None])));
        table.set_column(Column::new("b", ColumnData::Text(vec![s("x"), None, s("z")])));

        table.retain_rows(&[true, false, true]);

        assert_eq!(table.int("a").unwrap(), &[Some(1), None]);
        assert_eq!(table.text("b").unwrap(), &[s("x"), s("z")]);
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = Table::new("t");
        table.set_column(Column::new("a", ColumnData::Text(vec![s("1")])));
        table.set_column(Column::new("b", ColumnData::Text(vec![s("2")])));
        table.set_column(Column::new("a", ColumnData::Int(vec![Some(1)])));

        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.column("a").unwrap().data.type_name(), "int64");
    }
}
