// Pipeline storage: cleaned tables as Parquet with a CSV twin

pub mod parquet_io;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::Dataset;
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::reader;
use crate::pipeline::processing::coerce::coerce_values;
use crate::pipeline::schema;
use crate::table::{Column, ColumnData, Table};

/// Paths written for one cleaned table
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub parquet: PathBuf,
    pub csv: PathBuf,
}

/// Columnar store rooted at the clean data directory
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn parquet_path(&self, dataset: Dataset) -> PathBuf {
        self.root.join(format!("{}.parquet", dataset.as_str()))
    }

    pub fn csv_path(&self, dataset: Dataset) -> PathBuf {
        self.root.join(format!("{}.csv", dataset.as_str()))
    }

    pub fn exists(&self, dataset: Dataset) -> bool {
        self.parquet_path(dataset).is_file() || self.csv_path(dataset).is_file()
    }

    pub fn write(&self, dataset: Dataset, table: &Table) -> Result<StoredTable> {
        let stored = StoredTable {
            parquet: self.parquet_path(dataset),
            csv: self.csv_path(dataset),
        };
        parquet_io::write_parquet(table, &stored.parquet)?;
        parquet_io::write_csv(table, &stored.csv)?;
        info!(
            table = %dataset,
            rows = table.num_rows(),
            path = %stored.parquet.display(),
            "Stored cleaned table"
        );
        Ok(stored)
    }

    /// Delete the stored files of a dataset so a later load cannot serve
    /// a table from an earlier run. Returns how many files were removed.
    pub fn remove(&self, dataset: Dataset) -> Result<usize> {
        let mut removed = 0;
        for path in [self.parquet_path(dataset), self.csv_path(dataset)] {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            info!(table = %dataset, files = removed, "Removed stale cleaned table");
        }
        Ok(removed)
    }

    /// Load a cleaned table, preferring Parquet and falling back to CSV.
    pub fn load(&self, dataset: Dataset) -> Result<Table> {
        let parquet = self.parquet_path(dataset);
        if parquet.is_file() {
            match parquet_io::read_parquet(dataset.as_str(), &parquet) {
                Ok(table) => return Ok(table),
                Err(e) => warn!(
                    table = %dataset,
                    path = %parquet.display(),
                    error = %e,
                    "Parquet unreadable, falling back to CSV"
                ),
            }
        }

        let csv = self.csv_path(dataset);
        if !csv.is_file() {
            return Err(PipelineError::MissingFile(parquet.display().to_string()));
        }
        debug!(table = %dataset, path = %csv.display(), "Loading cleaned CSV");
        let text = std::fs::read_to_string(&csv)?;
        let raw = reader::read_delimited(&text, b',', dataset)?;
        Ok(retype(dataset, raw))
    }

    /// Load whichever tables exist; missing ones are skipped.
    pub fn load_optional(&self, dataset: Dataset) -> Option<Table> {
        if !self.exists(dataset) {
            return None;
        }
        match self.load(dataset) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(table = %dataset, error = %e, "Failed to load cleaned table");
                None
            }
        }
    }
}

/// Re-coerce a text table read from CSV using the stored column kinds.
fn retype(dataset: Dataset, raw: Table) -> Table {
    let mut table = Table::new(raw.name);
    for column in raw.columns {
        let data = match &column.data {
            ColumnData::Text(values) => coerce_values(schema::stored_kind(dataset, &column.name), values),
            other => other.clone(),
        };
        table.columns.push(Column::new(column.name, data));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants as col;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn spend_table() -> Table {
        let mut table = Table::new("Spend");
        table.set_column(Column::new(
            col::DATE,
            ColumnData::Date(vec![NaiveDate::from_ymd_opt(2024, 5, 2), None]),
        ));
        table.set_column(Column::new(
            col::SOURCE,
            ColumnData::Text(vec![Some("Google Ads".into()), None]),
        ));
        table.set_column(Column::new(col::CLICKS, ColumnData::Int(vec![Some(10), Some(0)])));
        table.set_column(Column::new(col::SPEND, ColumnData::Float(vec![Some(12.5), None])));
        table
    }

    #[test]
    fn test_load_prefers_parquet() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store.write(Dataset::Spend, &spend_table()).unwrap();

        assert!(store.exists(Dataset::Spend));
        assert_eq!(store.load(Dataset::Spend).unwrap(), spend_table());
    }

    #[test]
    fn test_load_falls_back_to_csv_with_types() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store.write(Dataset::Spend, &spend_table()).unwrap();
        std::fs::write(store.parquet_path(Dataset::Spend), b"not parquet").unwrap();

        let table = store.load(Dataset::Spend).unwrap();
        assert_eq!(table, spend_table());
    }

    #[test]
    fn test_missing_table() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        assert!(store.load_optional(Dataset::Deals).is_none());
        assert!(matches!(store.load(Dataset::Deals), Err(PipelineError::MissingFile(_))));
    }
}
