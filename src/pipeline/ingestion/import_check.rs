use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument, warn};

use super::reader::{self, FileFormat, RawFile};
use crate::config::Config;
use crate::domain::Dataset;
use crate::observability::metrics;
use crate::pipeline::processing::coerce::infer_type;
use crate::pipeline::schema;

const SAMPLE_ROWS: usize = 5;

/// Import outcome of one expected table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Ok,
    OkWithWarnings,
    Missing,
    Error,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Ok => "ok",
            TableStatus::OkWithWarnings => "ok_with_warnings",
            TableStatus::Missing => "missing",
            TableStatus::Error => "error",
        }
    }
}

/// Severity levels for import issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    /// Worth knowing, nothing to fix
    Info,
    /// Data usable but suspicious
    Warning,
    /// Data needed downstream is missing or unreadable
    Error,
}

/// Types of problems the checklist detects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingFile,
    ParseError,
    MissingRequiredColumn,
    UnexpectedColumn,
    HighNullRate,
    EmptyTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub description: String,
    /// Column that triggered the issue
    pub column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: String,
    pub null_count: usize,
    pub null_rate: f64,
    pub required: bool,
    /// Declared in the data dictionary
    pub expected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCheck {
    pub table: Dataset,
    pub status: TableStatus,
    pub file: Option<String>,
    pub format: Option<FileFormat>,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    pub rows: usize,
    pub cols: usize,
    pub columns: Vec<String>,
    pub missing_required: Vec<String>,
    pub unexpected: Vec<String>,
    pub profiles: Vec<ColumnProfile>,
    pub issues: Vec<ImportIssue>,
    pub sample: Vec<Map<String, Value>>,
    pub error: Option<String>,
}

impl TableCheck {
    fn empty(table: Dataset, status: TableStatus) -> Self {
        Self {
            table,
            status,
            file: None,
            format: None,
            encoding: None,
            delimiter: None,
            size_bytes: None,
            sha256: None,
            rows: 0,
            cols: 0,
            columns: Vec::new(),
            missing_required: Vec::new(),
            unexpected: Vec::new(),
            profiles: Vec::new(),
            issues: Vec::new(),
            sample: Vec::new(),
            error: None,
        }
    }
}

/// The whole import checklist, written as `import_checklist.{json,md}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportChecklist {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub raw_dir: String,
    pub max_null_rate: f64,
    pub tables: Vec<TableCheck>,
}

impl ImportChecklist {
    pub fn table(&self, dataset: Dataset) -> Option<&TableCheck> {
        self.tables.iter().find(|t| t.table == dataset)
    }

    pub fn loaded_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, TableStatus::Ok | TableStatus::OkWithWarnings))
            .count()
    }
}

/// Checklist plus the raw tables that could be read, so cleaning does not
/// have to read the files twice.
pub struct ImportOutcome {
    pub checklist: ImportChecklist,
    pub raw: BTreeMap<Dataset, RawFile>,
}

/// Profile a loaded raw table against the data dictionary.
pub fn check_raw(dataset: Dataset, raw: &RawFile, max_null_rate: f64) -> TableCheck {
    let table = &raw.table;
    let mut check = TableCheck::empty(dataset, TableStatus::Ok);
    check.file = Some(raw.path.display().to_string());
    check.format = Some(raw.format);
    check.encoding = raw.encoding.clone();
    check.delimiter = raw.delimiter.map(|d| match d {
        '\t' => "\\t".to_string(),
        other => other.to_string(),
    });
    check.size_bytes = Some(raw.size_bytes);
    check.sha256 = Some(raw.sha256.clone());
    check.rows = table.num_rows();
    check.cols = table.num_columns();
    check.columns = table.column_names();
    check.sample = table.sample(SAMPLE_ROWS);

    for name in schema::required_columns(dataset) {
        if !table.has_column(name) {
            check.missing_required.push(name.to_string());
            check.issues.push(ImportIssue {
                kind: IssueKind::MissingRequiredColumn,
                severity: IssueSeverity::Error,
                description: format!("Required column '{name}' is missing"),
                column: Some(name.to_string()),
            });
        }
    }

    for column in &table.columns {
        let spec = schema::column_spec(dataset, &column.name);
        if spec.is_none() {
            check.unexpected.push(column.name.clone());
            check.issues.push(ImportIssue {
                kind: IssueKind::UnexpectedColumn,
                severity: IssueSeverity::Info,
                description: format!("Column '{}' is not in the data dictionary", column.name),
                column: Some(column.name.clone()),
            });
        }
        let required = spec.map(|s| s.required).unwrap_or(false);

        let null_count = column.data.null_count();
        let null_rate = if check.rows == 0 {
            0.0
        } else {
            null_count as f64 / check.rows as f64
        };
        let inferred_type = match table.text(&column.name) {
            Some(values) => infer_type(values.iter().map(|v| v.as_deref())),
            None => column.data.type_name(),
        };

        if null_rate > max_null_rate {
            check.issues.push(ImportIssue {
                kind: IssueKind::HighNullRate,
                severity: if required {
                    IssueSeverity::Error
                } else {
                    IssueSeverity::Warning
                },
                description: format!(
                    "Column '{}' is {:.1}% null (threshold {:.0}%)",
                    column.name,
                    null_rate * 100.0,
                    max_null_rate * 100.0
                ),
                column: Some(column.name.clone()),
            });
        }

        check.profiles.push(ColumnProfile {
            name: column.name.clone(),
            inferred_type: inferred_type.to_string(),
            null_count,
            null_rate,
            required,
            expected: spec.is_some(),
        });
    }

    if check.rows == 0 {
        check.issues.push(ImportIssue {
            kind: IssueKind::EmptyTable,
            severity: IssueSeverity::Warning,
            description: "File has a header but no data rows".to_string(),
            column: None,
        });
    }

    check.status = if !check.missing_required.is_empty() {
        TableStatus::Error
    } else if check
        .issues
        .iter()
        .any(|i| i.severity >= IssueSeverity::Warning)
    {
        TableStatus::OkWithWarnings
    } else {
        TableStatus::Ok
    };
    check
}

fn check_one(
    dataset: Dataset,
    raw_dir: &Path,
    file_name: &str,
    max_null_rate: f64,
) -> (TableCheck, Option<RawFile>) {
    let Some(path) = reader::locate(raw_dir, file_name, dataset) else {
        warn!(table = %dataset, file = file_name, "Export not found");
        let mut check = TableCheck::empty(dataset, TableStatus::Missing);
        check.issues.push(ImportIssue {
            kind: IssueKind::MissingFile,
            severity: IssueSeverity::Error,
            description: format!("No file '{}' or *{}* export in {}", file_name, dataset, raw_dir.display()),
            column: None,
        });
        return (check, None);
    };

    match reader::read_raw(&path, dataset) {
        Ok(raw) => {
            metrics::import::record_rows_read(dataset.as_str(), raw.table.num_rows());
            (check_raw(dataset, &raw, max_null_rate), Some(raw))
        }
        Err(e) => {
            warn!(table = %dataset, path = %path.display(), error = %e, "Failed to parse export");
            let mut check = TableCheck::empty(dataset, TableStatus::Error);
            check.file = Some(path.display().to_string());
            check.error = Some(e.to_string());
            check.issues.push(ImportIssue {
                kind: IssueKind::ParseError,
                severity: IssueSeverity::Error,
                description: e.to_string(),
                column: None,
            });
            (check, None)
        }
    }
}

/// Locate, read and profile all four exports. Never fails: problems are
/// recorded per table.
#[instrument(skip(config), fields(raw_dir = %config.paths.raw_dir.display()))]
pub fn run_import_check(config: &Config, run_id: &str) -> ImportOutcome {
    let mut tables = Vec::new();
    let mut raw = BTreeMap::new();

    for dataset in Dataset::ALL {
        let (check, file) = check_one(
            dataset,
            &config.paths.raw_dir,
            config.raw_file_name(dataset),
            config.import.max_null_rate,
        );
        metrics::import::record_table_status(dataset.as_str(), check.status.as_str());
        info!(
            table = %dataset,
            status = check.status.as_str(),
            rows = check.rows,
            issues = check.issues.len(),
            "Import check"
        );
        tables.push(check);
        if let Some(file) = file {
            raw.insert(dataset, file);
        }
    }

    ImportOutcome {
        checklist: ImportChecklist {
            run_id: run_id.to_string(),
            generated_at: Utc::now(),
            raw_dir: config.paths.raw_dir.display().to_string(),
            max_null_rate: config.import.max_null_rate,
            tables,
        },
        raw,
    }
}
