//! Per-table cleaning: column pruning, trimming, deduplication, type
//! coercion and category canonicalization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::coerce::{clean_text, coerce_values};
use super::vocab::{vocabulary_for, Canonical};
use crate::constants as col;
use crate::constants::UNKNOWN;
use crate::domain::Dataset;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::schema::{self, ColumnKind};
use crate::table::{Column, ColumnData, Table};

const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnBrief {
    pub name: String,
    pub dtype: String,
    pub nulls: usize,
}

/// Shape snapshot of a table before or after cleaning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableBrief {
    pub rows: usize,
    pub cols: usize,
    pub columns: Vec<ColumnBrief>,
    pub sample: Vec<Map<String, Value>>,
}

impl TableBrief {
    pub fn of(table: &Table) -> Self {
        Self {
            rows: table.num_rows(),
            cols: table.num_columns(),
            columns: table
                .columns
                .iter()
                .map(|c| ColumnBrief {
                    name: c.name.clone(),
                    dtype: c.data.type_name().to_string(),
                    nulls: c.data.null_count(),
                })
                .collect(),
            sample: table.sample(SAMPLE_ROWS),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStatus {
    Ok,
    /// Raw export unavailable
    Skipped,
    Error,
}

/// What happened to one table during cleaning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCleaning {
    pub table: Dataset,
    pub status: CleaningStatus,
    pub before: Option<TableBrief>,
    pub after: Option<TableBrief>,
    pub notes: Vec<String>,
    /// Rows removed per reason
    pub rows_dropped: BTreeMap<String, usize>,
    /// Non-null raw values that failed type coercion, per column
    pub coercion_failures: BTreeMap<String, usize>,
    /// Out-of-vocabulary values per categorical column
    pub out_of_vocabulary: BTreeMap<String, BTreeMap<String, usize>>,
    pub error: Option<String>,
}

impl TableCleaning {
    pub fn new(table: Dataset, status: CleaningStatus) -> Self {
        Self {
            table,
            status,
            before: None,
            after: None,
            notes: Vec::new(),
            rows_dropped: BTreeMap::new(),
            coercion_failures: BTreeMap::new(),
            out_of_vocabulary: BTreeMap::new(),
            error: None,
        }
    }

    fn dropped(&mut self, dataset: Dataset, reason: &'static str, rows: usize) {
        if rows == 0 {
            return;
        }
        *self.rows_dropped.entry(reason.to_string()).or_default() += rows;
        metrics::cleaning::record_rows_dropped(dataset.as_str(), reason, rows);
    }
}

/// A cleaned table and its cleaning record
pub struct Cleaned {
    pub table: Table,
    pub report: TableCleaning,
}

/// Required columns are kept even when empty; coercion types them as all-null.
fn drop_all_null_columns(dataset: Dataset, table: &mut Table, report: &mut TableCleaning) {
    let empty: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.data.is_all_null())
        .filter(|c| !schema::column_spec(dataset, &c.name).is_some_and(|spec| spec.required))
        .map(|c| c.name.clone())
        .collect();
    if table.num_rows() == 0 || empty.is_empty() {
        return;
    }
    for name in &empty {
        table.take_column(name);
    }
    report
        .notes
        .push(format!("Dropped {} all-null column(s): {}", empty.len(), empty.join(", ")));
}

fn trim_text_columns(table: &mut Table) {
    for column in table.columns.iter_mut() {
        if let ColumnData::Text(values) = &mut column.data {
            for v in values.iter_mut() {
                *v = clean_text(v.as_deref());
            }
        }
    }
}

fn drop_rows_without_id(dataset: Dataset, table: &mut Table, report: &mut TableCleaning) {
    let Some(ids) = table.text(col::ID) else {
        return;
    };
    let mask: Vec<bool> = ids.iter().map(Option::is_some).collect();
    let dropped = mask.iter().filter(|m| !**m).count();
    if dropped > 0 {
        table.retain_rows(&mask);
        report.notes.push(format!("Dropped {dropped} row(s) with empty Id"));
        report.dropped(dataset, "missing_id", dropped);
    }
}

fn drop_duplicates(dataset: Dataset, table: &mut Table, report: &mut TableCleaning) {
    let mask: Vec<bool> = match schema::dedup_key(dataset).and_then(|key| table.text(key)) {
        Some(ids) => {
            let mut seen = HashSet::new();
            ids.iter().map(|id| seen.insert(id.clone())).collect()
        }
        None => {
            let mut seen = HashSet::new();
            (0..table.num_rows())
                .map(|row| seen.insert(table.row_display(row)))
                .collect()
        }
    };
    let dropped = mask.iter().filter(|m| !**m).count();
    if dropped > 0 {
        table.retain_rows(&mask);
        let by = if schema::dedup_key(dataset).is_some() { "Id" } else { "full row" };
        report
            .notes
            .push(format!("Removed {dropped} duplicate row(s) by {by}"));
        report.dropped(dataset, "duplicate", dropped);
    }
}

fn canonicalize_column(
    dataset: Dataset,
    name: &str,
    values: &[Option<String>],
    report: &mut TableCleaning,
) -> ColumnData {
    let Some(vocab) = vocabulary_for(dataset, name) else {
        return ColumnData::Text(
            values
                .iter()
                .map(|v| Some(v.clone().unwrap_or_else(|| UNKNOWN.to_string())))
                .collect(),
        );
    };
    let mut missing = 0;
    let mut oov: BTreeMap<String, usize> = BTreeMap::new();
    let out = values
        .iter()
        .map(|v| {
            let canonical = vocab.canonicalize(v.as_deref());
            match &canonical {
                Canonical::Missing => missing += 1,
                Canonical::OutOfVocabulary(value) => *oov.entry(value.clone()).or_default() += 1,
                Canonical::Known(_) => {}
            }
            Some(canonical.into_value())
        })
        .collect();

    if missing > 0 {
        report
            .notes
            .push(format!("Filled {missing} missing '{name}' value(s) with '{UNKNOWN}'"));
    }
    if !oov.is_empty() {
        let total: usize = oov.values().sum();
        report.notes.push(format!(
            "'{name}': {total} value(s) outside the {} vocabulary",
            vocab.name
        ));
        metrics::cleaning::record_out_of_vocabulary(name, total);
        report.out_of_vocabulary.insert(name.to_string(), oov);
    }
    ColumnData::Text(out)
}

fn coerce_columns(dataset: Dataset, table: &mut Table, report: &mut TableCleaning) {
    for column in table.columns.iter_mut() {
        let Some(spec) = schema::column_spec(dataset, &column.name) else {
            continue;
        };
        let ColumnData::Text(values) = &column.data else {
            continue;
        };
        let present = values.iter().filter(|v| v.is_some()).count();

        let data = match spec.kind {
            ColumnKind::Category => canonicalize_column(dataset, spec.name, values, report),
            ColumnKind::Text if !spec.nullable => {
                let missing = values.iter().filter(|v| v.is_none()).count();
                if missing > 0 {
                    report.notes.push(format!(
                        "Filled {missing} missing '{}' value(s) with '{UNKNOWN}'",
                        spec.name
                    ));
                }
                ColumnData::Text(
                    values
                        .iter()
                        .map(|v| Some(v.clone().unwrap_or_else(|| UNKNOWN.to_string())))
                        .collect(),
                )
            }
            ColumnKind::Bool if !spec.nullable => {
                let ColumnData::Bool(parsed) = coerce_values(spec.kind, values) else {
                    continue;
                };
                let missing = parsed.iter().filter(|v| v.is_none()).count();
                if missing > 0 {
                    report.notes.push(format!(
                        "'{}': {missing} missing value(s) treated as false",
                        spec.name
                    ));
                }
                ColumnData::Bool(parsed.into_iter().map(|v| Some(v.unwrap_or(false))).collect())
            }
            kind => {
                let coerced = coerce_values(kind, values);
                let failed = present.saturating_sub(coerced.len() - coerced.null_count());
                if failed > 0 && !matches!(kind, ColumnKind::Id | ColumnKind::Text) {
                    report.notes.push(format!(
                        "'{}': {failed} value(s) could not be parsed as {} and were set to null",
                        spec.name,
                        coerced.type_name()
                    ));
                    report.coercion_failures.insert(spec.name.to_string(), failed);
                }
                coerced
            }
        };
        column.data = data;
    }
}

fn drop_rows_without_created_time(table: &mut Table, report: &mut TableCleaning) {
    let Some(created) = table.datetime(col::CREATED_TIME) else {
        return;
    };
    let mask: Vec<bool> = created.iter().map(Option::is_some).collect();
    let dropped = mask.iter().filter(|m| !**m).count();
    if dropped > 0 {
        table.retain_rows(&mask);
        report.notes.push(format!(
            "Dropped {dropped} row(s) whose '{}' could not be parsed",
            col::CREATED_TIME
        ));
        report.dropped(Dataset::Deals, "invalid_created_time", dropped);
    }
}

/// Clean one raw table. Errors only when a required column is absent.
#[instrument(skip(raw), fields(table = %dataset, rows = raw.num_rows()))]
pub fn clean_table(dataset: Dataset, raw: &Table) -> Result<Cleaned> {
    let started = Instant::now();
    let mut report = TableCleaning::new(dataset, CleaningStatus::Ok);
    report.before = Some(TableBrief::of(raw));

    if let Some(missing) = schema::required_columns(dataset).find(|c| !raw.has_column(c)) {
        return Err(PipelineError::MissingColumn {
            table: dataset.to_string(),
            column: missing.to_string(),
        });
    }

    let mut table = raw.clone();
    table.name = dataset.as_str().to_string();

    trim_text_columns(&mut table);
    drop_all_null_columns(dataset, &mut table, &mut report);
    if schema::dedup_key(dataset).is_some() {
        drop_rows_without_id(dataset, &mut table, &mut report);
    }
    drop_duplicates(dataset, &mut table, &mut report);
    coerce_columns(dataset, &mut table, &mut report);

    if dataset == Dataset::Deals {
        drop_rows_without_created_time(&mut table, &mut report);
    }

    report.after = Some(TableBrief::of(&table));
    metrics::cleaning::record_duration(dataset.as_str(), started.elapsed().as_secs_f64());
    info!(
        before = raw.num_rows(),
        after = table.num_rows(),
        notes = report.notes.len(),
        "Cleaned table"
    );
    debug!(notes = ?report.notes, "Cleaning notes");
    Ok(Cleaned { table, report })
}

/// Replace a column, creating it if absent (used by the derive step).
pub(crate) fn put(table: &mut Table, name: &str, data: ColumnData) {
    table.set_column(Column::new(name, data));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn raw(headers: &[&str], rows: Vec<Vec<Option<String>>>) -> Table {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        Table::from_text_rows("raw", &headers, rows)
    }

    #[test]
    fn test_deals_drop_blank_ids_duplicates_and_bad_dates() {
        let table = raw(
            &[col::ID, col::STAGE, col::CREATED_TIME, col::OFFER_TOTAL_AMOUNT, "Empty"],
            vec![
                vec![s(" 1 "), s("Payment Done"), s("01.03.2024 10:00"), s("1 200,50"), None],
                vec![s("1"), s("lost"), s("02.03.2024 10:00"), None, None],
                vec![None, s("new lead"), s("03.03.2024 10:00"), None, None],
                vec![s("2"), None, s("garbage"), s("abc"), None],
                vec![s("3"), s("Strange Stage"), s("2024-03-04"), None, None],
            ],
        );

        let cleaned = clean_table(Dataset::Deals, &table).unwrap();
        let t = &cleaned.table;

        assert_eq!(t.num_rows(), 2);
        assert!(!t.has_column("Empty"));
        assert_eq!(t.text(col::ID).unwrap(), &[s("1"), s("3")]);
        assert_eq!(t.text(col::STAGE).unwrap(), &[s("payment done"), s("strange stage")]);
        assert_eq!(t.float(col::OFFER_TOTAL_AMOUNT).unwrap(), &[Some(1200.5), None]);

        let report = cleaned.report;
        assert_eq!(report.rows_dropped["missing_id"], 1);
        assert_eq!(report.rows_dropped["duplicate"], 1);
        assert_eq!(report.rows_dropped["invalid_created_time"], 1);
        assert_eq!(report.coercion_failures[col::OFFER_TOTAL_AMOUNT], 1);
        assert_eq!(report.out_of_vocabulary[col::STAGE]["strange stage"], 1);
        assert_eq!(report.before.unwrap().rows, 5);
    }

    #[test]
    fn test_calls_fill_unknown_and_scheduled_false() {
        let table = raw(
            &[
                col::ID,
                col::CALL_START_TIME,
                col::CONTACT_ID,
                col::CALL_DURATION,
                col::CALL_TYPE,
                col::SCHEDULED_IN_CRM,
            ],
            vec![
                vec![s("10"), s("01.03.2024 10:00"), s("007"), s("65"), s("Outgoing"), s("1")],
                vec![s("11"), s("01.03.2024 11:00"), s("008"), s("0"), None, None],
            ],
        );

        let cleaned = clean_table(Dataset::Calls, &table).unwrap();
        let t = &cleaned.table;

        assert_eq!(t.text(col::CONTACT_ID).unwrap(), &[s("007"), s("008")]);
        assert_eq!(t.int(col::CALL_DURATION).unwrap(), &[Some(65), Some(0)]);
        assert_eq!(t.text(col::CALL_TYPE).unwrap(), &[s("outbound"), s("unknown")]);
        assert_eq!(t.boolean(col::SCHEDULED_IN_CRM).unwrap(), &[Some(true), Some(false)]);
    }

    #[test]
    fn test_spend_dedupes_full_rows_and_normalizes_dates() {
        let row = vec![s("01.02.2024"), s("Google"), s("100"), s("5,5"), s("3")];
        let table = raw(
            &[col::DATE, col::SOURCE, col::IMPRESSIONS, col::SPEND, col::CLICKS],
            vec![row.clone(), row, vec![s("2024-02-02 13:00:00"), s("Meta"), s("1,000"), s("7"), s("0")]],
        );

        let cleaned = clean_table(Dataset::Spend, &table).unwrap();
        let t = &cleaned.table;

        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.date(col::DATE).unwrap()[1], chrono::NaiveDate::from_ymd_opt(2024, 2, 2));
        assert_eq!(t.int(col::IMPRESSIONS).unwrap(), &[Some(100), Some(1000)]);
        assert_eq!(t.float(col::SPEND).unwrap(), &[Some(5.5), Some(7.0)]);
    }

    #[test]
    fn test_all_null_required_columns_are_kept_and_typed() {
        let deals = raw(
            &[col::ID, col::STAGE, col::CREATED_TIME, col::DEAL_OWNER],
            vec![
                vec![s("1"), None, s("01.03.2024 10:00"), None],
                vec![s("2"), None, s("02.03.2024 10:00"), None],
            ],
        );
        let cleaned = clean_table(Dataset::Deals, &deals).unwrap();
        let t = &cleaned.table;
        assert!(!t.has_column(col::DEAL_OWNER));
        assert_eq!(t.text(col::STAGE).unwrap(), &[s(UNKNOWN), s(UNKNOWN)]);

        let spend = raw(
            &[col::DATE, col::SOURCE, col::IMPRESSIONS, col::SPEND, col::CLICKS],
            vec![
                vec![s("01.02.2024"), s("Google"), s("100"), s("5"), None],
                vec![s("02.02.2024"), s("Meta"), s("200"), s("7"), None],
            ],
        );
        let cleaned = clean_table(Dataset::Spend, &spend).unwrap();
        assert_eq!(cleaned.table.int(col::CLICKS).unwrap(), &[None, None]);
    }

    #[test]
    fn test_all_null_created_time_drops_every_deal() {
        let deals = raw(
            &[col::ID, col::STAGE, col::CREATED_TIME],
            vec![vec![s("1"), s("lost"), None], vec![s("2"), s("new lead"), None]],
        );
        let cleaned = clean_table(Dataset::Deals, &deals).unwrap();
        assert!(cleaned.table.has_column(col::CREATED_TIME));
        assert_eq!(cleaned.table.num_rows(), 0);
        assert_eq!(cleaned.report.rows_dropped["invalid_created_time"], 2);
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let table = raw(&[col::ID], vec![vec![s("1")]]);
        let err = clean_table(Dataset::Deals, &table).err().unwrap();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }
}
