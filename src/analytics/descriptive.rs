//! Descriptive statistics: numeric summaries and categorical frequencies.

use serde::Serialize;
use std::collections::HashMap;

use super::stats::{self, round_to};
use super::CleanData;
use crate::constants as col;
use crate::domain::Dataset;
use crate::table::{ColumnData, Table};

const TOP_CATEGORIES: usize = 20;
const NULL_LABEL: &str = "(null)";

/// Numeric columns worth summarizing; ids and derived flags are excluded
pub fn numeric_columns(dataset: Dataset) -> &'static [&'static str] {
    match dataset {
        Dataset::Calls => &[col::CALL_DURATION],
        Dataset::Spend => &[col::IMPRESSIONS, col::CLICKS, col::SPEND],
        Dataset::Deals => &[
            col::COURSE_DURATION,
            col::MONTHS_OF_STUDY,
            col::INITIAL_AMOUNT_PAID,
            col::OFFER_TOTAL_AMOUNT,
        ],
        Dataset::Contacts => &[],
    }
}

pub fn categorical_columns(dataset: Dataset) -> &'static [&'static str] {
    match dataset {
        Dataset::Deals => &[col::QUALITY, col::STAGE, col::SOURCE, col::PRODUCT],
        Dataset::Calls => &[col::CALL_TYPE, col::CALL_STATUS, col::CALL_OWNER],
        Dataset::Spend => &[col::SOURCE, col::CAMPAIGN, col::ADGROUP, col::AD],
        Dataset::Contacts => &[],
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub mode: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub range: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoricalSummary {
    pub column: String,
    pub total: usize,
    pub distinct: usize,
    pub top: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub table: Dataset,
    pub rows: usize,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

pub fn numeric_summary(name: &str, data: &ColumnData) -> Option<NumericSummary> {
    let values: Vec<f64> = data.as_f64()?.into_iter().flatten().collect();
    let bounds = stats::min_max(&values);
    Some(NumericSummary {
        column: name.to_string(),
        count: values.len(),
        mean: stats::mean(&values),
        median: stats::median(&values),
        mode: stats::mode(&values),
        min: bounds.map(|b| b.0),
        max: bounds.map(|b| b.1),
        range: bounds.map(|(lo, hi)| hi - lo),
    })
}

/// Value counts including nulls, most frequent first, capped at `top`.
pub fn categorical_summary(name: &str, data: &ColumnData, top: usize) -> CategoricalSummary {
    let total = data.len();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..total {
        let key = data.display(row).unwrap_or_else(|| NULL_LABEL.to_string());
        *counts.entry(key).or_default() += 1;
    }
    let distinct = counts.len();
    let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let top = ordered
        .into_iter()
        .take(top)
        .map(|(value, count)| CategoryCount {
            value,
            count,
            percent: round_to(super::safe_div(count as f64, total as f64) * 100.0, 2),
        })
        .collect();
    CategoricalSummary {
        column: name.to_string(),
        total,
        distinct,
        top,
    }
}

pub fn describe_table(dataset: Dataset, table: &Table) -> TableDescription {
    let numeric = numeric_columns(dataset)
        .iter()
        .filter_map(|name| numeric_summary(name, &table.column(name)?.data))
        .collect();
    let categorical = categorical_columns(dataset)
        .iter()
        .filter_map(|name| {
            table
                .column(name)
                .map(|c| categorical_summary(name, &c.data, TOP_CATEGORIES))
        })
        .collect();
    TableDescription {
        table: dataset,
        rows: table.num_rows(),
        numeric,
        categorical,
    }
}

/// Descriptions of every loaded table, in pipeline order.
pub fn describe(data: &CleanData) -> Vec<TableDescription> {
    Dataset::ALL
        .into_iter()
        .filter_map(|ds| data.table(ds).map(|t| describe_table(ds, t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_numeric_summary_over_ints() {
        let data = ColumnData::Int(vec![Some(10), Some(20), Some(20), None, Some(50)]);
        let summary = numeric_summary(col::CALL_DURATION, &data).unwrap();

        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, Some(25.0));
        assert_eq!(summary.median, Some(20.0));
        assert_eq!(summary.mode, Some(20.0));
        assert_eq!(summary.range, Some(40.0));
    }

    #[test]
    fn test_numeric_summary_rejects_text() {
        let data = ColumnData::Text(vec![Some("x".into())]);
        assert!(numeric_summary("x", &data).is_none());
    }

    #[test]
    fn test_categorical_summary_counts_nulls_and_caps() {
        let data = ColumnData::Text(vec![
            Some("a".into()),
            Some("b".into()),
            Some("a".into()),
            None,
        ]);
        let summary = categorical_summary(col::STAGE, &data, 2);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.distinct, 3);
        assert_eq!(summary.top.len(), 2);
        assert_eq!(summary.top[0].value, "a");
        assert_eq!(summary.top[0].percent, 50.0);
        assert_eq!(summary.top[1].value, NULL_LABEL);
    }

    #[test]
    fn test_describe_table_uses_present_columns_only() {
        let mut table = Table::new("Spend");
        table.set_column(Column::new(col::CLICKS, ColumnData::Int(vec![Some(1), Some(3)])));
        table.set_column(Column::new(
            col::SOURCE,
            ColumnData::Text(vec![Some("Google Ads".into()), Some("Facebook Ads".into())]),
        ));

        let description = describe_table(Dataset::Spend, &table);
        assert_eq!(description.numeric.len(), 1);
        assert_eq!(description.categorical.len(), 1);
        assert_eq!(description.rows, 2);
    }
}
