//! Declarative data dictionary for the four CRM exports.

use serde::Serialize;

use crate::constants as col;
use crate::domain::Dataset;

/// How a column is coerced during cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    /// Identifier kept as trimmed text (no numeric coercion)
    Id,
    Text,
    /// Canonicalized against a reference vocabulary
    Category,
    Int,
    Float,
    DateTime,
    /// Datetime normalized to the calendar day
    Date,
    Bool,
    /// `hh:mm:ss` style durations converted to float hours
    DurationHours,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Must be present in the raw export
    pub required: bool,
    /// Null allowed after cleaning
    pub nullable: bool,
}

const fn spec(name: &'static str, kind: ColumnKind, required: bool, nullable: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        required,
        nullable,
    }
}

use ColumnKind::*;

const CONTACTS: &[ColumnSpec] = &[
    spec(col::ID, Id, true, false),
    spec(col::CONTACT_OWNER, Text, false, true),
    spec(col::CREATED_TIME, DateTime, true, true),
    spec(col::MODIFIED_TIME, DateTime, false, true),
];

const CALLS: &[ColumnSpec] = &[
    spec(col::ID, Id, true, false),
    spec(col::CALL_START_TIME, DateTime, true, true),
    spec(col::CALL_OWNER, Text, false, true),
    spec(col::CONTACT_ID, Id, true, true),
    spec(col::CALL_TYPE, Category, false, false),
    spec(col::CALL_DURATION, Int, true, true),
    spec(col::CALL_STATUS, Category, false, false),
    spec(col::OUTGOING_CALL_STATUS, Category, false, false),
    spec(col::SCHEDULED_IN_CRM, Bool, false, false),
];

const SPEND: &[ColumnSpec] = &[
    spec(col::DATE, Date, true, true),
    spec(col::SOURCE, Text, true, true),
    spec(col::CAMPAIGN, Text, false, true),
    spec(col::IMPRESSIONS, Int, true, true),
    spec(col::SPEND, Float, true, true),
    spec(col::CLICKS, Int, true, true),
    spec(col::ADGROUP, Text, false, true),
    spec(col::AD, Text, false, true),
];

const DEALS: &[ColumnSpec] = &[
    spec(col::ID, Id, true, false),
    spec(col::DEAL_OWNER, Text, false, true),
    spec(col::CLOSING_DATE, DateTime, false, true),
    spec(col::QUALITY, Category, false, false),
    spec(col::STAGE, Category, true, false),
    spec(col::LOST_REASON, Text, false, true),
    spec(col::PAGE, Text, false, true),
    spec(col::CAMPAIGN, Text, false, true),
    spec(col::SLA, DurationHours, false, true),
    spec(col::CONTENT, Text, false, true),
    spec(col::TERM_ADGROUP, Text, false, true),
    spec(col::SOURCE, Text, false, false),
    spec(col::PAYMENT_TYPE, Category, false, false),
    spec(col::PRODUCT, Text, false, true),
    spec(col::EDUCATION_TYPE, Text, false, true),
    spec(col::CREATED_TIME, DateTime, true, false),
    spec(col::COURSE_DURATION, Float, false, true),
    spec(col::MONTHS_OF_STUDY, Float, false, true),
    spec(col::INITIAL_AMOUNT_PAID, Float, false, true),
    spec(col::OFFER_TOTAL_AMOUNT, Float, false, true),
    spec(col::CONTACT_NAME, Id, false, true),
    spec(col::CITY, Text, false, true),
    spec(col::LEVEL_OF_DEUTSCH, Text, false, true),
];

/// Fields added to cleaned Deals by the derive step
const DEALS_DERIVED: &[ColumnSpec] = &[
    spec(col::IS_PAID, Bool, false, false),
    spec(col::IS_LOST, Bool, false, false),
    spec(col::IS_CLOSED, Bool, false, false),
    spec(col::REVENUE, Float, false, false),
    spec(col::SLA_HOURS, Float, false, true),
    spec(col::LIFETIME_DAYS, Float, false, true),
    spec(col::MONTH, Text, false, true),
    spec(col::LEVEL_NORM, Text, false, true),
    spec(col::CALLS_CNT, Int, false, false),
    spec(col::HAS_CALL, Bool, false, false),
];

/// Column dictionary of a dataset
pub fn columns(dataset: Dataset) -> &'static [ColumnSpec] {
    match dataset {
        Dataset::Contacts => CONTACTS,
        Dataset::Calls => CALLS,
        Dataset::Spend => SPEND,
        Dataset::Deals => DEALS,
    }
}

pub fn column_spec(dataset: Dataset, name: &str) -> Option<&'static ColumnSpec> {
    columns(dataset).iter().find(|c| c.name == name)
}

pub fn derived_columns(dataset: Dataset) -> &'static [ColumnSpec] {
    match dataset {
        Dataset::Deals => DEALS_DERIVED,
        _ => &[],
    }
}

/// Kind of a column as stored in the cleaned table, derived fields included.
/// Columns outside the dictionary are kept as text.
pub fn stored_kind(dataset: Dataset, name: &str) -> ColumnKind {
    column_spec(dataset, name)
        .or_else(|| derived_columns(dataset).iter().find(|c| c.name == name))
        .map(|c| c.kind)
        .unwrap_or(Text)
}

pub fn required_columns(dataset: Dataset) -> impl Iterator<Item = &'static str> {
    columns(dataset).iter().filter(|c| c.required).map(|c| c.name)
}

/// Deduplication key: `Id` for entity tables, whole row for Spend
pub fn dedup_key(dataset: Dataset) -> Option<&'static str> {
    match dataset {
        Dataset::Spend => None,
        _ => Some(col::ID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_dataset_has_required_columns() {
        for ds in Dataset::ALL {
            assert!(required_columns(ds).count() > 0, "{ds} has no required columns");
        }
    }

    #[test]
    fn test_column_names_unique_per_dataset() {
        for ds in Dataset::ALL {
            let mut names: Vec<_> = columns(ds).iter().map(|c| c.name).collect();
            names.sort();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate column in {ds}");
        }
    }

    #[test]
    fn test_stored_kind_covers_derived_and_unknown_columns() {
        assert_eq!(stored_kind(Dataset::Deals, col::SLA), DurationHours);
        assert_eq!(stored_kind(Dataset::Deals, col::CALLS_CNT), Int);
        assert_eq!(stored_kind(Dataset::Calls, col::CALLS_CNT), Text);
        assert_eq!(stored_kind(Dataset::Spend, "Whatever"), Text);
    }
}
