//! Domain data shapes shared across layers.
//!
//! Cleaned tables are stored column-wise; analytics work on these typed rows
//! instead. Building rows from a table never fails: a missing optional
//! column simply yields `None` for every row.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants as col;
use crate::table::Table;

/// The four CRM exports handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Dataset {
    Contacts,
    Calls,
    Spend,
    Deals,
}

impl Dataset {
    /// Processing order: Deals comes last so its derived fields can use Calls
    pub const ALL: [Dataset; 4] = [Dataset::Contacts, Dataset::Calls, Dataset::Spend, Dataset::Deals];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Contacts => "Contacts",
            Dataset::Calls => "Calls",
            Dataset::Spend => "Spend",
            Dataset::Deals => "Deals",
        }
    }

    pub fn parse(name: &str) -> Option<Dataset> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: String,
    pub owner: Option<String>,
    pub created_time: Option<NaiveDateTime>,
    pub modified_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub id: String,
    pub contact_id: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub owner: Option<String>,
    pub call_type: Option<String>,
    pub duration_secs: Option<i64>,
    pub status: Option<String>,
    pub outgoing_status: Option<String>,
    pub scheduled_in_crm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendRow {
    pub date: Option<NaiveDate>,
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub adgroup: Option<String>,
    pub ad: Option<String>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub spend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deal {
    pub id: String,
    pub owner: Option<String>,
    pub contact_id: Option<String>,
    pub created_time: Option<NaiveDateTime>,
    pub closing_date: Option<NaiveDateTime>,
    pub stage: Option<String>,
    pub quality: Option<String>,
    pub lost_reason: Option<String>,
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub adgroup: Option<String>,
    pub payment_type: Option<String>,
    pub product: Option<String>,
    pub education_type: Option<String>,
    pub city: Option<String>,
    pub level_raw: Option<String>,
    pub course_duration: Option<f64>,
    pub months_of_study: Option<f64>,
    pub initial_amount_paid: Option<f64>,
    pub offer_total_amount: Option<f64>,
    pub sla_hours: Option<f64>,
    // Derived during cleaning
    pub is_paid: bool,
    pub is_lost: bool,
    pub is_closed: bool,
    pub revenue: f64,
    pub lifetime_days: Option<f64>,
    pub month: Option<String>,
    pub level_norm: Option<String>,
    pub calls_cnt: i64,
    pub has_call: bool,
}

impl Deal {
    /// City usable for geo views (the CRM writes `-` for unknown)
    pub fn known_city(&self) -> Option<&str> {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != col::NO_CITY)
    }
}

fn text_at(table: &Table, name: &str, row: usize) -> Option<String> {
    table.text(name).and_then(|v| v[row].clone())
}

fn float_at(table: &Table, name: &str, row: usize) -> Option<f64> {
    match table.float(name) {
        Some(v) => v[row],
        None => table.int(name).and_then(|v| v[row]).map(|x| x as f64),
    }
}

fn int_at(table: &Table, name: &str, row: usize) -> Option<i64> {
    table.int(name).and_then(|v| v[row])
}

fn bool_at(table: &Table, name: &str, row: usize) -> Option<bool> {
    table.boolean(name).and_then(|v| v[row])
}

fn datetime_at(table: &Table, name: &str, row: usize) -> Option<NaiveDateTime> {
    match table.datetime(name) {
        Some(v) => v[row],
        None => table
            .date(name)
            .and_then(|v| v[row])
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
    }
}

fn date_at(table: &Table, name: &str, row: usize) -> Option<NaiveDate> {
    match table.date(name) {
        Some(v) => v[row],
        None => table.datetime(name).and_then(|v| v[row]).map(|dt| dt.date()),
    }
}

pub fn contacts_from_table(table: &Table) -> Vec<Contact> {
    (0..table.num_rows())
        .filter_map(|row| {
            Some(Contact {
                id: text_at(table, col::ID, row)?,
                owner: text_at(table, col::CONTACT_OWNER, row),
                created_time: datetime_at(table, col::CREATED_TIME, row),
                modified_time: datetime_at(table, col::MODIFIED_TIME, row),
            })
        })
        .collect()
}

pub fn calls_from_table(table: &Table) -> Vec<Call> {
    (0..table.num_rows())
        .filter_map(|row| {
            Some(Call {
                id: text_at(table, col::ID, row)?,
                contact_id: text_at(table, col::CONTACT_ID, row),
                start_time: datetime_at(table, col::CALL_START_TIME, row),
                owner: text_at(table, col::CALL_OWNER, row),
                call_type: text_at(table, col::CALL_TYPE, row),
                duration_secs: int_at(table, col::CALL_DURATION, row),
                status: text_at(table, col::CALL_STATUS, row),
                outgoing_status: text_at(table, col::OUTGOING_CALL_STATUS, row),
                scheduled_in_crm: bool_at(table, col::SCHEDULED_IN_CRM, row).unwrap_or(false),
            })
        })
        .collect()
}

pub fn spend_from_table(table: &Table) -> Vec<SpendRow> {
    (0..table.num_rows())
        .map(|row| SpendRow {
            date: date_at(table, col::DATE, row),
            source: text_at(table, col::SOURCE, row),
            campaign: text_at(table, col::CAMPAIGN, row),
            adgroup: text_at(table, col::ADGROUP, row),
            ad: text_at(table, col::AD, row),
            impressions: int_at(table, col::IMPRESSIONS, row),
            clicks: int_at(table, col::CLICKS, row),
            spend: float_at(table, col::SPEND, row),
        })
        .collect()
}

pub fn deals_from_table(table: &Table) -> Vec<Deal> {
    (0..table.num_rows())
        .filter_map(|row| {
            Some(Deal {
                id: text_at(table, col::ID, row)?,
                owner: text_at(table, col::DEAL_OWNER, row),
                contact_id: text_at(table, col::CONTACT_NAME, row),
                created_time: datetime_at(table, col::CREATED_TIME, row),
                closing_date: datetime_at(table, col::CLOSING_DATE, row),
                stage: text_at(table, col::STAGE, row),
                quality: text_at(table, col::QUALITY, row),
                lost_reason: text_at(table, col::LOST_REASON, row),
                source: text_at(table, col::SOURCE, row),
                campaign: text_at(table, col::CAMPAIGN, row),
                adgroup: text_at(table, col::TERM_ADGROUP, row),
                payment_type: text_at(table, col::PAYMENT_TYPE, row),
                product: text_at(table, col::PRODUCT, row),
                education_type: text_at(table, col::EDUCATION_TYPE, row),
                city: text_at(table, col::CITY, row),
                level_raw: text_at(table, col::LEVEL_OF_DEUTSCH, row),
                course_duration: float_at(table, col::COURSE_DURATION, row),
                months_of_study: float_at(table, col::MONTHS_OF_STUDY, row),
                initial_amount_paid: float_at(table, col::INITIAL_AMOUNT_PAID, row),
                offer_total_amount: float_at(table, col::OFFER_TOTAL_AMOUNT, row),
                sla_hours: float_at(table, col::SLA_HOURS, row),
                is_paid: bool_at(table, col::IS_PAID, row).unwrap_or(false),
                is_lost: bool_at(table, col::IS_LOST, row).unwrap_or(false),
                is_closed: bool_at(table, col::IS_CLOSED, row).unwrap_or(false),
                revenue: float_at(table, col::REVENUE, row).unwrap_or(0.0),
                lifetime_days: float_at(table, col::LIFETIME_DAYS, row),
                month: text_at(table, col::MONTH, row),
                level_norm: text_at(table, col::LEVEL_NORM, row),
                calls_cnt: int_at(table, col::CALLS_CNT, row).unwrap_or(0),
                has_call: bool_at(table, col::HAS_CALL, row).unwrap_or(false),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnData};

    #[test]
    fn test_dataset_parse_is_case_insensitive() {
        assert_eq!(Dataset::parse(" deals "), Some(Dataset::Deals));
        assert_eq!(Dataset::parse("leads"), None);
    }

    #[test]
    fn test_deals_from_table_skips_rows_without_id_and_defaults_flags() {
        let mut table = Table::new("Deals");
        table.set_column(Column::new(
            col::ID,
            ColumnData::Text(vec![Some("1".into()), None]),
        ));
        table.set_column(Column::new(
            col::CITY,
            ColumnData::Text(vec![Some("-".into()), Some("Berlin".into())]),
        ));

        let deals = deals_from_table(&table);
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].id, "1");
        assert!(!deals[0].is_paid);
        assert_eq!(deals[0].known_city(), None);
    }
}
