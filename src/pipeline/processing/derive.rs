//! Computed deal fields added to the cleaned Deals table.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

use super::cleaning::put;
use super::vocab::normalize_level;
use crate::constants as col;
use crate::table::{ColumnData, Table};

pub fn is_paid_stage(stage: Option<&str>) -> bool {
    stage
        .map(|s| s.to_lowercase().contains("payment done"))
        .unwrap_or(false)
}

pub fn is_lost_stage(stage: Option<&str>) -> bool {
    !is_paid_stage(stage) && stage.map(|s| s.to_lowercase().contains("lost")).unwrap_or(false)
}

/// Days between creation and closing; `None` when either is missing or the
/// deal closes before it was created.
pub fn lifetime_days(created: Option<NaiveDateTime>, closing: Option<NaiveDateTime>) -> Option<f64> {
    let span = closing? - created?;
    let days = span.num_seconds() as f64 / 86_400.0;
    (days >= 0.0).then_some(days)
}

pub fn month_of(created: Option<NaiveDateTime>) -> Option<String> {
    created.map(|dt| dt.format("%Y-%m").to_string())
}

/// Start times of calls that count as contact: positive duration and a
/// known start, grouped by contact id and sorted.
fn valid_calls_by_contact(calls: &Table) -> HashMap<String, Vec<NaiveDateTime>> {
    let mut by_contact: HashMap<String, Vec<NaiveDateTime>> = HashMap::new();
    let (Some(contacts), Some(starts)) =
        (calls.text(col::CONTACT_ID), calls.datetime(col::CALL_START_TIME))
    else {
        return by_contact;
    };
    let durations = calls.int(col::CALL_DURATION);

    for row in 0..calls.num_rows() {
        let duration = durations.and_then(|d| d[row]).unwrap_or(0);
        if duration <= 0 {
            continue;
        }
        if let (Some(contact), Some(start)) = (&contacts[row], starts[row]) {
            by_contact.entry(contact.clone()).or_default().push(start);
        }
    }
    for starts in by_contact.values_mut() {
        starts.sort();
    }
    by_contact
}

/// Calls at or after deal creation: (count, first call time)
fn calls_after(
    calls: Option<&Vec<NaiveDateTime>>,
    created: Option<NaiveDateTime>,
) -> (i64, Option<NaiveDateTime>) {
    let (Some(calls), Some(created)) = (calls, created) else {
        return (0, None);
    };
    let idx = calls.partition_point(|t| *t < created);
    let after = &calls[idx..];
    (after.len() as i64, after.first().copied())
}

/// Add every derived column to a cleaned Deals table. Returns notes for the
/// cleaning summary.
pub fn add_derived_fields(deals: &mut Table, calls: Option<&Table>) -> Vec<String> {
    let rows = deals.num_rows();
    let empty_text: Vec<Option<String>> = vec![None; rows];
    let empty_dt: Vec<Option<NaiveDateTime>> = vec![None; rows];
    let empty_f: Vec<Option<f64>> = vec![None; rows];

    let stage = deals.text(col::STAGE).unwrap_or(&empty_text).to_vec();
    let created = deals.datetime(col::CREATED_TIME).unwrap_or(&empty_dt).to_vec();
    let closing = deals.datetime(col::CLOSING_DATE).unwrap_or(&empty_dt).to_vec();
    let offer = deals.float(col::OFFER_TOTAL_AMOUNT).unwrap_or(&empty_f).to_vec();
    let sla_export = deals.float(col::SLA).unwrap_or(&empty_f).to_vec();
    let contact = deals.text(col::CONTACT_NAME).unwrap_or(&empty_text).to_vec();
    let level = deals.text(col::LEVEL_OF_DEUTSCH).unwrap_or(&empty_text).to_vec();

    let by_contact = calls.map(valid_calls_by_contact).unwrap_or_default();

    let mut is_paid = Vec::with_capacity(rows);
    let mut is_lost = Vec::with_capacity(rows);
    let mut is_closed = Vec::with_capacity(rows);
    let mut revenue = Vec::with_capacity(rows);
    let mut sla_hours = Vec::with_capacity(rows);
    let mut lifetime = Vec::with_capacity(rows);
    let mut month = Vec::with_capacity(rows);
    let mut level_norm = Vec::with_capacity(rows);
    let mut calls_cnt = Vec::with_capacity(rows);
    let mut has_call = Vec::with_capacity(rows);
    let mut sla_from_calls = 0usize;

    for row in 0..rows {
        let paid = is_paid_stage(stage[row].as_deref());
        is_paid.push(Some(paid));
        is_lost.push(Some(is_lost_stage(stage[row].as_deref())));
        is_closed.push(Some(closing[row].is_some()));
        revenue.push(Some(if paid { offer[row].unwrap_or(0.0) } else { 0.0 }));
        lifetime.push(lifetime_days(created[row], closing[row]));
        month.push(month_of(created[row]));
        level_norm.push(normalize_level(level[row].as_deref()));

        let contact_calls = contact[row].as_ref().and_then(|c| by_contact.get(c));
        let (count, first) = calls_after(contact_calls, created[row]);
        calls_cnt.push(Some(count));
        has_call.push(Some(count > 0));

        let sla = sla_export[row].or_else(|| {
            let hours = (first? - created[row]?).num_seconds() as f64 / 3600.0;
            sla_from_calls += 1;
            Some(hours)
        });
        sla_hours.push(sla);
    }

    put(deals, col::IS_PAID, ColumnData::Bool(is_paid));
    put(deals, col::IS_LOST, ColumnData::Bool(is_lost));
    put(deals, col::IS_CLOSED, ColumnData::Bool(is_closed));
    put(deals, col::REVENUE, ColumnData::Float(revenue));
    put(deals, col::SLA_HOURS, ColumnData::Float(sla_hours));
    put(deals, col::LIFETIME_DAYS, ColumnData::Float(lifetime));
    put(deals, col::MONTH, ColumnData::Text(month));
    put(deals, col::LEVEL_NORM, ColumnData::Text(level_norm));
    put(deals, col::CALLS_CNT, ColumnData::Int(calls_cnt));
    put(deals, col::HAS_CALL, ColumnData::Bool(has_call));

    let mut notes = vec![format!(
        "Derived {}, {}, {}, {}, {}, {}, {}, {}, {} and {}",
        col::IS_PAID,
        col::IS_LOST,
        col::IS_CLOSED,
        col::REVENUE,
        col::SLA_HOURS,
        col::LIFETIME_DAYS,
        col::MONTH,
        col::LEVEL_NORM,
        col::CALLS_CNT,
        col::HAS_CALL
    )];
    if calls.is_none() {
        notes.push("Calls unavailable: call counts set to 0".to_string());
    }
    if sla_from_calls > 0 {
        notes.push(format!(
            "{sla_from_calls} deal(s) without SLA in the export use the time to the first call"
        ));
    }
    debug!(rows, sla_from_calls, "Derived deal fields");
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn dt(s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok()
    }

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_stage_flags() {
        assert!(is_paid_stage(Some("payment done")));
        assert!(!is_lost_stage(Some("payment done")));
        assert!(is_lost_stage(Some("lost")));
        assert!(!is_paid_stage(None));
        assert!(!is_lost_stage(Some("new lead")));
    }

    #[test]
    fn test_lifetime_days_rejects_negative_spans() {
        assert_eq!(lifetime_days(dt("2024-01-01 00:00"), dt("2024-01-03 12:00")), Some(2.5));
        assert_eq!(lifetime_days(dt("2024-01-03 00:00"), dt("2024-01-01 00:00")), None);
        assert_eq!(lifetime_days(None, dt("2024-01-01 00:00")), None);
    }

    #[test]
    fn test_add_derived_fields_uses_calls_after_creation() {
        let mut deals = Table::new("Deals");
        deals.set_column(Column::new(col::ID, ColumnData::Text(vec![s("d1"), s("d2")])));
        deals.set_column(Column::new(
            col::STAGE,
            ColumnData::Text(vec![s("payment done"), s("lost")]),
        ));
        deals.set_column(Column::new(
            col::CREATED_TIME,
            ColumnData::DateTime(vec![dt("2024-01-01 10:00"), dt("2024-01-02 10:00")]),
        ));
        deals.set_column(Column::new(
            col::OFFER_TOTAL_AMOUNT,
            ColumnData::Float(vec![Some(3000.0), Some(500.0)]),
        ));
        deals.set_column(Column::new(col::SLA, ColumnData::Float(vec![None, Some(0.5)])));
        deals.set_column(Column::new(col::CONTACT_NAME, ColumnData::Text(vec![s("c1"), s("c2")])));
        deals.set_column(Column::new(
            col::LEVEL_OF_DEUTSCH,
            ColumnData::Text(vec![s("в1"), None]),
        ));

        let mut calls = Table::new("Calls");
        calls.set_column(Column::new(
            col::CONTACT_ID,
            ColumnData::Text(vec![s("c1"), s("c1"), s("c1"), s("c2")]),
        ));
        calls.set_column(Column::new(
            col::CALL_START_TIME,
            ColumnData::DateTime(vec![
                dt("2023-12-31 10:00"),
                dt("2024-01-01 12:00"),
                dt("2024-01-01 13:00"),
                dt("2024-01-02 11:00"),
            ]),
        ));
        calls.set_column(Column::new(
            col::CALL_DURATION,
            ColumnData::Int(vec![Some(30), Some(60), Some(0), Some(45)]),
        ));

        let notes = add_derived_fields(&mut deals, Some(&calls));

        assert_eq!(deals.boolean(col::IS_PAID).unwrap(), &[Some(true), Some(false)]);
        assert_eq!(deals.boolean(col::IS_LOST).unwrap(), &[Some(false), Some(true)]);
        assert_eq!(deals.float(col::REVENUE).unwrap(), &[Some(3000.0), Some(0.0)]);
        assert_eq!(deals.int(col::CALLS_CNT).unwrap(), &[Some(1), Some(1)]);
        // First deal falls back to the first call, the second keeps the export value
        assert_eq!(deals.float(col::SLA_HOURS).unwrap(), &[Some(2.0), Some(0.5)]);
        assert_eq!(deals.text(col::MONTH).unwrap(), &[s("2024-01"), s("2024-01")]);
        assert_eq!(deals.text(col::LEVEL_NORM).unwrap(), &[s("B1"), None]);
        assert_eq!(deals.boolean(col::IS_CLOSED).unwrap(), &[Some(false), Some(false)]);
        assert!(notes.iter().any(|n| n.contains("time to the first call")));
    }
}
