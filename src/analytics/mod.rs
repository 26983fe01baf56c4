//! Metrics computed from the cleaned tables.
//!
//! Loading happens once through [`CleanData::load`]; every analysis after
//! that is a pure function over typed rows, so the dashboard and the
//! markdown reports share the same numbers.

pub mod campaigns;
pub mod descriptive;
pub mod geo;
pub mod metric_tree;
pub mod payments;
pub mod sales;
pub mod stats;
pub mod timeseries;
pub mod unit_economics;

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::{
    calls_from_table, contacts_from_table, deals_from_table, spend_from_table, Call, Contact,
    Dataset, Deal, SpendRow,
};
use crate::pipeline::storage::Store;
use crate::table::Table;

/// Ratio that is 0 when the denominator is 0
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        0.0
    } else {
        num / den
    }
}

/// The cleaned tables that exist on disk
#[derive(Debug, Clone, Default)]
pub struct CleanData {
    tables: BTreeMap<Dataset, Table>,
}

impl CleanData {
    pub fn load(store: &Store) -> Self {
        let tables: BTreeMap<Dataset, Table> = Dataset::ALL
            .into_iter()
            .filter_map(|ds| store.load_optional(ds).map(|t| (ds, t)))
            .collect();
        debug!(
            root = %store.root().display(),
            loaded = tables.len(),
            "Loaded cleaned tables"
        );
        Self { tables }
    }

    pub fn from_tables(tables: impl IntoIterator<Item = (Dataset, Table)>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn table(&self, dataset: Dataset) -> Option<&Table> {
        self.tables.get(&dataset)
    }

    pub fn has(&self, dataset: Dataset) -> bool {
        self.tables.contains_key(&dataset)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.table(Dataset::Contacts).map(contacts_from_table).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.table(Dataset::Calls).map(calls_from_table).unwrap_or_default()
    }

    pub fn deals(&self) -> Vec<Deal> {
        self.table(Dataset::Deals).map(deals_from_table).unwrap_or_default()
    }

    pub fn spend(&self) -> Vec<SpendRow> {
        self.table(Dataset::Spend).map(spend_from_table).unwrap_or_default()
    }
}

/// Distinct months (`YYYY-MM`) of the deals, sorted, for month filters.
pub fn deal_months(deals: &[Deal]) -> Vec<String> {
    let mut months: Vec<String> = deals.iter().filter_map(|d| d.month.clone()).collect();
    months.sort();
    months.dedup();
    months
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::{Call, Deal, SpendRow};

    pub fn deal(id: &str) -> Deal {
        Deal {
            id: id.to_string(),
            owner: None,
            contact_id: None,
            created_time: None,
            closing_date: None,
            stage: None,
            quality: None,
            lost_reason: None,
            source: None,
            campaign: None,
            adgroup: None,
            payment_type: None,
            product: None,
            education_type: None,
            city: None,
            level_raw: None,
            course_duration: None,
            months_of_study: None,
            initial_amount_paid: None,
            offer_total_amount: None,
            sla_hours: None,
            is_paid: false,
            is_lost: false,
            is_closed: false,
            revenue: 0.0,
            lifetime_days: None,
            month: None,
            level_norm: None,
            calls_cnt: 0,
            has_call: false,
        }
    }

    pub fn paid_deal(id: &str, amount: f64) -> Deal {
        Deal {
            stage: Some("payment done".to_string()),
            is_paid: true,
            is_closed: true,
            offer_total_amount: Some(amount),
            revenue: amount,
            ..deal(id)
        }
    }

    pub fn lost_deal(id: &str) -> Deal {
        Deal {
            stage: Some("lost".to_string()),
            is_lost: true,
            is_closed: true,
            ..deal(id)
        }
    }

    pub fn call(id: &str, contact: &str, duration: i64) -> Call {
        Call {
            id: id.to_string(),
            contact_id: Some(contact.to_string()),
            start_time: None,
            owner: None,
            call_type: None,
            duration_secs: Some(duration),
            status: None,
            outgoing_status: None,
            scheduled_in_crm: false,
        }
    }

    pub fn spend(source: &str, campaign: &str, impressions: i64, clicks: i64, spend: f64) -> SpendRow {
        SpendRow {
            date: None,
            source: Some(source.to_string()),
            campaign: Some(campaign.to_string()),
            adgroup: None,
            ad: None,
            impressions: Some(impressions),
            clicks: Some(clicks),
            spend: Some(spend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div_returns_zero_for_zero_denominator() {
        assert_eq!(safe_div(5.0, 0.0), 0.0);
        assert_eq!(safe_div(5.0, 2.0), 2.5);
    }

    #[test]
    fn test_load_skips_missing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let data = CleanData::load(&Store::new(dir.path()));
        assert!(data.is_empty());
        assert!(data.deals().is_empty());
    }
}
