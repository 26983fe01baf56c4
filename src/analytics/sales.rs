//! Sales team performance per deal owner.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{safe_div, stats};
use crate::constants::UNKNOWN;
use crate::domain::Deal;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OwnerMetrics {
    pub owner: String,
    pub n_deals: u64,
    pub n_processed: u64,
    pub n_closed: u64,
    pub n_paid: u64,
    pub n_lost: u64,
    pub revenue_won: f64,
    pub calls_cnt_total: i64,
    pub n_processed_with_calls: u64,
    pub avg_lead_to_first_call_hours: Option<f64>,
    pub cr_deals_to_paid: f64,
    pub cr_processed_to_paid: f64,
    pub revenue_per_paid: f64,
    pub revenue_per_deal: f64,
    pub calls_cnt_per_processed: f64,
    pub calls_coverage: f64,
    pub lost_rate_by_closed: f64,
    pub lost_rate_by_all: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LostReasonShare {
    pub owner: String,
    pub lost_reason: String,
    pub n_lost: u64,
    pub n_lost_total_owner: u64,
    pub share_owner_lost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesReport {
    pub months: Vec<String>,
    pub owners: Vec<OwnerMetrics>,
    pub lost_reasons: Vec<LostReasonShare>,
}

/// A deal counts as processed once it is closed or has a call after creation
pub fn is_processed(deal: &Deal) -> bool {
    deal.is_closed || deal.has_call
}

fn owner_of(deal: &Deal) -> String {
    deal.owner.clone().unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn owner_metrics(deals: &[&Deal]) -> Vec<OwnerMetrics> {
    let mut groups: BTreeMap<String, (OwnerMetrics, Vec<f64>)> = BTreeMap::new();
    for deal in deals {
        let owner = owner_of(deal);
        let (m, sla) = groups.entry(owner.clone()).or_insert_with(|| {
            (
                OwnerMetrics {
                    owner,
                    ..Default::default()
                },
                Vec::new(),
            )
        });
        let processed = is_processed(deal);
        m.n_deals += 1;
        m.n_processed += processed as u64;
        m.n_closed += deal.is_closed as u64;
        m.n_paid += deal.is_paid as u64;
        m.n_lost += deal.is_lost as u64;
        m.revenue_won += deal.revenue;
        m.calls_cnt_total += deal.calls_cnt;
        m.n_processed_with_calls += deal.has_call as u64;
        sla.extend(deal.sla_hours);
    }

    groups
        .into_values()
        .map(|(mut m, sla)| {
            let deals = m.n_deals as f64;
            let processed = m.n_processed as f64;
            let paid = m.n_paid as f64;
            m.avg_lead_to_first_call_hours = stats::mean(&sla);
            m.cr_deals_to_paid = safe_div(paid, deals);
            m.cr_processed_to_paid = safe_div(paid, processed);
            m.revenue_per_paid = safe_div(m.revenue_won, paid);
            m.revenue_per_deal = safe_div(m.revenue_won, deals);
            m.calls_cnt_per_processed = safe_div(m.calls_cnt_total as f64, processed);
            m.calls_coverage = safe_div(m.n_processed_with_calls as f64, processed);
            m.lost_rate_by_closed = safe_div(m.n_lost as f64, processed);
            m.lost_rate_by_all = safe_div(m.n_lost as f64, deals);
            m
        })
        .collect()
}

/// Lost deals per owner and reason with the reason's share of the owner's
/// losses.
pub fn lost_reasons_by_owner(deals: &[&Deal]) -> Vec<LostReasonShare> {
    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    for deal in deals.iter().filter(|d| d.is_lost) {
        let owner = owner_of(deal);
        let reason = deal.lost_reason.clone().unwrap_or_else(|| UNKNOWN.to_string());
        *counts.entry((owner.clone(), reason)).or_default() += 1;
        *totals.entry(owner).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((owner, lost_reason), n_lost)| {
            let n_lost_total_owner = totals.get(&owner).copied().unwrap_or(0);
            LostReasonShare {
                share_owner_lost: safe_div(n_lost as f64, n_lost_total_owner as f64),
                owner,
                lost_reason,
                n_lost,
                n_lost_total_owner,
            }
        })
        .collect()
}

/// Owner tables, optionally for one month (`YYYY-MM`).
pub fn analyze(deals: &[Deal], month: Option<&str>) -> SalesReport {
    let filtered: Vec<&Deal> = deals
        .iter()
        .filter(|d| month.map_or(true, |m| d.month.as_deref() == Some(m)))
        .collect();
    SalesReport {
        months: super::deal_months(deals),
        owners: owner_metrics(&filtered),
        lost_reasons: lost_reasons_by_owner(&filtered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{deal, lost_deal, paid_deal};

    fn owned(mut d: Deal, owner: &str) -> Deal {
        d.owner = Some(owner.to_string());
        d
    }

    #[test]
    fn test_owner_metrics_rates() {
        let mut with_call = owned(deal("3"), "Ann");
        with_call.has_call = true;
        with_call.calls_cnt = 3;
        with_call.sla_hours = Some(4.0);
        let mut paid = owned(paid_deal("1", 1000.0), "Ann");
        paid.sla_hours = Some(2.0);
        let deals = vec![
            paid,
            owned(lost_deal("2"), "Ann"),
            with_call,
            owned(deal("4"), "Ann"),
        ];

        let report = analyze(&deals, None);
        let ann = &report.owners[0];

        assert_eq!(ann.n_deals, 4);
        assert_eq!(ann.n_processed, 3);
        assert_eq!(ann.n_paid, 1);
        assert_eq!(ann.revenue_won, 1000.0);
        assert_eq!(ann.calls_cnt_total, 3);
        assert_eq!(ann.calls_cnt_per_processed, 1.0);
        assert_eq!(ann.avg_lead_to_first_call_hours, Some(3.0));
        assert_eq!(ann.cr_deals_to_paid, 0.25);
        assert_eq!(ann.lost_rate_by_all, 0.25);
    }

    #[test]
    fn test_lost_reason_shares() {
        let mut a = owned(lost_deal("1"), "Bob");
        a.lost_reason = Some("price".to_string());
        let mut b = owned(lost_deal("2"), "Bob");
        b.lost_reason = Some("price".to_string());
        let c = owned(lost_deal("3"), "Bob");
        let deals = vec![a, b, c];

        let report = analyze(&deals, None);
        assert_eq!(report.lost_reasons.len(), 2);
        let price = report.lost_reasons.iter().find(|r| r.lost_reason == "price").unwrap();
        assert_eq!(price.n_lost_total_owner, 3);
        assert!((price.share_owner_lost - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_month_filter() {
        let mut jan = deal("1");
        jan.month = Some("2024-01".to_string());
        let mut feb = deal("2");
        feb.month = Some("2024-02".to_string());
        let report = analyze(&[jan, feb], Some("2024-02"));

        assert_eq!(report.months, vec!["2024-01", "2024-02"]);
        assert_eq!(report.owners[0].n_deals, 1);
        assert_eq!(report.owners[0].owner, UNKNOWN);
    }
}
