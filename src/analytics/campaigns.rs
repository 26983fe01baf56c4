//! Advertising efficiency per campaign, source and ad group, and the overall
//! Impressions → Clicks → Leads → Paid funnel.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{safe_div, stats::round_to};
use crate::domain::{Deal, SpendRow};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ChannelMetrics {
    /// Grouping values, e.g. `[campaign]` or `[campaign, adgroup]`
    pub key: Vec<String>,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub leads: u64,
    pub paid: u64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cr: f64,
    pub cpl: f64,
    pub cpa: f64,
    pub roas: f64,
    pub click_to_lead: f64,
    pub lead_to_paid: f64,
    pub full_conversion: f64,
    pub avg_payment: f64,
}

impl ChannelMetrics {
    fn finish(mut self) -> Self {
        let leads = self.leads as f64;
        let paid = self.paid as f64;
        self.ctr = safe_div(self.clicks, self.impressions);
        self.cpc = safe_div(self.spend, self.clicks);
        self.cr = safe_div(paid, leads);
        self.cpl = safe_div(self.spend, leads);
        self.cpa = safe_div(self.spend, paid);
        self.roas = safe_div(self.revenue, self.spend);
        self.click_to_lead = safe_div(leads, self.clicks);
        self.lead_to_paid = safe_div(paid, leads);
        self.full_conversion = safe_div(paid, self.impressions);
        self.avg_payment = safe_div(self.revenue, paid);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunnelStep {
    pub stage: &'static str,
    pub count: f64,
    /// Conversion into the next step in percent; `None` for the last step
    pub next_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignFilter {
    pub source: Option<String>,
    pub campaign: Option<String>,
    pub adgroup: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub funnel: Vec<FunnelStep>,
    pub by_campaign: Vec<ChannelMetrics>,
    pub by_source: Vec<ChannelMetrics>,
    pub by_adgroup: Vec<ChannelMetrics>,
    pub sources: Vec<String>,
    pub campaigns: Vec<String>,
    pub adgroups: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Dim {
    Source,
    Campaign,
    AdGroup,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn deal_dim(deal: &Deal, dim: Dim) -> String {
    match dim {
        Dim::Source => text(&deal.source),
        Dim::Campaign => text(&deal.campaign),
        Dim::AdGroup => text(&deal.adgroup),
    }
}

fn spend_dim(row: &SpendRow, dim: Dim) -> String {
    match dim {
        Dim::Source => text(&row.source),
        Dim::Campaign => text(&row.campaign),
        Dim::AdGroup => text(&row.adgroup),
    }
}

/// Outer join of spend totals and deal outcomes on the grouping key.
fn build_metrics(deals: &[&Deal], spend: &[&SpendRow], dims: &[Dim]) -> Vec<ChannelMetrics> {
    let mut groups: BTreeMap<Vec<String>, ChannelMetrics> = BTreeMap::new();
    for row in spend {
        let key: Vec<String> = dims.iter().map(|d| spend_dim(row, *d)).collect();
        let entry = groups.entry(key.clone()).or_insert_with(|| ChannelMetrics {
            key,
            ..Default::default()
        });
        entry.impressions += row.impressions.unwrap_or(0) as f64;
        entry.clicks += row.clicks.unwrap_or(0) as f64;
        entry.spend += row.spend.unwrap_or(0.0);
    }
    for deal in deals {
        let key: Vec<String> = dims.iter().map(|d| deal_dim(deal, *d)).collect();
        let entry = groups.entry(key.clone()).or_insert_with(|| ChannelMetrics {
            key,
            ..Default::default()
        });
        entry.leads += 1;
        if deal.is_paid {
            entry.paid += 1;
            entry.revenue += deal.offer_total_amount.unwrap_or(0.0);
        }
    }
    groups.into_values().map(ChannelMetrics::finish).collect()
}

pub fn funnel(deals: &[&Deal], spend: &[&SpendRow]) -> Vec<FunnelStep> {
    let impressions: f64 = spend.iter().map(|r| r.impressions.unwrap_or(0) as f64).sum();
    let clicks: f64 = spend.iter().map(|r| r.clicks.unwrap_or(0) as f64).sum();
    let leads = deals.len() as f64;
    let paid = deals.iter().filter(|d| d.is_paid).count() as f64;
    let pct = |num: f64, den: f64| Some(round_to(safe_div(num, den) * 100.0, 3));
    vec![
        FunnelStep { stage: "Impressions", count: impressions, next_pct: pct(clicks, impressions) },
        FunnelStep { stage: "Clicks", count: clicks, next_pct: pct(leads, clicks) },
        FunnelStep { stage: "Leads", count: leads, next_pct: pct(paid, leads) },
        FunnelStep { stage: "Paid", count: paid, next_pct: None },
    ]
}

fn options(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut v: Vec<String> = values.filter(|s| !s.is_empty()).collect();
    v.sort();
    v.dedup();
    v
}

/// Metrics for the current filter. Campaign and ad group tables only use
/// deals attributed to a campaign.
pub fn analyze(deals: &[Deal], spend: &[SpendRow], filter: &CampaignFilter) -> CampaignReport {
    let matches = |value: String, wanted: &Option<String>| wanted.as_ref().map_or(true, |w| value == *w);
    let deals_f: Vec<&Deal> = deals
        .iter()
        .filter(|d| {
            matches(deal_dim(d, Dim::Source), &filter.source)
                && matches(deal_dim(d, Dim::Campaign), &filter.campaign)
                && matches(deal_dim(d, Dim::AdGroup), &filter.adgroup)
        })
        .collect();
    let spend_f: Vec<&SpendRow> = spend
        .iter()
        .filter(|r| {
            matches(spend_dim(r, Dim::Source), &filter.source)
                && matches(spend_dim(r, Dim::Campaign), &filter.campaign)
                && matches(spend_dim(r, Dim::AdGroup), &filter.adgroup)
        })
        .collect();
    let with_campaign: Vec<&Deal> = deals_f
        .iter()
        .copied()
        .filter(|d| !deal_dim(d, Dim::Campaign).is_empty())
        .collect();

    CampaignReport {
        funnel: funnel(&deals_f, &spend_f),
        by_campaign: build_metrics(&with_campaign, &spend_f, &[Dim::Campaign]),
        by_source: build_metrics(&deals_f, &spend_f, &[Dim::Source]),
        by_adgroup: build_metrics(&with_campaign, &spend_f, &[Dim::Campaign, Dim::AdGroup]),
        sources: options(
            spend
                .iter()
                .map(|r| spend_dim(r, Dim::Source))
                .chain(deals.iter().map(|d| deal_dim(d, Dim::Source))),
        ),
        campaigns: options(spend.iter().map(|r| spend_dim(r, Dim::Campaign))),
        adgroups: options(spend.iter().map(|r| spend_dim(r, Dim::AdGroup))),
    }
}
