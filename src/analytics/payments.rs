//! Deal outcomes per payment type, product and education type.

use serde::Serialize;
use std::collections::BTreeMap;

use super::safe_div;
use crate::constants::UNKNOWN;
use crate::domain::Deal;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PaymentSegment {
    pub payment_type: String,
    pub product: String,
    pub education_type: String,
    pub n_deals: u64,
    pub n_paid: u64,
    pub n_lost: u64,
    /// Sum of the offer amounts of every deal in the segment
    pub revenue_total: f64,
    pub cr_deals_to_paid: f64,
    pub lost_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub month: Option<String>,
    /// Empty keeps every product
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReport {
    pub months: Vec<String>,
    pub products: Vec<String>,
    pub segments: Vec<PaymentSegment>,
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn segments(deals: &[&Deal]) -> Vec<PaymentSegment> {
    let mut groups: BTreeMap<(String, String, String), PaymentSegment> = BTreeMap::new();
    for deal in deals {
        let key = (
            or_unknown(&deal.payment_type),
            or_unknown(&deal.product),
            or_unknown(&deal.education_type),
        );
        let seg = groups.entry(key.clone()).or_insert_with(|| PaymentSegment {
            payment_type: key.0,
            product: key.1,
            education_type: key.2,
            ..Default::default()
        });
        seg.n_deals += 1;
        seg.n_paid += deal.is_paid as u64;
        seg.n_lost += deal.is_lost as u64;
        seg.revenue_total += deal.offer_total_amount.unwrap_or(0.0);
    }
    groups
        .into_values()
        .map(|mut seg| {
            seg.cr_deals_to_paid = safe_div(seg.n_paid as f64, seg.n_deals as f64);
            seg.lost_rate = safe_div(seg.n_lost as f64, seg.n_deals as f64);
            seg
        })
        .collect()
}

pub fn analyze(deals: &[Deal], filter: &PaymentFilter) -> PaymentReport {
    let filtered: Vec<&Deal> = deals
        .iter()
        .filter(|d| {
            filter
                .month
                .as_deref()
                .map_or(true, |m| d.month.as_deref() == Some(m))
        })
        .filter(|d| {
            filter.products.is_empty()
                || d.product
                    .as_ref()
                    .is_some_and(|p| filter.products.contains(p))
        })
        .collect();

    let mut products: Vec<String> = deals.iter().filter_map(|d| d.product.clone()).collect();
    products.sort();
    products.dedup();

    PaymentReport {
        months: super::deal_months(deals),
        products,
        segments: segments(&filtered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{deal, lost_deal, paid_deal};

    fn segment(mut d: Deal, payment: &str, product: &str) -> Deal {
        d.payment_type = Some(payment.to_string());
        d.product = Some(product.to_string());
        d.education_type = Some("Morning".to_string());
        d
    }

    #[test]
    fn test_segments_group_and_rate() {
        let mut open = segment(deal("3"), "one payment", "Web Developer");
        open.offer_total_amount = Some(500.0);
        let deals = vec![
            segment(paid_deal("1", 2000.0), "one payment", "Web Developer"),
            segment(lost_deal("2"), "one payment", "Web Developer"),
            open,
            segment(deal("4"), "recurring payments", "UX/UI Design"),
        ];

        let report = analyze(&deals, &PaymentFilter::default());
        assert_eq!(report.segments.len(), 2);
        let web = &report.segments[0];
        assert_eq!(web.n_deals, 3);
        assert_eq!(web.n_paid, 1);
        assert_eq!(web.n_lost, 1);
        assert_eq!(web.revenue_total, 2500.0);
        assert!((web.cr_deals_to_paid - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.products, vec!["UX/UI Design", "Web Developer"]);
    }

    #[test]
    fn test_product_filter() {
        let deals = vec![
            segment(deal("1"), "one payment", "Web Developer"),
            segment(deal("2"), "one payment", "UX/UI Design"),
        ];
        let filter = PaymentFilter {
            month: None,
            products: vec!["UX/UI Design".to_string()],
        };
        let report = analyze(&deals, &filter);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.segments[0].product, "UX/UI Design");
    }
}
