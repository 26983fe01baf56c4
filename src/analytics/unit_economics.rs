//! Unit economics for the business and per product, growth scenarios and
//! A/B test sizing for the C1 hypothesis.
//!
//! Metrics that cannot be computed (empty denominators) are `None` rather
//! than zero, unlike the ratio helpers used elsewhere.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::constants::PRODUCTS;
use crate::domain::{Call, Contact, Deal, SpendRow};

/// Deals with a smaller offer are treated as test payments
const MIN_OFFER: f64 = 10.0;
const GROWTH_STEP: f64 = 0.10;
pub const TARGET_C1: f64 = 0.10;
pub const MAX_TEST_DAYS: u32 = 14;
pub const BUSINESS: &str = "Business";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnitMetrics {
    pub segment: String,
    pub ua: Option<f64>,
    pub b: f64,
    pub ac: f64,
    pub t: f64,
    pub revenue: f64,
    /// Percent
    pub c1: Option<f64>,
    pub cpa: Option<f64>,
    /// Only computed for the whole business
    pub cac: Option<f64>,
    pub aov: Option<f64>,
    pub apc: Option<f64>,
    pub cltv: Option<f64>,
    pub ltv: Option<f64>,
    pub cm: Option<f64>,
}

impl UnitMetrics {
    /// Named values in display order
    pub fn values(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("UA", self.ua),
            ("B", Some(self.b)),
            ("AC", Some(self.ac)),
            ("T", Some(self.t)),
            ("Revenue", Some(self.revenue)),
            ("C1", self.c1),
            ("CPA", self.cpa),
            ("CAC", self.cac),
            ("AOV", self.aov),
            ("APC", self.apc),
            ("CLTV", self.cltv),
            ("LTV", self.ltv),
            ("CM", self.cm),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lever {
    UA,
    C1,
    CPA,
    AOV,
    APC,
}

impl Lever {
    pub const ALL: [Lever; 5] = [Lever::UA, Lever::C1, Lever::CPA, Lever::AOV, Lever::APC];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lever::UA => "UA",
            Lever::C1 => "C1",
            Lever::CPA => "CPA",
            Lever::AOV => "AOV",
            Lever::APC => "APC",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GrowthScenario {
    pub segment: String,
    pub lever: Lever,
    pub cm_base: Option<f64>,
    pub cm_new: Option<f64>,
    pub cm_delta: Option<f64>,
    pub cm_delta_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperimentScope {
    pub segment: String,
    /// Current C1 as a fraction
    pub p_base: Option<f64>,
    pub target: f64,
    pub x_abs: Option<f64>,
    pub n_per_group: Option<f64>,
    pub ua_per_day: Option<f64>,
    pub n_available: Option<f64>,
    pub days_required: Option<f64>,
    pub min_ua_per_day: Option<f64>,
    pub fits_limit: bool,
    pub x_mde: Option<f64>,
    pub max_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HadiRow {
    pub part: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitEconomics {
    pub business: UnitMetrics,
    pub products: Vec<UnitMetrics>,
    pub growth: Vec<GrowthScenario>,
    pub experiments: Vec<ExperimentScope>,
}

fn ratio(num: f64, den: Option<f64>) -> Option<f64> {
    den.filter(|d| *d != 0.0 && d.is_finite()).map(|d| num / d)
}

fn nonzero(value: f64) -> Option<f64> {
    (value != 0.0).then_some(value)
}

/// Average payment (AOV_I) and revenue (R_I) of one paid deal under its
/// instalment terms.
pub fn deal_revenue(deal: &Deal) -> Option<(f64, f64)> {
    let months = deal.months_of_study?;
    let duration = deal.course_duration?;
    let total = deal.offer_total_amount?;
    let initial = deal.initial_amount_paid.unwrap_or(0.0);
    if months <= 0.0 || duration <= 0.0 {
        return None;
    }
    let aov_i = if total - initial > 0.0 && duration > 1.0 {
        let monthly_tail = (total - initial) / (duration - 1.0);
        (initial + (months - 1.0).max(0.0) * monthly_tail) / months
    } else {
        total / duration
    };
    Some((aov_i, aov_i * months))
}

/// Paid deals with a real offer amount
pub fn buyer_deals(deals: &[Deal]) -> Vec<&Deal> {
    deals
        .iter()
        .filter(|d| d.is_paid && d.offer_total_amount.unwrap_or(0.0) > MIN_OFFER)
        .collect()
}

fn unique<'a>(values: impl Iterator<Item = Option<&'a String>>) -> f64 {
    values.flatten().collect::<BTreeSet<_>>().len() as f64
}

/// Units: the largest distinct contact count seen across the tables.
pub fn units(
    deals: Option<&[Deal]>,
    contacts: Option<&[Contact]>,
    calls: Option<&[Call]>,
) -> Option<f64> {
    [
        deals.map(|d| unique(d.iter().map(|x| x.contact_id.as_ref()))),
        contacts.map(|c| unique(c.iter().map(|x| Some(&x.id)))),
        calls.map(|c| unique(c.iter().map(|x| x.contact_id.as_ref()))),
    ]
    .into_iter()
    .flatten()
    .reduce(f64::max)
}

fn segment_metrics(
    segment: &str,
    ua: Option<f64>,
    ac: f64,
    buyers: &[&Deal],
    with_cac: bool,
) -> UnitMetrics {
    let b = buyers.iter().map(|d| d.id.as_str()).collect::<BTreeSet<_>>().len() as f64;
    let t: f64 = buyers.iter().map(|d| d.months_of_study.unwrap_or(0.0)).sum();
    let revenue: f64 = buyers.iter().filter_map(|d| deal_revenue(d)).map(|(_, r)| r).sum();

    let c1 = ratio(b, ua);
    let cpa = ratio(ac, ua);
    let aov = ratio(revenue, nonzero(t));
    let apc = ratio(t, nonzero(b));
    let cltv = aov.zip(apc).map(|(a, p)| a * p);
    let ltv = cltv.zip(c1).map(|(c, r)| c * r);
    let cm = match (ua, ltv, cpa) {
        (Some(ua), Some(ltv), Some(cpa)) => Some(ua * (ltv - cpa)),
        _ => None,
    };
    UnitMetrics {
        segment: segment.to_string(),
        ua,
        b,
        ac,
        t,
        revenue,
        c1: c1.map(|c| c * 100.0),
        cpa,
        cac: if with_cac { ratio(ac, nonzero(b)) } else { None },
        aov,
        apc,
        cltv,
        ltv,
        cm,
    }
}

pub fn compute_cm(ua: f64, c1: f64, cpa: f64, aov: f64, apc: f64) -> f64 {
    ua * (aov * apc * c1 - cpa)
}

/// CM change when each lever moves 10 % in its favourable direction.
pub fn growth_scenarios(segments: &[&UnitMetrics]) -> Vec<GrowthScenario> {
    let mut rows = Vec::new();
    for m in segments {
        let inputs = (m.ua, m.c1.map(|c| c / 100.0), m.cpa, m.aov, m.apc);
        for lever in Lever::ALL {
            let cm_new = match inputs {
                (Some(ua), Some(c1), Some(cpa), Some(aov), Some(apc)) => {
                    let up = 1.0 + GROWTH_STEP;
                    let (ua, c1, cpa, aov, apc) = match lever {
                        Lever::UA => (ua * up, c1, cpa, aov, apc),
                        Lever::C1 => (ua, c1 * up, cpa, aov, apc),
                        Lever::CPA => (ua, c1, cpa * (1.0 - GROWTH_STEP), aov, apc),
                        Lever::AOV => (ua, c1, cpa, aov * up, apc),
                        Lever::APC => (ua, c1, cpa, aov, apc * up),
                    };
                    Some(compute_cm(ua, c1, cpa, aov, apc))
                }
                _ => None,
            };
            let cm_delta = cm_new.zip(m.cm).map(|(n, b)| n - b);
            let cm_delta_pct = cm_new
                .zip(m.cm.filter(|b| *b != 0.0))
                .map(|(n, b)| (n / b - 1.0) * 100.0);
            rows.push(GrowthScenario {
                segment: m.segment.clone(),
                lever,
                cm_base: m.cm,
                cm_new,
                cm_delta,
                cm_delta_pct,
            });
        }
    }
    rows
}

/// Distinct contacts per day over the span of deal creation dates.
pub fn ua_per_day<'a>(deals: impl IntoIterator<Item = &'a Deal>) -> Option<f64> {
    let mut contacts = BTreeSet::new();
    let mut days: Vec<NaiveDate> = Vec::new();
    for deal in deals {
        if let Some(c) = &deal.contact_id {
            contacts.insert(c.as_str());
        }
        if let Some(t) = deal.created_time {
            days.push(t.date());
        }
    }
    let first = days.iter().min()?;
    let last = days.iter().max()?;
    let span = (*last - *first).num_days() + 1;
    if contacts.is_empty() || span <= 0 {
        return None;
    }
    Some(contacts.len() as f64 / span as f64)
}

/// Sample size and duration for an A/B test lifting C1 to the target.
/// `n = 16·p(1−p)/x²` per group, with `x` the absolute lift.
pub fn experiment_scope(segment: &str, p_base: Option<f64>, ua_per_day: Option<f64>) -> ExperimentScope {
    let max_days = MAX_TEST_DAYS as f64;
    let x_abs = p_base.map(|p| TARGET_C1 - p);
    let ua_per_day = ua_per_day.filter(|u| *u > 0.0);
    let n_available = ua_per_day.map(|u| u * max_days);
    let x_mde = p_base
        .zip(n_available)
        .map(|(p, n)| (16.0 * p * (1.0 - p) / n).sqrt());

    let (n_per_group, days_required, min_ua_per_day) = match (p_base, x_abs) {
        (Some(p), Some(x)) if x > 0.0 => {
            let n = 16.0 * p * (1.0 - p) / (x * x);
            (Some(n), ua_per_day.map(|u| n / u), Some(n / max_days))
        }
        _ => (None, None, None),
    };
    ExperimentScope {
        segment: segment.to_string(),
        p_base,
        target: TARGET_C1,
        x_abs,
        n_per_group,
        ua_per_day,
        n_available,
        days_required,
        min_ua_per_day,
        fits_limit: days_required.is_some_and(|d| d <= max_days),
        x_mde,
        max_days: MAX_TEST_DAYS,
    }
}

/// The fixed HADI card for the C1 growth point.
pub fn hadi_rows() -> Vec<HadiRow> {
    vec![
        HadiRow {
            part: "H (hypothesis)",
            description: "If the time to first contact with a lead (SLA) drops to 24 hours through a \
                          handling rule, automatic CRM reminders and lead processing control, then \
                          conversion C1 (B / UA) grows from its current level to about 10 % (target).",
        },
        HadiRow {
            part: "A (action)",
            description: "Run an A/B test on new leads.\n\
                          A, control: the current lead handling process, unchanged.\n\
                          B, experiment:\n\
                          - automatic task for the manager to call within 24 hours\n\
                          - push reminders in the CRM\n\
                          - message templates and call scripts\n\
                          - handling time control and SLA alerts",
        },
        HadiRow {
            part: "D (data and metrics)",
            description: "Target unit metric: C1 = B / UA for groups A and B.\n\
                          Product metric: share of leads with SLA <= 24 hours (Deals: SLA).\n\
                          Also: stage-to-stage funnel conversion and the SLA distribution.\n\
                          The test uses:\n\
                          - the computed sample size n\n\
                          - the segment's current traffic (UA/day)\n\
                          - the minimum detectable effect x = target - p_base",
        },
        HadiRow {
            part: "I (interpretation)",
            description: "If C1 in B reaches 10 % and the difference between A and B exceeds the \
                          minimum detectable effect x for the segment, the hypothesis holds and the \
                          new process rolls out to all leads. If the lift is below x, keep the null \
                          hypothesis and formulate the next one.",
        },
    ]
}

/// Full unit economics over the cleaned tables. Missing tables count as
/// empty; the units estimate only considers tables that are present.
pub fn analyze(
    deals: Option<&[Deal]>,
    contacts: Option<&[Contact]>,
    calls: Option<&[Call]>,
    spend: Option<&[SpendRow]>,
) -> UnitEconomics {
    let all_deals = deals.unwrap_or_default();
    let ua = units(deals, contacts, calls);
    let ac: f64 = spend
        .unwrap_or_default()
        .iter()
        .filter_map(|s| s.spend)
        .sum();
    let buyers = buyer_deals(all_deals);

    let business = segment_metrics(BUSINESS, ua, ac, &buyers, true);
    let products: Vec<UnitMetrics> = PRODUCTS
        .iter()
        .map(|product| {
            let product_buyers: Vec<&Deal> = buyers
                .iter()
                .copied()
                .filter(|d| d.product.as_deref() == Some(*product))
                .collect();
            segment_metrics(product, ua, ac, &product_buyers, false)
        })
        .collect();

    let segments: Vec<&UnitMetrics> = std::iter::once(&business).chain(products.iter()).collect();
    let growth = growth_scenarios(&segments);

    let mut experiments = vec![experiment_scope(
        BUSINESS,
        business.c1.map(|c| c / 100.0),
        ua_per_day(all_deals),
    )];
    for m in &products {
        let product_deals = all_deals
            .iter()
            .filter(|d| d.product.as_deref() == Some(m.segment.as_str()));
        experiments.push(experiment_scope(
            &m.segment,
            m.c1.map(|c| c / 100.0),
            ua_per_day(product_deals),
        ));
    }

    UnitEconomics {
        business,
        products,
        growth,
        experiments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{deal, paid_deal};
    use chrono::NaiveDateTime;

    fn buyer(
        id: &str,
        contact: &str,
        product: &str,
        total: f64,
        initial: f64,
        duration: f64,
        months: f64,
    ) -> Deal {
        let mut d = paid_deal(id, total);
        d.contact_id = Some(contact.to_string());
        d.product = Some(product.to_string());
        d.initial_amount_paid = Some(initial);
        d.course_duration = Some(duration);
        d.months_of_study = Some(months);
        d
    }

    #[test]
    fn test_deal_revenue_with_instalments() {
        // 1000 upfront, 5000 left over 5 remaining months, 3 months studied
        let d = buyer("1", "c", "Web Developer", 6000.0, 1000.0, 6.0, 3.0);
        let (aov_i, r_i) = deal_revenue(&d).unwrap();
        assert!((aov_i - 1000.0).abs() < 1e-9);
        assert!((r_i - 3000.0).abs() < 1e-9);

        let one_off = buyer("2", "c", "Web Developer", 6000.0, 6000.0, 6.0, 6.0);
        assert_eq!(deal_revenue(&one_off), Some((1000.0, 6000.0)));

        let mut no_months = one_off.clone();
        no_months.months_of_study = Some(0.0);
        assert_eq!(deal_revenue(&no_months), None);
    }

    #[test]
    fn test_business_metrics() {
        let mut deals = vec![
            buyer("1", "c1", "Web Developer", 1200.0, 1200.0, 12.0, 12.0),
            buyer("2", "c2", "UX/UI Design", 600.0, 600.0, 6.0, 6.0),
        ];
        // Test payment below the threshold does not make a buyer
        deals.push(buyer("3", "c3", "Web Developer", 5.0, 5.0, 1.0, 1.0));
        for i in 4..=10 {
            let mut d = deal(&i.to_string());
            d.contact_id = Some(format!("c{i}"));
            deals.push(d);
        }
        let spend = vec![SpendRow {
            date: None,
            source: None,
            campaign: None,
            adgroup: None,
            ad: None,
            impressions: None,
            clicks: None,
            spend: Some(500.0),
        }];

        let ue = analyze(Some(&deals), None, None, Some(&spend));
        let m = &ue.business;
        assert_eq!(m.ua, Some(10.0));
        assert_eq!(m.b, 2.0);
        assert_eq!(m.t, 18.0);
        assert_eq!(m.revenue, 1800.0);
        assert_eq!(m.c1, Some(20.0));
        assert_eq!(m.cpa, Some(50.0));
        assert_eq!(m.cac, Some(250.0));
        assert_eq!(m.aov, Some(100.0));
        assert_eq!(m.apc, Some(9.0));
        assert_eq!(m.cltv, Some(900.0));
        assert_eq!(m.ltv, Some(180.0));
        assert_eq!(m.cm, Some(1300.0));

        let web = &ue.products[0];
        assert_eq!(web.segment, "Web Developer");
        assert_eq!(web.b, 1.0);
        assert_eq!(web.cac, None);
        // Marketing has no buyers: ratios on buyers are undefined
        assert_eq!(ue.products[1].apc, None);
        assert_eq!(ue.products[1].cm, None);

        assert_eq!(ue.growth.len(), 4 * Lever::ALL.len());
    }

    #[test]
    fn test_growth_scenarios_move_cm() {
        let base = UnitMetrics {
            segment: BUSINESS.to_string(),
            ua: Some(100.0),
            b: 10.0,
            ac: 1000.0,
            t: 20.0,
            revenue: 4000.0,
            c1: Some(10.0),
            cpa: Some(10.0),
            cac: None,
            aov: Some(200.0),
            apc: Some(2.0),
            cltv: Some(400.0),
            ltv: Some(40.0),
            cm: Some(3000.0),
        };
        let rows = growth_scenarios(&[&base]);
        let ua = &rows[0];
        assert_eq!(ua.lever, Lever::UA);
        assert!((ua.cm_new.unwrap() - 3300.0).abs() < 1e-6);
        assert!((ua.cm_delta_pct.unwrap() - 10.0).abs() < 1e-6);
        let cpa = rows.iter().find(|r| r.lever == Lever::CPA).unwrap();
        assert!((cpa.cm_delta.unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_experiment_scope_sizing() {
        let scope = experiment_scope(BUSINESS, Some(0.05), Some(100.0));
        let n = 16.0 * 0.05 * 0.95 / (0.05 * 0.05);
        assert!((scope.n_per_group.unwrap() - n).abs() < 1e-6);
        assert!((scope.days_required.unwrap() - n / 100.0).abs() < 1e-6);
        assert!(scope.fits_limit);
        assert_eq!(scope.n_available, Some(1400.0));

        let above_target = experiment_scope(BUSINESS, Some(0.2), Some(100.0));
        assert_eq!(above_target.n_per_group, None);
        assert!(!above_target.fits_limit);
    }

    #[test]
    fn test_ua_per_day_uses_creation_span() {
        let dt = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok();
        let mut a = deal("1");
        a.contact_id = Some("c1".to_string());
        a.created_time = dt("2024-01-01 10:00");
        let mut b = deal("2");
        b.contact_id = Some("c2".to_string());
        b.created_time = dt("2024-01-04 10:00");

        assert_eq!(ua_per_day([&a, &b]), Some(0.5));
        assert_eq!(ua_per_day(std::iter::empty::<&Deal>()), None);
    }
}
