//! Daily deal and call activity, closings and time to close.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::stats;
use crate::domain::{Call, Deal};

/// Upper bounds (days) of the time-to-close bins, first bin includes 0
const TTC_BOUNDS: [f64; 7] = [3.0, 7.0, 14.0, 30.0, 60.0, 120.0, 365.0];
const TTC_LABELS: [&str; 7] = ["0-3", "4-7", "8-14", "15-30", "31-60", "61-120", "121-365"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub deals_created: u64,
    pub calls_total: u64,
    /// `None` on days without calls
    pub deal_rate_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClosedPoint {
    pub date: NaiveDate,
    pub deals_closed: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TtcBin {
    pub label: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallDurationStats {
    pub n: usize,
    pub median_sec: f64,
    pub p90_sec: f64,
    pub median_min: f64,
    pub p90_min: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Period {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub deals_sum: u64,
    pub calls_sum: u64,
    pub conv_overall: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeSeries {
    pub months: Vec<String>,
    pub daily: Vec<DailyPoint>,
    pub closed: Vec<ClosedPoint>,
    pub ttc_days: Vec<f64>,
    pub ttc_bins: Vec<TtcBin>,
    pub call_duration: Option<CallDurationStats>,
    pub period: Option<Period>,
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Every day from `from` to `to` inclusive.
fn day_range(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(from), move |d| {
        d.checked_add_days(Days::new(1)).filter(|next| *next <= to)
    })
}

/// Deals created and calls made per day over a continuous range, zeros
/// filling days without activity.
pub fn daily_series(deals: &[Deal], calls: &[Call]) -> Vec<DailyPoint> {
    let mut created: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for date in deals.iter().filter_map(|d| d.created_time).map(|t| t.date()) {
        *created.entry(date).or_default() += 1;
    }
    let mut called: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for date in calls.iter().filter_map(|c| c.start_time).map(|t| t.date()) {
        *called.entry(date).or_default() += 1;
    }

    let bounds = created.keys().chain(called.keys());
    let (Some(from), Some(to)) = (bounds.clone().min(), bounds.max()) else {
        return Vec::new();
    };

    day_range(*from, *to)
        .map(|date| {
            let deals_created = created.get(&date).copied().unwrap_or(0);
            let calls_total = called.get(&date).copied().unwrap_or(0);
            DailyPoint {
                date,
                deals_created,
                calls_total,
                deal_rate_pct: (calls_total > 0)
                    .then(|| deals_created as f64 / calls_total as f64 * 100.0),
            }
        })
        .collect()
}

/// Closings per day. Deals closing before they were created are dropped,
/// as are days after `upper`.
pub fn closed_daily(deals: &[Deal], upper: Option<NaiveDate>) -> Vec<ClosedPoint> {
    let mut closed: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for deal in deals {
        if let (Some(created), Some(closing)) = (deal.created_time, deal.closing_date) {
            if closing >= created {
                *closed.entry(closing.date()).or_default() += 1;
            }
        }
    }
    let (Some(from), Some(to)) = (closed.keys().next(), closed.keys().next_back()) else {
        return Vec::new();
    };
    day_range(*from, *to)
        .filter(|date| upper.map_or(true, |u| *date <= u))
        .map(|date| ClosedPoint {
            date,
            deals_closed: closed.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Valid time-to-close values in days (closing minus creation, >= 0).
pub fn ttc_days(deals: &[Deal]) -> Vec<f64> {
    deals
        .iter()
        .filter_map(|d| {
            let days = (d.closing_date? - d.created_time?).num_seconds() as f64 / 86_400.0;
            (days >= 0.0).then_some(days)
        })
        .collect()
}

/// Counts per time-to-close bin; values past the last bin are not counted.
pub fn ttc_histogram(days: &[f64]) -> Vec<TtcBin> {
    let mut counts = [0u64; TTC_BOUNDS.len()];
    for value in days {
        if let Some(idx) = TTC_BOUNDS.iter().position(|upper| *value <= *upper) {
            if *value > -0.001 {
                counts[idx] += 1;
            }
        }
    }
    TTC_LABELS
        .iter()
        .zip(counts)
        .map(|(label, count)| TtcBin { label, count })
        .collect()
}

/// Median and 90th percentile of call duration over calls with a known,
/// non-negative duration.
pub fn call_duration_stats(calls: &[Call]) -> Option<CallDurationStats> {
    let durations: Vec<f64> = calls
        .iter()
        .filter_map(|c| c.duration_secs)
        .filter(|d| *d >= 0)
        .map(|d| d as f64)
        .collect();
    let median_sec = stats::median(&durations)?;
    let p90_sec = stats::quantile(&durations, 0.9)?;
    Some(CallDurationStats {
        n: durations.len(),
        median_sec,
        p90_sec,
        median_min: median_sec / 60.0,
        p90_min: p90_sec / 60.0,
    })
}

pub fn overall_period(daily: &[DailyPoint]) -> Option<Period> {
    let date_from = daily.iter().map(|p| p.date).min()?;
    let date_to = daily.iter().map(|p| p.date).max()?;
    let deals_sum: u64 = daily.iter().map(|p| p.deals_created).sum();
    let calls_sum: u64 = daily.iter().map(|p| p.calls_total).sum();
    Some(Period {
        date_from,
        date_to,
        deals_sum,
        calls_sum,
        conv_overall: (calls_sum > 0).then(|| deals_sum as f64 / calls_sum as f64 * 100.0),
    })
}

/// Build every series, optionally restricted to a set of months
/// (`YYYY-MM`). An empty selection keeps the whole period.
pub fn build(deals: &[Deal], calls: &[Call], months: &[String]) -> TimeSeries {
    let daily_all = daily_series(deals, calls);
    let all_months: Vec<String> = daily_all
        .iter()
        .map(|p| month_key(p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let selected: BTreeSet<&str> = months.iter().map(String::as_str).collect();
    let in_selection = |date: NaiveDate| selected.is_empty() || selected.contains(month_key(date).as_str());

    let daily: Vec<DailyPoint> = daily_all.into_iter().filter(|p| in_selection(p.date)).collect();
    let deals_f: Vec<Deal> = deals
        .iter()
        .filter(|d| d.created_time.map_or(selected.is_empty(), |t| in_selection(t.date())))
        .cloned()
        .collect();
    let calls_f: Vec<Call> = calls
        .iter()
        .filter(|c| c.start_time.map_or(selected.is_empty(), |t| in_selection(t.date())))
        .cloned()
        .collect();

    let upper = daily.last().map(|p| p.date);
    let closed = closed_daily(&deals_f, upper);
    let ttc = ttc_days(&deals_f);
    TimeSeries {
        months: all_months,
        period: overall_period(&daily),
        daily,
        closed,
        ttc_bins: ttc_histogram(&ttc),
        ttc_days: ttc,
        call_duration: call_duration_stats(&calls_f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures;
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok()
    }

    fn deal(created: &str, closing: Option<&str>) -> Deal {
        let mut d = fixtures::deal("d");
        d.created_time = dt(created);
        d.closing_date = closing.and_then(dt);
        d
    }

    fn call(start: &str, duration: i64) -> Call {
        Call {
            id: start.to_string(),
            contact_id: None,
            start_time: dt(start),
            owner: None,
            call_type: None,
            duration_secs: Some(duration),
            status: None,
            outgoing_status: None,
            scheduled_in_crm: false,
        }
    }

    #[test]
    fn test_daily_series_fills_gaps() {
        let deals = vec![deal("2024-01-01 10:00", None), deal("2024-01-03 10:00", None)];
        let calls = vec![call("2024-01-01 09:00", 30), call("2024-01-01 11:00", 0)];

        let daily = daily_series(&deals, &calls);
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].deal_rate_pct, Some(50.0));
        assert_eq!(daily[1].deals_created, 0);
        assert_eq!(daily[2].deal_rate_pct, None);

        let period = overall_period(&daily).unwrap();
        assert_eq!(period.deals_sum, 2);
        assert_eq!(period.conv_overall, Some(100.0));
    }

    #[test]
    fn test_closed_daily_drops_inverted_dates() {
        let deals = vec![
            deal("2024-01-01 10:00", Some("2024-01-02 10:00")),
            deal("2024-01-05 10:00", Some("2024-01-03 10:00")),
            deal("2024-01-01 10:00", Some("2024-01-04 10:00")),
        ];
        let closed = closed_daily(&deals, None);
        assert_eq!(closed.len(), 3);
        assert_eq!(closed[0].deals_closed, 1);
        assert_eq!(closed[1].deals_closed, 0);

        let capped = closed_daily(&deals, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_ttc_histogram_bins() {
        let hist = ttc_histogram(&[0.0, 3.0, 3.5, 10.0, 400.0]);
        assert_eq!(hist[0].label, "0-3");
        assert_eq!(hist[0].count, 2);
        assert_eq!(hist[1].count, 1);
        assert_eq!(hist[2].count, 1);
        assert_eq!(hist.iter().map(|b| b.count).sum::<u64>(), 4);
    }

    #[test]
    fn test_call_duration_stats_in_minutes() {
        let calls = vec![call("2024-01-01 09:00", 60), call("2024-01-01 10:00", 120)];
        let stats = call_duration_stats(&calls).unwrap();
        assert_eq!(stats.n, 2);
        assert_eq!(stats.median_sec, 90.0);
        assert_eq!(stats.median_min, 1.5);
        assert!(call_duration_stats(&[]).is_none());
    }

    #[test]
    fn test_build_filters_by_month() {
        let deals = vec![deal("2024-01-31 10:00", None), deal("2024-02-01 10:00", None)];
        let series = build(&deals, &[], &["2024-02".to_string()]);
        assert_eq!(series.months, vec!["2024-01", "2024-02"]);
        assert_eq!(series.daily.len(), 1);
        assert_eq!(series.period.unwrap().deals_sum, 1);
    }
}
