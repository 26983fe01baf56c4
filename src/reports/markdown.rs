//! Markdown rendering of the pipeline reports.

use std::fmt::Write;

use crate::analytics::campaigns::CampaignReport;
use crate::analytics::descriptive::TableDescription;
use crate::analytics::geo::GeoReport;
use crate::analytics::payments::PaymentReport;
use crate::analytics::sales::SalesReport;
use crate::analytics::timeseries::TimeSeries;
use crate::analytics::unit_economics::{hadi_rows, UnitEconomics, UnitMetrics};
use crate::pipeline::ingestion::ImportChecklist;
use crate::pipeline::CleaningSummary;

const NA: &str = "n/a";
const TOP_ROWS: usize = 10;

/// Number with fixed decimals, `n/a` when absent
pub fn num(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.digits$}"),
        _ => NA.to_string(),
    }
}

/// Fraction rendered as a percentage
pub fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2} %", v * 100.0),
        _ => NA.to_string(),
    }
}

/// GitHub-flavoured pipe table. Pipes inside cells are escaped.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let escape = |s: &str| s.replace('|', "\\|").replace('\n', " ");
    let mut out = String::new();
    let _ = writeln!(out, "| {} |", headers.join(" | "));
    let _ = writeln!(out, "|{}", " --- |".repeat(headers.len()));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| escape(c)).collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out
}

pub fn render_import_checklist(checklist: &ImportChecklist) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Import checklist\n");
    let _ = writeln!(
        out,
        "Run `{}` at {} over `{}`; columns with more than {:.0} % nulls are flagged.\n",
        checklist.run_id,
        checklist.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        checklist.raw_dir,
        checklist.max_null_rate * 100.0
    );

    let rows: Vec<Vec<String>> = checklist
        .tables
        .iter()
        .map(|t| {
            vec![
                t.table.to_string(),
                t.status.as_str().to_string(),
                t.file.clone().unwrap_or_else(|| NA.to_string()),
                t.encoding.clone().unwrap_or_else(|| "-".to_string()),
                t.rows.to_string(),
                t.cols.to_string(),
                t.issues.len().to_string(),
            ]
        })
        .collect();
    out.push_str(&table(
        &["Table", "Status", "File", "Encoding", "Rows", "Columns", "Issues"],
        &rows,
    ));

    for check in &checklist.tables {
        let _ = writeln!(out, "\n## {}\n", check.table);
        if let Some(sha) = &check.sha256 {
            let _ = writeln!(out, "- sha256: `{sha}`");
        }
        if !check.missing_required.is_empty() {
            let _ = writeln!(out, "- missing required columns: {}", check.missing_required.join(", "));
        }
        if !check.unexpected.is_empty() {
            let _ = writeln!(out, "- unexpected columns: {}", check.unexpected.join(", "));
        }
        if let Some(error) = &check.error {
            let _ = writeln!(out, "- error: {error}");
        }
        if check.issues.is_empty() {
            let _ = writeln!(out, "No issues.");
        } else {
            let issues: Vec<Vec<String>> = check
                .issues
                .iter()
                .map(|i| {
                    vec![
                        format!("{:?}", i.severity),
                        i.column.clone().unwrap_or_else(|| "-".to_string()),
                        i.description.clone(),
                    ]
                })
                .collect();
            out.push('\n');
            out.push_str(&table(&["Severity", "Column", "Issue"], &issues));
        }
        if !check.profiles.is_empty() {
            let profiles: Vec<Vec<String>> = check
                .profiles
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.inferred_type.clone(),
                        p.null_count.to_string(),
                        pct(Some(p.null_rate)),
                        if p.required { "yes" } else { "" }.to_string(),
                    ]
                })
                .collect();
            out.push('\n');
            out.push_str(&table(&["Column", "Type", "Nulls", "Null rate", "Required"], &profiles));
        }
    }
    out
}

pub fn render_cleaning_summary(summary: &CleaningSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Cleaning summary\n");
    let _ = writeln!(
        out,
        "Run `{}` at {}; cleaned tables in `{}`.\n",
        summary.run_id,
        summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.clean_dir
    );

    let rows: Vec<Vec<String>> = summary
        .tables
        .iter()
        .map(|t| {
            let shape = |b: &Option<crate::pipeline::processing::TableBrief>| {
                b.as_ref()
                    .map(|b| format!("{} x {}", b.rows, b.cols))
                    .unwrap_or_else(|| "-".to_string())
            };
            vec![
                t.table.to_string(),
                format!("{:?}", t.status).to_lowercase(),
                shape(&t.before),
                shape(&t.after),
                t.rows_dropped.values().sum::<usize>().to_string(),
            ]
        })
        .collect();
    out.push_str(&table(&["Table", "Status", "Before", "After", "Rows dropped"], &rows));

    for record in &summary.tables {
        let _ = writeln!(out, "\n## {}\n", record.table);
        if let Some(error) = &record.error {
            let _ = writeln!(out, "- error: {error}");
        }
        for note in &record.notes {
            let _ = writeln!(out, "- {note}");
        }
        for (reason, rows) in &record.rows_dropped {
            let _ = writeln!(out, "- dropped {rows} row(s): {reason}");
        }
        for (column, failures) in &record.coercion_failures {
            let _ = writeln!(out, "- {failures} value(s) in '{column}' could not be converted");
        }
        for (column, values) in &record.out_of_vocabulary {
            let listed: Vec<String> = values.iter().map(|(v, n)| format!("{v} ({n})")).collect();
            let _ = writeln!(out, "- out-of-vocabulary in '{column}': {}", listed.join(", "));
        }
    }

    let _ = writeln!(out, "\n## Referential integrity\n");
    if summary.integrity.is_empty() {
        let _ = writeln!(out, "No relations could be checked.");
    } else {
        let rows: Vec<Vec<String>> = summary
            .integrity
            .iter()
            .map(|f| {
                vec![
                    f.relation.clone(),
                    f.checked.to_string(),
                    f.orphans.to_string(),
                    f.examples.join(", "),
                ]
            })
            .collect();
        out.push_str(&table(&["Relation", "Checked", "Orphans", "Examples"], &rows));
    }
    out
}

/// Inputs of the narrative report, each optional when its tables are missing
pub struct FullReportInputs<'a> {
    pub checklist: Option<&'a ImportChecklist>,
    pub cleaning: Option<&'a CleaningSummary>,
    pub descriptive: &'a [TableDescription],
    pub timeseries: &'a TimeSeries,
    pub campaigns: &'a CampaignReport,
    pub sales: &'a SalesReport,
    pub payments: &'a PaymentReport,
    pub geo: &'a GeoReport,
}

pub fn render_full_report(input: &FullReportInputs<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# CRM analytics report\n");

    let _ = writeln!(out, "## 1. Data preparation\n");
    match input.checklist {
        Some(c) => {
            let _ = writeln!(
                out,
                "{} of {} exports loaded (import run `{}`).",
                c.loaded_count(),
                c.tables.len(),
                c.run_id
            );
        }
        None => {
            let _ = writeln!(out, "No import checklist yet.");
        }
    }
    if let Some(s) = input.cleaning {
        let orphans: usize = s.integrity.iter().map(|f| f.orphans).sum();
        let failed = s.failed();
        let _ = writeln!(
            out,
            "Cleaning: {} table(s) processed, {} failed, {} orphan foreign key(s).",
            s.tables.len(),
            failed.len(),
            orphans
        );
    }
    for d in input.descriptive {
        let _ = writeln!(out, "\n### {} ({} rows)\n", d.table, d.rows);
        if !d.numeric.is_empty() {
            let rows: Vec<Vec<String>> = d
                .numeric
                .iter()
                .map(|n| {
                    vec![
                        n.column.clone(),
                        n.count.to_string(),
                        num(n.mean, 2),
                        num(n.median, 2),
                        num(n.mode, 2),
                        num(n.range, 2),
                    ]
                })
                .collect();
            out.push_str(&table(&["Column", "Count", "Mean", "Median", "Mode", "Range"], &rows));
        }
    }

    let _ = writeln!(out, "\n## 2. Activity over time\n");
    match &input.timeseries.period {
        Some(p) => {
            let _ = writeln!(
                out,
                "From {} to {}: {} deals created, {} calls, overall deals per call {}.",
                p.date_from,
                p.date_to,
                p.deals_sum,
                p.calls_sum,
                p.conv_overall.map(|c| format!("{c:.2} %")).unwrap_or_else(|| NA.to_string())
            );
        }
        None => {
            let _ = writeln!(out, "No dated deals or calls.");
        }
    }
    if let Some(c) = &input.timeseries.call_duration {
        let _ = writeln!(
            out,
            "Call duration: median {:.1} min, p90 {:.1} min over {} calls.",
            c.median_min, c.p90_min, c.n
        );
    }
    let bins: Vec<Vec<String>> = input
        .timeseries
        .ttc_bins
        .iter()
        .map(|b| vec![b.label.to_string(), b.count.to_string()])
        .collect();
    if bins.iter().any(|b| b[1] != "0") {
        out.push('\n');
        out.push_str(&table(&["Days to close", "Deals"], &bins));
    }

    let _ = writeln!(out, "\n## 3. Campaigns and sources\n");
    let funnel: Vec<Vec<String>> = input
        .campaigns
        .funnel
        .iter()
        .map(|s| {
            vec![
                s.stage.to_string(),
                format!("{:.0}", s.count),
                s.next_pct.map(|p| format!("{p:.3} %")).unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    out.push_str(&table(&["Stage", "Count", "To next stage"], &funnel));
    let mut sources = input.campaigns.by_source.clone();
    sources.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    let rows: Vec<Vec<String>> = sources
        .iter()
        .take(TOP_ROWS)
        .map(|m| {
            vec![
                m.key.join(" / "),
                m.leads.to_string(),
                m.paid.to_string(),
                num(Some(m.spend), 2),
                num(Some(m.revenue), 2),
                num(Some(m.roas), 2),
            ]
        })
        .collect();
    out.push('\n');
    out.push_str(&table(&["Source", "Leads", "Paid", "Spend", "Revenue", "ROAS"], &rows));

    let _ = writeln!(out, "\n## 4. Sales team\n");
    let mut owners = input.sales.owners.clone();
    owners.sort_by(|a, b| b.revenue_won.total_cmp(&a.revenue_won));
    let rows: Vec<Vec<String>> = owners
        .iter()
        .take(TOP_ROWS)
        .map(|o| {
            vec![
                o.owner.clone(),
                o.n_deals.to_string(),
                o.n_paid.to_string(),
                pct(Some(o.cr_deals_to_paid)),
                num(Some(o.revenue_won), 2),
                num(o.avg_lead_to_first_call_hours, 1),
            ]
        })
        .collect();
    out.push_str(&table(
        &["Owner", "Deals", "Paid", "CR", "Revenue", "Avg hours to first call"],
        &rows,
    ));

    let _ = writeln!(out, "\n## 5. Payments and products\n");
    let mut segments = input.payments.segments.clone();
    segments.sort_by(|a, b| b.revenue_total.total_cmp(&a.revenue_total));
    let rows: Vec<Vec<String>> = segments
        .iter()
        .take(TOP_ROWS)
        .map(|s| {
            vec![
                s.payment_type.clone(),
                s.product.clone(),
                s.education_type.clone(),
                s.n_deals.to_string(),
                s.n_paid.to_string(),
                num(Some(s.revenue_total), 2),
            ]
        })
        .collect();
    out.push_str(&table(
        &["Payment type", "Product", "Education", "Deals", "Paid", "Offer total"],
        &rows,
    ));

    let _ = writeln!(out, "\n## 6. Geography\n");
    let mut cities = input.geo.cities.clone();
    cities.sort_by(|a, b| b.deals.cmp(&a.deals).then_with(|| a.city.cmp(&b.city)));
    let rows: Vec<Vec<String>> = cities
        .iter()
        .take(TOP_ROWS)
        .map(|c| {
            vec![
                c.city.clone(),
                c.deals.to_string(),
                c.paid.to_string(),
                pct(Some(c.win_rate)),
            ]
        })
        .collect();
    out.push_str(&table(&["City", "Deals", "Paid", "Win rate"], &rows));
    if !input.geo.unmapped.is_empty() {
        let _ = writeln!(
            out,
            "\n{} city(ies) without coordinates are not on the map.",
            input.geo.unmapped.len()
        );
    }
    out
}

fn metrics_rows(metrics: &[&UnitMetrics]) -> Vec<Vec<String>> {
    let Some(first) = metrics.first() else {
        return Vec::new();
    };
    first
        .values()
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| {
            std::iter::once(name.to_string())
                .chain(metrics.iter().map(|m| num(m.values()[idx].1, 2)))
                .collect()
        })
        .collect()
}

pub fn render_unit_economics(ue: &UnitEconomics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Unit economics\n");
    let _ = writeln!(
        out,
        "CM = UA * (LTV - CPA), LTV = AOV * APC * C1. Buyers are paid deals with an offer above 10; \
         revenue per buyer follows the instalment terms (AOV_I, R_I).\n"
    );

    let segments: Vec<&UnitMetrics> = std::iter::once(&ue.business).chain(ue.products.iter()).collect();
    let mut headers = vec!["Metric"];
    headers.extend(segments.iter().map(|m| m.segment.as_str()));
    out.push_str(&table(&headers, &metrics_rows(&segments)));

    let _ = writeln!(out, "\n## Growth points\n");
    let _ = writeln!(out, "CM after a 10 % improvement of one lever (CPA down, the others up).\n");
    let rows: Vec<Vec<String>> = ue
        .growth
        .iter()
        .map(|g| {
            vec![
                g.segment.clone(),
                g.lever.as_str().to_string(),
                num(g.cm_base, 2),
                num(g.cm_new, 2),
                num(g.cm_delta, 2),
                num(g.cm_delta_pct, 2),
            ]
        })
        .collect();
    out.push_str(&table(
        &["Segment", "Lever", "CM base", "CM new", "Delta", "Delta %"],
        &rows,
    ));

    let _ = writeln!(out, "\n## Hypothesis (HADI)\n");
    let rows: Vec<Vec<String>> = hadi_rows()
        .iter()
        .map(|h| vec![h.part.to_string(), h.description.to_string()])
        .collect();
    out.push_str(&table(&["Part", "Description"], &rows));

    let _ = writeln!(out, "\n## A/B test sizing for C1\n");
    let rows: Vec<Vec<String>> = ue
        .experiments
        .iter()
        .map(|e| {
            vec![
                e.segment.clone(),
                pct(e.p_base),
                pct(Some(e.target)),
                num(e.n_per_group, 0),
                num(e.ua_per_day, 2),
                num(e.days_required, 1),
                if e.fits_limit { "yes" } else { "no" }.to_string(),
                pct(e.x_mde),
            ]
        })
        .collect();
    out.push_str(&table(
        &["Segment", "C1 now", "Target", "n per group", "UA/day", "Days needed", "Fits 14 days", "MDE"],
        &rows,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_escapes_pipes() {
        let md = table(&["A", "B"], &[vec!["x|y".to_string(), "z".to_string()]]);
        assert_eq!(md, "| A | B |\n| --- | --- |\n| x\\|y | z |\n");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(num(Some(1.2345), 2), "1.23");
        assert_eq!(num(None, 2), NA);
        assert_eq!(num(Some(f64::NAN), 2), NA);
        assert_eq!(pct(Some(0.125)), "12.50 %");
    }

    #[test]
    fn test_unit_economics_report_lists_segments() {
        let ue = crate::analytics::unit_economics::analyze(None, None, None, None);
        let md = render_unit_economics(&ue);
        assert!(md.contains("| Metric | Business | Web Developer | Digital Marketing | UX/UI Design |"));
        assert!(md.contains("H (hypothesis)"));
        assert!(md.contains("| CM | n/a |"));
    }
}
