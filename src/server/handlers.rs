//! Dashboard page handlers. Every page loads what it needs from the cleaned
//! store and the reports directory on the blocking pool and falls back to an
//! empty state when its inputs are missing.

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error};

use super::charts;
use super::templates::{
    DataTable, FilterField, IndexTemplate, PageTemplate, Panel, ReportTemplate, NAV,
};
use super::AppState;
use crate::analytics::campaigns::{self, CampaignFilter, ChannelMetrics};
use crate::analytics::descriptive;
use crate::analytics::metric_tree::metric_tree;
use crate::analytics::payments::{self, PaymentFilter};
use crate::analytics::unit_economics::{self, hadi_rows, UnitEconomics, UnitMetrics, BUSINESS};
use crate::analytics::{geo, sales, timeseries, CleanData};
use crate::constants::{FULL_REPORT, UE_REPORT};
use crate::domain::Dataset;
use crate::observability;
use crate::observability::metrics::dashboard::record_page_render;
use crate::pipeline::geocode::load_coordinates;
use crate::pipeline::ingestion::ImportChecklist;
use crate::pipeline::orchestrator::{last_cleaning, last_import};
use crate::pipeline::CleaningSummary;
use crate::reports::{self, markdown::{num, pct}};

const RUN_HINT: &str = "Run `crm_insight run` to import and clean the exports.";

/// Query string pairs, repeated keys kept (multi-selects)
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// First non-empty value of `key`
    pub fn first(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    }

    pub fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
            .collect()
    }
}

async fn blocking<T, F>(task: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "Blocking task failed");
            None
        }
    }
}

async fn load_data(state: &AppState) -> CleanData {
    let store = state.store.clone();
    blocking(move || CleanData::load(&store)).await.unwrap_or_default()
}

fn render(page: &'static str, started: Instant, template: impl Template) -> Response {
    let result = template.render();
    record_page_render(page, started.elapsed().as_secs_f64());
    match result {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(page, error = %e, "Template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template rendering failed").into_response()
        }
    }
}

fn page(title: &str, action: &str) -> PageTemplate {
    PageTemplate {
        title: title.to_string(),
        nav: NAV,
        intro: None,
        action: action.to_string(),
        filters: Vec::new(),
        empty: None,
        panels: Vec::new(),
    }
}

fn missing(tables: &[Dataset]) -> String {
    let names: Vec<&str> = tables.iter().map(|d| d.as_str()).collect();
    format!("No cleaned {} data yet. {RUN_HINT}", names.join(" or "))
}

fn sample_table(columns: &[String], sample: &[Map<String, Value>]) -> DataTable {
    let cell = |v: Option<&Value>| match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let headers: Vec<&str> = columns.iter().map(String::as_str).collect();
    let rows = sample
        .iter()
        .map(|row| columns.iter().map(|c| cell(row.get(c))).collect())
        .collect();
    DataTable::new(&headers, rows)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "crm_insight",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        observability::render(),
    )
}

pub async fn index(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let config = state.config.clone();
    let store = state.store.clone();
    let loaded = blocking(move || {
        let shapes: Vec<(Dataset, Option<(usize, usize)>)> = Dataset::ALL
            .iter()
            .map(|&d| (d, store.load_optional(d).map(|t| (t.num_rows(), t.num_columns()))))
            .collect();
        (shapes, last_import(&config), last_cleaning(&config))
    })
    .await;
    let (shapes, checklist, cleaning) = loaded.unwrap_or_default();

    let rows = shapes
        .into_iter()
        .map(|(dataset, shape)| match shape {
            Some((rows, cols)) => vec![dataset.to_string(), "cleaned".to_string(), rows.to_string(), cols.to_string()],
            None => vec![dataset.to_string(), "missing".to_string(), "-".to_string(), "-".to_string()],
        })
        .collect();

    render(
        "index",
        started,
        IndexTemplate {
            title: "Overview".to_string(),
            nav: NAV,
            tables: DataTable::new(&["Table", "State", "Rows", "Columns"], rows),
            last_import: checklist.map(|c| {
                format!(
                    "{} ({} of {} tables loaded)",
                    c.generated_at.format("%Y-%m-%d %H:%M UTC"),
                    c.loaded_count(),
                    c.tables.len()
                )
            }),
            last_cleaning: cleaning.map(|s| {
                format!(
                    "{} ({} failed, {} orphan keys)",
                    s.generated_at.format("%Y-%m-%d %H:%M UTC"),
                    s.failed().len(),
                    s.integrity.iter().map(|f| f.orphans).sum::<usize>()
                )
            }),
        },
    )
}

pub async fn import_page(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let config = state.config.clone();
    let checklist: Option<ImportChecklist> = blocking(move || last_import(&config)).await.flatten();

    let mut tpl = page("Import checklist", "/data/import");
    let Some(checklist) = checklist else {
        tpl.empty = Some(format!("No import checklist found. {RUN_HINT}"));
        return render("import", started, tpl);
    };
    tpl.intro = Some(format!(
        "Run {} at {} over {}; null-rate threshold {:.0} %.",
        checklist.run_id,
        checklist.generated_at.format("%Y-%m-%d %H:%M UTC"),
        checklist.raw_dir,
        checklist.max_null_rate * 100.0
    ));

    let rows = checklist
        .tables
        .iter()
        .map(|t| {
            vec![
                t.table.to_string(),
                t.status.as_str().to_string(),
                t.file.clone().unwrap_or_else(|| "-".to_string()),
                t.format.map(|f| format!("{f:?}").to_lowercase()).unwrap_or_else(|| "-".to_string()),
                t.encoding.clone().unwrap_or_else(|| "-".to_string()),
                t.delimiter.clone().unwrap_or_else(|| "-".to_string()),
                t.size_bytes.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
                t.rows.to_string(),
                t.cols.to_string(),
                t.issues.len().to_string(),
            ]
        })
        .collect();
    tpl.panels.push(Panel::new("Tables").table(DataTable::new(
        &["Table", "Status", "File", "Format", "Encoding", "Delimiter", "Bytes", "Rows", "Columns", "Issues"],
        rows,
    )));

    for check in &checklist.tables {
        let mut notes = Vec::new();
        if let Some(error) = &check.error {
            notes.push(format!("Error: {error}"));
        }
        if !check.missing_required.is_empty() {
            notes.push(format!("Missing required columns: {}", check.missing_required.join(", ")));
        }
        if !check.unexpected.is_empty() {
            notes.push(format!("Unexpected columns: {}", check.unexpected.join(", ")));
        }
        let issues = check
            .issues
            .iter()
            .map(|i| {
                vec![
                    format!("{:?}", i.severity),
                    format!("{:?}", i.kind),
                    i.column.clone().unwrap_or_default(),
                    i.description.clone(),
                ]
            })
            .collect();
        let mut panel = Panel::new(format!("{}: issues", check.table))
            .table(DataTable::new(&["Severity", "Kind", "Column", "Description"], issues));
        if !notes.is_empty() {
            panel = panel.note(notes.join(" "));
        }
        tpl.panels.push(panel);

        if !check.profiles.is_empty() {
            let profiles = check
                .profiles
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.inferred_type.clone(),
                        p.null_count.to_string(),
                        pct(Some(p.null_rate)),
                        if p.required { "yes" } else { "" }.to_string(),
                        if p.expected { "" } else { "unexpected" }.to_string(),
                    ]
                })
                .collect();
            tpl.panels.push(Panel::new(format!("{}: columns", check.table)).table(DataTable::new(
                &["Column", "Inferred type", "Nulls", "Null rate", "Required", ""],
                profiles,
            )));
        }
        if !check.sample.is_empty() {
            tpl.panels.push(
                Panel::new(format!("{}: first rows", check.table)).table(sample_table(&check.columns, &check.sample)),
            );
        }
    }
    render("import", started, tpl)
}

pub async fn cleaning_page(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let config = state.config.clone();
    let summary: Option<CleaningSummary> = blocking(move || last_cleaning(&config)).await.flatten();

    let mut tpl = page("Cleaning summary", "/data/cleaning");
    let Some(summary) = summary else {
        tpl.empty = Some(format!("No cleaning summary found. {RUN_HINT}"));
        return render("cleaning", started, tpl);
    };
    tpl.intro = Some(format!(
        "Run {} at {}; cleaned tables in {}.",
        summary.run_id,
        summary.generated_at.format("%Y-%m-%d %H:%M UTC"),
        summary.clean_dir
    ));

    let shape = |b: &Option<crate::pipeline::processing::TableBrief>| {
        b.as_ref().map(|b| format!("{} x {}", b.rows, b.cols)).unwrap_or_else(|| "-".to_string())
    };
    let rows = summary
        .tables
        .iter()
        .map(|t| {
            vec![
                t.table.to_string(),
                format!("{:?}", t.status).to_lowercase(),
                shape(&t.before),
                shape(&t.after),
                t.rows_dropped.values().sum::<usize>().to_string(),
                t.coercion_failures.values().sum::<usize>().to_string(),
                t.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    tpl.panels.push(Panel::new("Tables").table(DataTable::new(
        &["Table", "Status", "Before", "After", "Rows dropped", "Coercion failures", "Error"],
        rows,
    )));

    for record in &summary.tables {
        let Some(after) = &record.after else { continue };
        let before_types: BTreeMap<&str, &str> = record
            .before
            .iter()
            .flat_map(|b| b.columns.iter())
            .map(|c| (c.name.as_str(), c.dtype.as_str()))
            .collect();
        let columns = after
            .columns
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    before_types.get(c.name.as_str()).copied().unwrap_or("-").to_string(),
                    c.dtype.clone(),
                    c.nulls.to_string(),
                ]
            })
            .collect();
        let mut notes = record.notes.clone();
        notes.extend(record.rows_dropped.iter().map(|(reason, n)| format!("Dropped {n} row(s): {reason}.")));
        notes.extend(record.out_of_vocabulary.iter().map(|(column, values)| {
            format!("{} value(s) outside the vocabulary in {column}.", values.values().sum::<usize>())
        }));
        let mut panel = Panel::new(format!("{}: columns after cleaning", record.table))
            .table(DataTable::new(&["Column", "Type before", "Type after", "Nulls"], columns));
        if !notes.is_empty() {
            panel = panel.note(notes.join(" "));
        }
        tpl.panels.push(panel);

        if !after.sample.is_empty() {
            let names: Vec<String> = after.columns.iter().map(|c| c.name.clone()).collect();
            tpl.panels.push(
                Panel::new(format!("{}: cleaned sample", record.table)).table(sample_table(&names, &after.sample)),
            );
        }
    }

    let integrity = summary
        .integrity
        .iter()
        .map(|f| vec![f.relation.clone(), f.checked.to_string(), f.orphans.to_string(), f.examples.join(", ")])
        .collect();
    tpl.panels.push(
        Panel::new("Referential integrity")
            .table(DataTable::new(&["Relation", "Checked", "Orphans", "Examples"], integrity)),
    );
    render("cleaning", started, tpl)
}

pub async fn descriptive_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Descriptive statistics", "/data/descriptive");
    if data.is_empty() {
        tpl.empty = Some(missing(&Dataset::ALL));
        return render("descriptive", started, tpl);
    }

    let available: Vec<String> = Dataset::ALL
        .iter()
        .filter(|d| data.has(**d))
        .map(|d| d.to_string())
        .collect();
    let selected = params.first("table").and_then(|t| Dataset::parse(&t));
    tpl.filters.push(FilterField::select(
        "table",
        "Table",
        &available,
        &selected.map(|d| vec![d.to_string()]).unwrap_or_default(),
        false,
    ));

    for description in descriptive::describe(&data) {
        if selected.is_some_and(|s| s != description.table) {
            continue;
        }
        let numeric = description
            .numeric
            .iter()
            .map(|n| {
                vec![
                    n.column.clone(),
                    n.count.to_string(),
                    num(n.mean, 2),
                    num(n.median, 2),
                    num(n.mode, 2),
                    num(n.min, 2),
                    num(n.max, 2),
                    num(n.range, 2),
                ]
            })
            .collect();
        tpl.panels.push(
            Panel::new(format!("{}: numeric columns", description.table))
                .note(format!("{} rows", description.rows))
                .table(DataTable::new(
                    &["Column", "Count", "Mean", "Median", "Mode", "Min", "Max", "Range"],
                    numeric,
                )),
        );
        for (idx, categorical) in description.categorical.iter().enumerate() {
            let rows = categorical
                .top
                .iter()
                .map(|c| vec![c.value.clone(), c.count.to_string(), format!("{:.2} %", c.percent)])
                .collect();
            tpl.panels.push(
                Panel::new(format!("{}: {}", description.table, categorical.column))
                    .note(format!("{} distinct values over {} rows", categorical.distinct, categorical.total))
                    .chart(format!("cat-{}-{idx}", description.table.as_str().to_lowercase()), &charts::top_categories(categorical))
                    .table(DataTable::new(&["Value", "Count", "Share"], rows)),
            );
        }
    }
    render("descriptive", started, tpl)
}

pub async fn timeseries_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Deals and calls over time", "/viz/timeseries");
    if !data.has(Dataset::Deals) && !data.has(Dataset::Calls) {
        tpl.empty = Some(missing(&[Dataset::Deals, Dataset::Calls]));
        return render("timeseries", started, tpl);
    }

    let months = params.all("months");
    let ts = timeseries::build(&data.deals(), &data.calls(), &months);
    tpl.filters.push(FilterField::select("months", "Months", &ts.months, &months, true));

    match &ts.period {
        Some(p) => {
            tpl.intro = Some(format!(
                "{} to {}: {} deals, {} calls, {} deals per 100 calls.",
                p.date_from,
                p.date_to,
                p.deals_sum,
                p.calls_sum,
                num(p.conv_overall, 2)
            ));
        }
        None => {
            tpl.empty = Some("No dated deals or calls in the selected months.".to_string());
            return render("timeseries", started, tpl);
        }
    }

    tpl.panels.push(Panel::new("Daily activity").chart("daily", &charts::daily_activity(&ts)));
    tpl.panels.push(Panel::new("Closings").chart("closed", &charts::daily_closed(&ts)));
    let mut ttc = Panel::new("Time to close").chart("ttc", &charts::time_to_close(&ts));
    if !ts.ttc_days.is_empty() {
        ttc = ttc.note(format!(
            "{} closed deals, median {} days.",
            ts.ttc_days.len(),
            num(crate::analytics::stats::median(&ts.ttc_days), 1)
        ));
    }
    tpl.panels.push(ttc);
    if let Some(c) = &ts.call_duration {
        tpl.panels.push(Panel::new("Call duration").table(DataTable::new(
            &["Calls", "Median, s", "P90, s", "Median, min", "P90, min"],
            vec![vec![
                c.n.to_string(),
                format!("{:.0}", c.median_sec),
                format!("{:.0}", c.p90_sec),
                format!("{:.1}", c.median_min),
                format!("{:.1}", c.p90_min),
            ]],
        )));
    }
    render("timeseries", started, tpl)
}

fn channel_table(metrics: &[ChannelMetrics], key_headers: &[&str]) -> DataTable {
    let mut headers = key_headers.to_vec();
    headers.extend([
        "Impressions", "Clicks", "Spend", "Leads", "Paid", "Revenue", "CTR", "CPC", "CR", "CPL", "CPA", "ROAS",
        "Click to lead", "Lead to paid", "Full conversion", "Avg payment",
    ]);
    let rows = metrics
        .iter()
        .map(|m| {
            let mut row = m.key.clone();
            row.extend([
                format!("{:.0}", m.impressions),
                format!("{:.0}", m.clicks),
                num(Some(m.spend), 2),
                m.leads.to_string(),
                m.paid.to_string(),
                num(Some(m.revenue), 2),
                pct(Some(m.ctr)),
                num(Some(m.cpc), 2),
                pct(Some(m.cr)),
                num(Some(m.cpl), 2),
                num(Some(m.cpa), 2),
                num(Some(m.roas), 2),
                pct(Some(m.click_to_lead)),
                pct(Some(m.lead_to_paid)),
                pct(Some(m.full_conversion)),
                num(Some(m.avg_payment), 2),
            ]);
            row
        })
        .collect();
    DataTable::new(&headers, rows)
}

pub async fn campaigns_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Campaigns and sources", "/viz/campaigns");
    if !data.has(Dataset::Deals) && !data.has(Dataset::Spend) {
        tpl.empty = Some(missing(&[Dataset::Deals, Dataset::Spend]));
        return render("campaigns", started, tpl);
    }

    let filter = CampaignFilter {
        source: params.first("source"),
        campaign: params.first("campaign"),
        adgroup: params.first("adgroup"),
    };
    let report = campaigns::analyze(&data.deals(), &data.spend(), &filter);
    let as_vec = |v: &Option<String>| v.iter().cloned().collect::<Vec<_>>();
    tpl.filters = vec![
        FilterField::select("source", "Source", &report.sources, &as_vec(&filter.source), false),
        FilterField::select("campaign", "Campaign", &report.campaigns, &as_vec(&filter.campaign), false),
        FilterField::select("adgroup", "Ad group", &report.adgroups, &as_vec(&filter.adgroup), false),
    ];

    let funnel_rows = report
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
    tpl.panels.push(
        Panel::new("Funnel")
            .chart("funnel", &charts::funnel(&report.funnel))
            .table(DataTable::new(&["Stage", "Count", "To next stage"], funnel_rows)),
    );
    tpl.panels.push(
        Panel::new("Sources")
            .chart("sources", &charts::spend_vs_revenue(&report.by_source, "Spend and revenue per source"))
            .table(channel_table(&report.by_source, &["Source"])),
    );
    tpl.panels.push(
        Panel::new("Campaigns")
            .chart("campaigns", &charts::spend_vs_revenue(&report.by_campaign, "Spend and revenue per campaign"))
            .table(channel_table(&report.by_campaign, &["Campaign"])),
    );
    tpl.panels
        .push(Panel::new("Ad groups").table(channel_table(&report.by_adgroup, &["Campaign", "Ad group"])));
    render("campaigns", started, tpl)
}

pub async fn sales_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Sales team", "/viz/sales");
    if !data.has(Dataset::Deals) {
        tpl.empty = Some(missing(&[Dataset::Deals]));
        return render("sales", started, tpl);
    }

    let month = params.first("month");
    let report = sales::analyze(&data.deals(), month.as_deref());
    tpl.filters
        .push(FilterField::select("month", "Month", &report.months, &month.iter().cloned().collect::<Vec<_>>(), false));

    let owners = report
        .owners
        .iter()
        .map(|o| {
            vec![
                o.owner.clone(),
                o.n_deals.to_string(),
                o.n_processed.to_string(),
                o.n_closed.to_string(),
                o.n_paid.to_string(),
                o.n_lost.to_string(),
                num(Some(o.revenue_won), 2),
                o.calls_cnt_total.to_string(),
                num(o.avg_lead_to_first_call_hours, 1),
                pct(Some(o.cr_deals_to_paid)),
                pct(Some(o.cr_processed_to_paid)),
                num(Some(o.revenue_per_paid), 2),
                num(Some(o.calls_cnt_per_processed), 2),
                pct(Some(o.calls_coverage)),
                pct(Some(o.lost_rate_by_closed)),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new("Owners")
            .chart("owners", &charts::owner_conversion(&report.owners))
            .table(DataTable::new(
                &[
                    "Owner", "Deals", "Processed", "Closed", "Paid", "Lost", "Revenue", "Calls", "Hours to first call",
                    "CR deals", "CR processed", "Revenue per paid", "Calls per processed", "Call coverage",
                    "Lost of closed",
                ],
                owners,
            )),
    );

    let reasons = report
        .lost_reasons
        .iter()
        .map(|r| {
            vec![
                r.owner.clone(),
                r.lost_reason.clone(),
                r.n_lost.to_string(),
                r.n_lost_total_owner.to_string(),
                pct(Some(r.share_owner_lost)),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new("Lost reasons")
            .chart("lost", &charts::lost_reasons(&report.lost_reasons))
            .table(DataTable::new(&["Owner", "Reason", "Lost", "Owner lost total", "Share"], reasons)),
    );
    render("sales", started, tpl)
}

pub async fn payments_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Payments and products", "/viz/payments");
    if !data.has(Dataset::Deals) {
        tpl.empty = Some(missing(&[Dataset::Deals]));
        return render("payments", started, tpl);
    }

    let filter = PaymentFilter {
        month: params.first("month"),
        products: params.all("products"),
    };
    let report = payments::analyze(&data.deals(), &filter);
    tpl.filters = vec![
        FilterField::select("month", "Month", &report.months, &filter.month.iter().cloned().collect::<Vec<_>>(), false),
        FilterField::select("products", "Products", &report.products, &filter.products, true),
    ];

    if report.segments.is_empty() {
        tpl.empty = Some("No deals match the selected filters.".to_string());
        return render("payments", started, tpl);
    }
    let rows = report
        .segments
        .iter()
        .map(|s| {
            vec![
                s.payment_type.clone(),
                s.product.clone(),
                s.education_type.clone(),
                s.n_deals.to_string(),
                s.n_paid.to_string(),
                s.n_lost.to_string(),
                num(Some(s.revenue_total), 2),
                pct(Some(s.cr_deals_to_paid)),
                pct(Some(s.lost_rate)),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new("Segments")
            .chart("segments", &charts::payment_segments(&report.segments))
            .table(DataTable::new(
                &["Payment type", "Product", "Education", "Deals", "Paid", "Lost", "Offer total", "CR", "Lost rate"],
                rows,
            )),
    );
    render("payments", started, tpl)
}

pub async fn geo_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Geography", "/viz/geo");
    if !data.has(Dataset::Deals) {
        tpl.empty = Some(missing(&[Dataset::Deals]));
        return render("geo", started, tpl);
    }

    let coords_path = state.config.city_coords_path();
    let coords = blocking(move || load_coordinates(&coords_path)).await.unwrap_or_default();
    let level = params.first("level");
    let report = geo::analyze(&data.deals(), &coords, level.as_deref());
    tpl.filters.push(FilterField::select(
        "level",
        "German level",
        &report.level_options,
        &level.iter().cloned().collect::<Vec<_>>(),
        false,
    ));

    if report.cities.is_empty() {
        tpl.empty = Some("No deals with a mapped city. Run `crm_insight geocode` to resolve coordinates.".to_string());
        return render("geo", started, tpl);
    }
    let mut panel = Panel::new("Deals by city").chart("map", &charts::city_map(&report.cities));
    if !report.unmapped.is_empty() {
        panel = panel.note(format!("Without coordinates: {}.", report.unmapped.join(", ")));
    }
    tpl.panels.push(panel);

    let mut cities = report.cities.clone();
    cities.sort_by(|a, b| b.deals.cmp(&a.deals).then_with(|| a.city.cmp(&b.city)));
    let rows = cities
        .iter()
        .map(|c| {
            vec![
                c.city.clone(),
                c.deals.to_string(),
                c.paid.to_string(),
                pct(Some(c.win_rate)),
                format!("{:.4}", c.lat),
                format!("{:.4}", c.lon),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new("Cities").table(DataTable::new(&["City", "Deals", "Paid", "Win rate", "Lat", "Lon"], rows)),
    );
    render("geo", started, tpl)
}

fn unit_economics_of(data: &CleanData) -> UnitEconomics {
    let deals = data.deals();
    let contacts = data.contacts();
    let calls = data.calls();
    let spend = data.spend();
    unit_economics::analyze(
        data.has(Dataset::Deals).then_some(deals.as_slice()),
        data.has(Dataset::Contacts).then_some(contacts.as_slice()),
        data.has(Dataset::Calls).then_some(calls.as_slice()),
        data.has(Dataset::Spend).then_some(spend.as_slice()),
    )
}

fn segment_names(ue: &UnitEconomics) -> Vec<String> {
    std::iter::once(&ue.business)
        .chain(ue.products.iter())
        .map(|m| m.segment.clone())
        .collect()
}

pub async fn unit_economics_page(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let data = load_data(&state).await;

    let mut tpl = page("Unit economics", "/product/unit-economics");
    if !data.has(Dataset::Deals) {
        tpl.empty = Some(missing(&[Dataset::Deals]));
        return render("unit_economics", started, tpl);
    }
    let ue = unit_economics_of(&data);
    tpl.intro = Some("CM = UA * (LTV - CPA); LTV = AOV * APC * C1. C1 is shown in percent.".to_string());

    let segments: Vec<&UnitMetrics> = std::iter::once(&ue.business).chain(ue.products.iter()).collect();
    let mut headers = vec!["Metric"];
    headers.extend(segments.iter().map(|m| m.segment.as_str()));
    let rows = ue
        .business
        .values()
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| {
            std::iter::once(name.to_string())
                .chain(segments.iter().map(|m| num(m.values()[idx].1, 2)))
                .collect()
        })
        .collect();
    tpl.panels.push(Panel::new("Metrics per segment").table(DataTable::new(&headers, rows)));

    let tree = metric_tree();
    let formulas = ["ua", "b", "ac", "t", "revenue", "c1", "cpa", "cac", "aov", "apc", "cltv", "ltv", "cm"]
        .iter()
        .filter_map(|id| tree.node(id))
        .map(|n| vec![n.label.to_string(), n.formula.to_string(), n.essence.to_string()])
        .collect();
    tpl.panels.push(Panel::new("Formulas").table(DataTable::new(&["Metric", "Formula", "Meaning"], formulas)));
    render("unit_economics", started, tpl)
}

pub async fn growth_points_page(State(state): State<AppState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    let started = Instant::now();
    let params = QueryParams(params);
    let data = load_data(&state).await;

    let mut tpl = page("Growth points", "/product/growth-points");
    if !data.has(Dataset::Deals) {
        tpl.empty = Some(missing(&[Dataset::Deals]));
        return render("growth_points", started, tpl);
    }
    let ue = unit_economics_of(&data);
    let names = segment_names(&ue);
    let segment = params
        .first("segment")
        .filter(|s| names.contains(s))
        .unwrap_or_else(|| BUSINESS.to_string());
    tpl.filters.push(FilterField::select("segment", "Segment", &names, &[segment.clone()], false));
    tpl.intro = Some("CM after improving one lever by 10 %: UA, C1, AOV and APC up, CPA down.".to_string());

    let rows = ue
        .growth
        .iter()
        .filter(|g| g.segment == segment)
        .map(|g| {
            vec![
                g.lever.as_str().to_string(),
                num(g.cm_base, 2),
                num(g.cm_new, 2),
                num(g.cm_delta, 2),
                num(g.cm_delta_pct, 2),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new(format!("Levers for {segment}"))
            .chart("growth", &charts::growth_points(&ue.growth, &segment))
            .table(DataTable::new(&["Lever", "CM base", "CM new", "Delta", "Delta, %"], rows)),
    );
    render("growth_points", started, tpl)
}

pub async fn metric_tree_page() -> Response {
    let started = Instant::now();
    let tree = metric_tree();
    let mut tpl = page("Metric tree", "/product/metric-tree");
    tpl.intro = Some("How contribution margin decomposes down to the export columns.".to_string());

    let rows = tree
        .nodes
        .iter()
        .map(|n| {
            vec![
                n.layer.to_string(),
                n.label.to_string(),
                n.title.to_string(),
                n.essence.to_string(),
                n.formula.to_string(),
                tree.inputs(n.id).join(", "),
            ]
        })
        .collect();
    tpl.panels.push(Panel::new("Tree").chart("tree", &charts::metric_tree(&tree)));
    tpl.panels.push(Panel::new("Nodes").table(DataTable::new(
        &["Layer", "Metric", "Title", "Meaning", "Formula", "Inputs"],
        rows,
    )));
    render("metric_tree", started, tpl)
}

pub async fn hypotheses_page(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let data = load_data(&state).await;
    let mut tpl = page("Hypotheses", "/product/hypotheses");

    let hadi = hadi_rows()
        .into_iter()
        .map(|h| vec![h.part.to_string(), h.description.to_string()])
        .collect();
    tpl.panels.push(Panel::new("HADI card for C1").table(DataTable::new(&["Part", "Description"], hadi)));

    if !data.has(Dataset::Deals) {
        tpl.panels.push(Panel::new("A/B test sizing").note(missing(&[Dataset::Deals])));
        return render("hypotheses", started, tpl);
    }
    let ue = unit_economics_of(&data);
    let rows = ue
        .experiments
        .iter()
        .map(|e| {
            vec![
                e.segment.clone(),
                pct(e.p_base),
                pct(Some(e.target)),
                pct(e.x_abs),
                num(e.n_per_group, 0),
                num(e.ua_per_day, 2),
                num(e.n_available, 0),
                num(e.days_required, 1),
                num(e.min_ua_per_day, 2),
                if e.fits_limit { "yes" } else { "no" }.to_string(),
                pct(e.x_mde),
            ]
        })
        .collect();
    tpl.panels.push(
        Panel::new("A/B test sizing")
            .note(format!(
                "n = 16 p (1 - p) / x^2 per group; the test must finish within {} days.",
                unit_economics::MAX_TEST_DAYS
            ))
            .table(DataTable::new(
                &[
                    "Segment", "C1 now", "Target", "Lift", "n per group", "UA per day", "UA available", "Days needed",
                    "UA per day needed", "Fits", "MDE",
                ],
                rows,
            )),
    );
    render("hypotheses", started, tpl)
}

fn markdown_to_html(markdown: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

async fn report_page(state: &AppState, page_name: &'static str, title: &str, file: &'static str) -> Response {
    let started = Instant::now();
    let dir = state.config.paths.reports_dir.clone();
    let markdown = blocking(move || reports::read_markdown(&dir, file)).await.flatten();
    debug!(file, found = markdown.is_some(), "Loading report");

    let tpl = match markdown {
        Some(md) => ReportTemplate {
            title: title.to_string(),
            nav: NAV,
            empty: None,
            body: markdown_to_html(&md),
        },
        None => ReportTemplate {
            title: title.to_string(),
            nav: NAV,
            empty: Some("The report has not been generated yet. Run `crm_insight report`.".to_string()),
            body: String::new(),
        },
    };
    render(page_name, started, tpl)
}

pub async fn full_report(State(state): State<AppState>) -> Response {
    report_page(&state, "report_full", "Full report", FULL_REPORT).await
}

pub async fn full_ue_report(State(state): State<AppState>) -> Response {
    report_page(&state, "report_ue", "Unit economics report", UE_REPORT).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_keep_repeated_keys() {
        let params = QueryParams(vec![
            ("months".to_string(), "2024-01".to_string()),
            ("months".to_string(), "".to_string()),
            ("months".to_string(), "2024-03".to_string()),
            ("level".to_string(), "".to_string()),
        ]);
        assert_eq!(params.all("months"), vec!["2024-01", "2024-03"]);
        assert_eq!(params.first("months").as_deref(), Some("2024-01"));
        assert_eq!(params.first("level"), None);
    }

    #[test]
    fn test_markdown_tables_render() {
        let html = markdown_to_html("| A | B |\n| --- | --- |\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }
}
