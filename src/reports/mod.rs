//! Report files under the reports directory: the import checklist and the
//! cleaning summary as JSON plus markdown, and the narrative markdown reports.

pub mod markdown;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analytics::{campaigns, descriptive, geo, payments, sales, timeseries, unit_economics, CleanData};
use crate::config::Config;
use crate::constants::{CLEANING_REPORT, FULL_REPORT, IMPORT_REPORT, UE_REPORT};
use crate::error::Result;
use crate::pipeline::geocode::load_coordinates;
use crate::pipeline::ingestion::ImportChecklist;
use crate::pipeline::CleaningSummary;

fn write_file(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    debug!(path = %path.display(), bytes = contents.len(), "Report written");
    Ok(path.to_path_buf())
}

fn write_json_and_markdown<T: Serialize>(dir: &Path, stem: &str, value: &T, markdown: String) -> Result<Vec<PathBuf>> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(vec![
        write_file(&dir.join(format!("{stem}.json")), &json)?,
        write_file(&dir.join(format!("{stem}.md")), &markdown)?,
    ])
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable report");
            None
        }
    }
}

pub fn write_import_checklist(dir: &Path, checklist: &ImportChecklist) -> Result<Vec<PathBuf>> {
    write_json_and_markdown(dir, IMPORT_REPORT, checklist, markdown::render_import_checklist(checklist))
}

pub fn read_import_checklist(dir: &Path) -> Option<ImportChecklist> {
    read_json(&dir.join(format!("{IMPORT_REPORT}.json")))
}

pub fn write_cleaning_summary(dir: &Path, summary: &CleaningSummary) -> Result<Vec<PathBuf>> {
    write_json_and_markdown(dir, CLEANING_REPORT, summary, markdown::render_cleaning_summary(summary))
}

pub fn read_cleaning_summary(dir: &Path) -> Option<CleaningSummary> {
    read_json(&dir.join(format!("{CLEANING_REPORT}.json")))
}

/// Markdown report by file name, `None` when it has not been generated.
pub fn read_markdown(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name)).ok()
}

/// `full_report.md` and `unit_economics.md` from the cleaned tables.
pub fn write_markdown_reports(config: &Config, data: &CleanData) -> Result<Vec<PathBuf>> {
    let dir = &config.paths.reports_dir;
    let deals = data.deals();
    let calls = data.calls();
    let contacts = data.contacts();
    let spend = data.spend();

    let checklist = read_import_checklist(dir);
    let cleaning = read_cleaning_summary(dir);
    let descriptive = descriptive::describe(data);
    let timeseries = timeseries::build(&deals, &calls, &[]);
    let campaigns = campaigns::analyze(&deals, &spend, &campaigns::CampaignFilter::default());
    let sales = sales::analyze(&deals, None);
    let payments = payments::analyze(&deals, &payments::PaymentFilter::default());
    let coords = load_coordinates(&config.city_coords_path());
    let geo = geo::analyze(&deals, &coords, None);

    let full = markdown::render_full_report(&markdown::FullReportInputs {
        checklist: checklist.as_ref(),
        cleaning: cleaning.as_ref(),
        descriptive: &descriptive,
        timeseries: &timeseries,
        campaigns: &campaigns,
        sales: &sales,
        payments: &payments,
        geo: &geo,
    });

    let ue = unit_economics::analyze(
        data.has(crate::domain::Dataset::Deals).then_some(deals.as_slice()),
        data.has(crate::domain::Dataset::Contacts).then_some(contacts.as_slice()),
        data.has(crate::domain::Dataset::Calls).then_some(calls.as_slice()),
        data.has(crate::domain::Dataset::Spend).then_some(spend.as_slice()),
    );
    let ue_md = markdown::render_unit_economics(&ue);

    let written = vec![
        write_file(&dir.join(FULL_REPORT), &full)?,
        write_file(&dir.join(UE_REPORT), &ue_md)?,
    ];
    info!(reports = written.len(), dir = %dir.display(), "Markdown reports written");
    Ok(written)
}
