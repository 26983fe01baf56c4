//! Runs the batch stages in order: import, clean, geocode, report.
//!
//! A stage failing for one table is recorded and the remaining tables still
//! go through; only I/O on the report directory aborts a stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::geocode::{self, GeocodeSummary, Geocoder, NominatimGeocoder};
use super::ingestion::{run_import_check, ImportChecklist, ImportOutcome};
use super::processing::derive::add_derived_fields;
use super::processing::{check_integrity, clean_table, CleaningStatus, OrphanFinding, TableCleaning};
use super::storage::Store;
use crate::analytics::CleanData;
use crate::config::Config;
use crate::domain::Dataset;
use crate::error::Result;
use crate::reports;
use crate::table::Table;

/// Everything the cleaning stage did, written as `cleaning_summary.{json,md}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub clean_dir: String,
    pub tables: Vec<TableCleaning>,
    pub integrity: Vec<OrphanFinding>,
}

impl CleaningSummary {
    pub fn table(&self, dataset: Dataset) -> Option<&TableCleaning> {
        self.tables.iter().find(|t| t.table == dataset)
    }

    pub fn failed(&self) -> Vec<Dataset> {
        self.tables
            .iter()
            .filter(|t| t.status == CleaningStatus::Error)
            .map(|t| t.table)
            .collect()
    }
}

/// Outcome of a full `run`
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub tables_loaded: usize,
    pub tables_cleaned: usize,
    pub orphans: usize,
    pub geocode: Option<GeocodeSummary>,
    pub reports: Vec<PathBuf>,
    pub duration_secs: f64,
}

pub struct Pipeline {
    config: Config,
    store: Store,
    run_id: String,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let store = Store::new(config.paths.clean_dir.clone());
        Self {
            config,
            store,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Read and validate the raw exports and write the import checklist.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn import(&self) -> Result<ImportOutcome> {
        info!("📥 Checking raw exports");
        let outcome = run_import_check(&self.config, &self.run_id);
        let written = reports::write_import_checklist(&self.config.paths.reports_dir, &outcome.checklist)?;
        info!(
            loaded = outcome.checklist.loaded_count(),
            reports = written.len(),
            "Import checklist written"
        );
        Ok(outcome)
    }

    /// Clean every imported table, derive deal fields, store the results and
    /// check cross-table integrity.
    #[instrument(skip(self, outcome), fields(run_id = %self.run_id))]
    pub fn clean(&self, outcome: &ImportOutcome) -> Result<CleaningSummary> {
        info!("🧹 Cleaning tables");
        let mut cleaned: BTreeMap<Dataset, Table> = BTreeMap::new();
        let mut records = Vec::new();

        for dataset in Dataset::ALL {
            let Some(raw) = outcome.raw.get(&dataset) else {
                let mut record = TableCleaning::new(dataset, CleaningStatus::Skipped);
                record.notes.push("Raw export unavailable".to_string());
                self.discard_stored(dataset, &mut record);
                records.push(record);
                continue;
            };

            let record = match clean_table(dataset, &raw.table) {
                Ok(mut result) => {
                    if dataset == Dataset::Deals {
                        let notes = add_derived_fields(&mut result.table, cleaned.get(&Dataset::Calls));
                        result.report.notes.extend(notes);
                    }
                    match self.store.write(dataset, &result.table) {
                        Ok(_) => {
                            cleaned.insert(dataset, result.table);
                            result.report
                        }
                        Err(e) => {
                            error!(table = %dataset, error = %e, "Failed to store cleaned table");
                            let mut record = result.report;
                            record.status = CleaningStatus::Error;
                            record.error = Some(e.to_string());
                            self.discard_stored(dataset, &mut record);
                            record
                        }
                    }
                }
                Err(e) => {
                    error!(table = %dataset, error = %e, "Cleaning failed");
                    let mut record = TableCleaning::new(dataset, CleaningStatus::Error);
                    record.error = Some(e.to_string());
                    self.discard_stored(dataset, &mut record);
                    record
                }
            };
            records.push(record);
        }

        let integrity = check_integrity(
            cleaned.get(&Dataset::Contacts),
            cleaned.get(&Dataset::Calls),
            cleaned.get(&Dataset::Deals),
            cleaned.get(&Dataset::Spend),
        );

        let summary = CleaningSummary {
            run_id: self.run_id.clone(),
            generated_at: Utc::now(),
            clean_dir: self.store.root().display().to_string(),
            tables: records,
            integrity,
        };
        reports::write_cleaning_summary(&self.config.paths.reports_dir, &summary)?;
        info!(
            cleaned = cleaned.len(),
            failed = summary.failed().len(),
            "Cleaning summary written"
        );
        Ok(summary)
    }

    /// Resolve coordinates for the cities of the cleaned deals.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn geocode(&self) -> Result<GeocodeSummary> {
        let geocoder = if self.config.geocoder.enabled {
            Some(NominatimGeocoder::new(&self.config.geocoder)?)
        } else {
            None
        };
        self.geocode_with(geocoder.as_ref().map(|g| g as &dyn Geocoder)).await
    }

    pub async fn geocode_with(&self, geocoder: Option<&dyn Geocoder>) -> Result<GeocodeSummary> {
        info!(online = geocoder.is_some(), "🌍 Resolving city coordinates");
        let cities = self
            .store
            .load_optional(Dataset::Deals)
            .map(|deals| geocode::distinct_cities(&deals))
            .unwrap_or_default();
        geocode::resolve_cities(
            &cities,
            &self.config.city_coords_path(),
            geocoder,
            Duration::from_millis(self.config.geocoder.delay_ms),
        )
        .await
    }

    /// Write the narrative markdown reports from the cleaned tables.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn report(&self) -> Result<Vec<PathBuf>> {
        info!("📝 Writing reports");
        let data = CleanData::load(&self.store);
        reports::write_markdown_reports(&self.config, &data)
    }

    /// Drop an earlier run's copy of a table this run could not produce.
    fn discard_stored(&self, dataset: Dataset, record: &mut TableCleaning) {
        match self.store.remove(dataset) {
            Ok(0) => {}
            Ok(_) => record
                .notes
                .push("Removed the cleaned table of an earlier run".to_string()),
            Err(e) => {
                warn!(table = %dataset, error = %e, "Failed to remove stale cleaned table");
                record.notes.push(format!("Stale cleaned table could not be removed: {e}"));
            }
        }
    }

    /// All batch stages in order. Geocoding problems are logged and do not
    /// stop the reports.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        info!(run_id = %self.run_id, "🚀 Starting pipeline run");

        let outcome = self.import()?;
        let cleaning = self.clean(&outcome)?;
        let geocode = match self.geocode().await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "Geocoding failed, continuing without new coordinates");
                None
            }
        };
        let reports = self.report()?;

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            tables_loaded: outcome.checklist.loaded_count(),
            tables_cleaned: cleaning
                .tables
                .iter()
                .filter(|t| t.status == CleaningStatus::Ok)
                .count(),
            orphans: cleaning.integrity.iter().map(|f| f.orphans).sum(),
            geocode,
            reports,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            run_id = %summary.run_id,
            loaded = summary.tables_loaded,
            cleaned = summary.tables_cleaned,
            orphans = summary.orphans,
            duration_secs = summary.duration_secs,
            "✅ Pipeline run finished"
        );
        Ok(summary)
    }
}

/// Checklist from the last import, if one was written
pub fn last_import(config: &Config) -> Option<ImportChecklist> {
    reports::read_import_checklist(&config.paths.reports_dir)
}

/// Summary from the last cleaning, if one was written
pub fn last_cleaning(config: &Config) -> Option<CleaningSummary> {
    reports::read_cleaning_summary(&config.paths.reports_dir)
}
