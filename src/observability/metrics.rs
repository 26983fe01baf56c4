//! Pipeline and dashboard metrics.
//!
//! Names follow the Prometheus conventions; the recorder is installed once per
//! process and its handle renders the text exposition for `/metrics`.

use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// All metric names used by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Import
    ImportRowsRead,
    ImportTablesStatus,

    // Cleaning
    CleaningRowsDropped,
    CleaningDuration,
    CleaningOutOfVocabulary,
    IntegrityOrphans,

    // Geocoding
    GeocodeCacheHits,
    GeocodeManualHits,
    GeocodeRequests,
    GeocodeMisses,

    // Dashboard
    PageRenders,
    PageRenderDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ImportRowsRead => "crm_import_rows_read_total",
            MetricName::ImportTablesStatus => "crm_import_tables_total",
            MetricName::CleaningRowsDropped => "crm_cleaning_rows_dropped_total",
            MetricName::CleaningDuration => "crm_cleaning_duration_seconds",
            MetricName::CleaningOutOfVocabulary => "crm_cleaning_out_of_vocabulary_total",
            MetricName::IntegrityOrphans => "crm_integrity_orphans_total",
            MetricName::GeocodeCacheHits => "crm_geocode_cache_hits_total",
            MetricName::GeocodeManualHits => "crm_geocode_manual_hits_total",
            MetricName::GeocodeRequests => "crm_geocode_requests_total",
            MetricName::GeocodeMisses => "crm_geocode_misses_total",
            MetricName::PageRenders => "crm_dashboard_page_renders_total",
            MetricName::PageRenderDuration => "crm_dashboard_page_render_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder. Idempotent; returns the shared handle.
pub fn init() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus recorder installed");
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
    HANDLE.get()
}

/// Text exposition of every recorded metric, empty when no recorder exists.
pub fn render() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

pub mod import {
    use super::*;

    pub fn record_rows_read(table: &str, rows: usize) {
        counter!(MetricName::ImportRowsRead.as_str(), "table" => table.to_string())
            .increment(rows as u64);
    }

    pub fn record_table_status(table: &str, status: &str) {
        counter!(
            MetricName::ImportTablesStatus.as_str(),
            "table" => table.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }
}

pub mod cleaning {
    use super::*;

    pub fn record_rows_dropped(table: &str, reason: &'static str, rows: usize) {
        if rows == 0 {
            return;
        }
        counter!(
            MetricName::CleaningRowsDropped.as_str(),
            "table" => table.to_string(),
            "reason" => reason
        )
        .increment(rows as u64);
    }

    pub fn record_duration(table: &str, seconds: f64) {
        histogram!(MetricName::CleaningDuration.as_str(), "table" => table.to_string())
            .record(seconds);
    }

    pub fn record_out_of_vocabulary(column: &str, count: usize) {
        counter!(
            MetricName::CleaningOutOfVocabulary.as_str(),
            "column" => column.to_string()
        )
        .increment(count as u64);
    }

    pub fn record_orphans(relation: &str, count: usize) {
        counter!(MetricName::IntegrityOrphans.as_str(), "relation" => relation.to_string())
            .increment(count as u64);
    }
}

pub mod geocode {
    use super::*;

    pub fn record_cache_hit() {
        counter!(MetricName::GeocodeCacheHits.as_str()).increment(1);
    }

    pub fn record_manual_hit() {
        counter!(MetricName::GeocodeManualHits.as_str()).increment(1);
    }

    pub fn record_request(outcome: &'static str) {
        counter!(MetricName::GeocodeRequests.as_str(), "outcome" => outcome).increment(1);
    }

    pub fn record_miss() {
        counter!(MetricName::GeocodeMisses.as_str()).increment(1);
    }
}

pub mod dashboard {
    use super::*;

    pub fn record_page_render(page: &'static str, seconds: f64) {
        counter!(MetricName::PageRenders.as_str(), "page" => page).increment(1);
        histogram!(MetricName::PageRenderDuration.as_str(), "page" => page).record(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_and_unique() {
        let all = [
            MetricName::ImportRowsRead,
            MetricName::ImportTablesStatus,
            MetricName::CleaningRowsDropped,
            MetricName::CleaningDuration,
            MetricName::CleaningOutOfVocabulary,
            MetricName::IntegrityOrphans,
            MetricName::GeocodeCacheHits,
            MetricName::GeocodeManualHits,
            MetricName::GeocodeRequests,
            MetricName::GeocodeMisses,
            MetricName::PageRenders,
            MetricName::PageRenderDuration,
        ];
        let mut names: Vec<_> = all.iter().map(|m| m.as_str()).collect();
        assert!(names.iter().all(|n| n.starts_with("crm_")));
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        import::record_rows_read("Deals", 3);
        geocode::record_miss();
        assert_eq!(MetricName::GeocodeMisses.to_string(), "crm_geocode_misses_total");
    }
}
