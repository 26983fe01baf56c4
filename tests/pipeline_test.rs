mod common;

use anyhow::Result;
use tempfile::tempdir;

use crm_insight::analytics::CleanData;
use crm_insight::constants::{FULL_REPORT, UE_REPORT};
use crm_insight::domain::Dataset;
use crm_insight::pipeline::ingestion::TableStatus;
use crm_insight::pipeline::orchestrator::{last_cleaning, last_import};
use crm_insight::pipeline::processing::CleaningStatus;
use crm_insight::pipeline::schema::{self, ColumnKind};
use crm_insight::pipeline::Pipeline;
use crm_insight::reports;
use crm_insight::table::ColumnData;

#[tokio::test]
async fn test_full_run_over_csv_exports() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &[]);
    let pipeline = Pipeline::new(config.clone());

    let outcome = pipeline.import()?;
    assert_eq!(outcome.checklist.loaded_count(), 4);
    assert!(config.paths.reports_dir.join("import_checklist.json").exists());
    assert!(config.paths.reports_dir.join("import_checklist.md").exists());

    let summary = pipeline.clean(&outcome)?;
    assert!(summary.failed().is_empty(), "failed: {:?}", summary.failed());
    for dataset in Dataset::ALL {
        assert!(pipeline.store().exists(dataset), "{dataset} not stored");
        assert!(pipeline.store().csv_path(dataset).exists());
    }

    // the row without an Id is dropped
    let deals_record = summary.table(Dataset::Deals).unwrap();
    assert_eq!(deals_record.after.as_ref().unwrap().rows, 3);

    // K3 points at a contact that does not exist
    let calls_fk = summary
        .integrity
        .iter()
        .find(|f| f.relation.starts_with("Calls."))
        .unwrap();
    assert_eq!(calls_fk.orphans, 1);
    assert_eq!(calls_fk.examples, vec!["C9".to_string()]);

    let geocode = pipeline.geocode_with(None).await?;
    assert_eq!(geocode.cities, 2);
    assert_eq!(geocode.from_manual, 2);
    assert!(config.city_coords_path().exists());

    let written = pipeline.report()?;
    assert_eq!(written.len(), 2);
    let full = reports::read_markdown(&config.paths.reports_dir, FULL_REPORT).unwrap();
    assert!(full.contains("4 of 4 exports loaded"));
    assert!(full.contains("| Berlin | 1 | 1 | 100.00 % |"));
    let ue = reports::read_markdown(&config.paths.reports_dir, UE_REPORT).unwrap();
    assert!(ue.contains("| Metric | Business |"));

    let data = CleanData::load(pipeline.store());
    let deals = data.deals();
    assert_eq!(deals.len(), 3);
    let paid: Vec<_> = deals.iter().filter(|d| d.is_paid).collect();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].id, "D1");
    assert!(paid[0].has_call);
    assert_eq!(paid[0].calls_cnt, 1);
    assert!(deals.iter().any(|d| d.id == "D2" && d.is_lost && d.level_norm.as_deref() == Some("A2")));
    Ok(())
}

#[tokio::test]
async fn test_missing_export_does_not_stop_the_run() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &["Spend.csv"]);

    let summary = Pipeline::new(config.clone()).run().await?;
    assert_eq!(summary.tables_loaded, 3);
    assert_eq!(summary.tables_cleaned, 3);
    assert_eq!(summary.reports.len(), 2);

    let checklist = last_import(&config).unwrap();
    assert_eq!(checklist.table(Dataset::Spend).unwrap().status, TableStatus::Missing);
    let cleaning = last_cleaning(&config).unwrap();
    assert_eq!(cleaning.table(Dataset::Spend).unwrap().status, CleaningStatus::Skipped);
    Ok(())
}

#[test]
fn test_cleaned_tables_round_trip_through_the_store() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &[]);
    let pipeline = Pipeline::new(config);
    let outcome = pipeline.import()?;
    pipeline.clean(&outcome)?;

    for dataset in Dataset::ALL {
        let stored = pipeline.store().load(dataset)?;
        let raw_rows = outcome.raw[&dataset].table.num_rows();
        assert!(stored.num_rows() <= raw_rows);
        assert!(stored.num_rows() > 0, "{dataset} empty after cleaning");
    }
    Ok(())
}

#[tokio::test]
async fn test_rerun_without_an_export_removes_its_stale_table() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &[]);
    Pipeline::new(config.clone()).run().await?;
    assert!(Pipeline::new(config.clone()).store().load_optional(Dataset::Spend).is_some());

    std::fs::remove_file(config.paths.raw_dir.join("Spend.csv"))?;
    let pipeline = Pipeline::new(config.clone());
    pipeline.run().await?;

    assert!(!pipeline.store().exists(Dataset::Spend));
    assert!(pipeline.store().load_optional(Dataset::Spend).is_none());
    assert!(!CleanData::load(pipeline.store()).has(Dataset::Spend));
    let cleaning = last_cleaning(&config).unwrap();
    let spend = cleaning.table(Dataset::Spend).unwrap();
    assert_eq!(spend.status, CleaningStatus::Skipped);
    assert!(spend.notes.iter().any(|n| n.contains("earlier run")));
    assert!(pipeline.store().exists(Dataset::Deals));
    Ok(())
}

fn matches_kind(kind: ColumnKind, data: &ColumnData) -> bool {
    match kind {
        ColumnKind::Id | ColumnKind::Text | ColumnKind::Category => matches!(data, ColumnData::Text(_)),
        ColumnKind::Int => matches!(data, ColumnData::Int(_)),
        ColumnKind::Float | ColumnKind::DurationHours => matches!(data, ColumnData::Float(_)),
        ColumnKind::DateTime => matches!(data, ColumnData::DateTime(_)),
        ColumnKind::Date => matches!(data, ColumnData::Date(_)),
        ColumnKind::Bool => matches!(data, ColumnData::Bool(_)),
    }
}

/// Blank out one CSV field on every data row
fn blank_field(csv: &str, index: usize) -> String {
    let mut lines = csv.lines();
    let mut out = format!("{}\n", lines.next().unwrap_or_default());
    for line in lines {
        let mut fields: Vec<&str> = line.split(',').collect();
        fields[index] = "";
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

#[test]
fn test_required_columns_survive_cleaning_with_declared_types() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &[]);
    // Deals.Stage and Spend.Clicks are empty on every row
    std::fs::write(config.paths.raw_dir.join("Deals.csv"), blank_field(common::DEALS, 4))?;
    std::fs::write(config.paths.raw_dir.join("Spend.csv"), blank_field(common::SPEND, 5))?;

    let pipeline = Pipeline::new(config);
    let outcome = pipeline.import()?;
    let summary = pipeline.clean(&outcome)?;
    assert!(summary.failed().is_empty(), "failed: {:?}", summary.failed());

    for dataset in Dataset::ALL {
        let stored = pipeline.store().load(dataset)?;
        for name in schema::required_columns(dataset) {
            let column = stored
                .column(name)
                .unwrap_or_else(|| panic!("{dataset}.{name} missing after cleaning"));
            let kind = schema::column_spec(dataset, name).unwrap().kind;
            assert!(
                matches_kind(kind, &column.data),
                "{dataset}.{name} stored as {}",
                column.data.type_name()
            );
        }
    }

    let stored = pipeline.store().load(Dataset::Deals)?;
    assert!(stored.text("Stage").unwrap().iter().all(|s| s.as_deref() == Some("unknown")));
    let spend = pipeline.store().load(Dataset::Spend)?;
    assert!(spend.int("Clicks").unwrap().iter().all(Option::is_none));
    Ok(())
}
