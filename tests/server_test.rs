mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::tempdir;
use tower::ServiceExt;

use crm_insight::pipeline::Pipeline;
use crm_insight::server::{create_server, AppState};

const PAGES: &[&str] = &[
    "/",
    "/data/import",
    "/data/cleaning",
    "/data/descriptive",
    "/viz/timeseries",
    "/viz/campaigns",
    "/viz/sales",
    "/viz/payments",
    "/viz/geo",
    "/product/unit-economics",
    "/product/growth-points",
    "/product/metric-tree",
    "/product/hypotheses",
    "/reports/full",
    "/reports/full-ue",
];

async fn get(app: &Router, uri: &str) -> Result<(StatusCode, String)> {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let dir = tempdir()?;
    let app = create_server(AppState::new(common::config_in(dir.path())));
    let (status, body) = get(&app, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(json["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_every_page_renders_an_empty_state_without_data() -> Result<()> {
    let dir = tempdir()?;
    let app = create_server(AppState::new(common::config_in(dir.path())));

    for page in PAGES {
        let (status, body) = get(&app, page).await?;
        assert_eq!(status, StatusCode::OK, "{page}");
        assert!(body.contains("CRM Insight"), "{page} is not a dashboard page");
    }

    let (_, body) = get(&app, "/viz/sales").await?;
    assert!(body.contains("No cleaned Deals data yet."));
    let (_, body) = get(&app, "/reports/full").await?;
    assert!(body.contains("has not been generated yet"));
    // static content needs no data
    let (_, body) = get(&app, "/product/metric-tree").await?;
    assert!(body.contains("Plotly.newPlot"));
    Ok(())
}

#[tokio::test]
async fn test_pages_show_data_after_a_run() -> Result<()> {
    let dir = tempdir()?;
    let config = common::config_in(dir.path());
    common::write_raw(&config, &[]);
    Pipeline::new(config.clone()).run().await?;
    let app = create_server(AppState::new(config));

    for page in PAGES {
        let (status, body) = get(&app, page).await?;
        assert_eq!(status, StatusCode::OK, "{page}");
        assert!(!body.contains("class=\"empty\""), "{page} shows an empty state");
    }

    let (_, body) = get(&app, "/viz/sales?month=2024-03").await?;
    assert!(body.contains("Anna Schmidt"));
    let (_, body) = get(&app, "/viz/geo").await?;
    assert!(body.contains("Berlin"));
    let (_, body) = get(&app, "/viz/timeseries?months=2024-03&months=2024-04").await?;
    assert!(body.contains("<option value=\"2024-03\" selected>"));
    let (_, body) = get(&app, "/reports/full").await?;
    assert!(body.contains("<h1>CRM analytics report</h1>"));
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text() -> Result<()> {
    let dir = tempdir()?;
    let app = create_server(AppState::new(common::config_in(dir.path())));
    let (status, _) = get(&app, "/metrics").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
