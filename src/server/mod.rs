//! Dashboard HTTP server.

pub mod charts;
pub mod handlers;
pub mod templates;

use axum::{http::Method, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::Config;
use crate::pipeline::storage::Store;

/// Shared, read-only state of the dashboard
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Store::new(config.paths.clean_dir.clone());
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Create the router with every dashboard page
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Data quality
        .route("/data/import", get(handlers::import_page))
        .route("/data/cleaning", get(handlers::cleaning_page))
        .route("/data/descriptive", get(handlers::descriptive_page))
        // Visualization
        .route("/viz/timeseries", get(handlers::timeseries_page))
        .route("/viz/campaigns", get(handlers::campaigns_page))
        .route("/viz/sales", get(handlers::sales_page))
        .route("/viz/payments", get(handlers::payments_page))
        .route("/viz/geo", get(handlers::geo_page))
        // Product metrics
        .route("/product/unit-economics", get(handlers::unit_economics_page))
        .route("/product/growth-points", get(handlers::growth_points_page))
        .route("/product/metric-tree", get(handlers::metric_tree_page))
        .route("/product/hypotheses", get(handlers::hypotheses_page))
        // Reports
        .route("/reports/full", get(handlers::full_report))
        .route("/reports/full-ue", get(handlers::full_ue_report))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serve the dashboard until the process is stopped
pub async fn start_server(config: Config, port: u16) -> anyhow::Result<()> {
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server host '{}': {}", config.server.host, e))?;
    let addr = SocketAddr::from((host, port));
    let app = create_server(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 Dashboard running on http://{addr}");
    info!("💚 Health check: http://{addr}/health");
    info!("📈 Metrics:      http://{addr}/metrics");

    axum::serve(listener, app).await?;
    Ok(())
}
