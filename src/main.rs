use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use crm_insight::config::Config;
use crm_insight::logging;
use crm_insight::observability;
use crm_insight::pipeline::Pipeline;
use crm_insight::server;

#[derive(Parser)]
#[command(name = "crm_insight")]
#[command(about = "Clean CRM exports and serve the analytics dashboard")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the raw exports and write the import checklist
    Import,
    /// Import, then clean the tables into the columnar store
    Clean,
    /// Resolve coordinates for the cities of the cleaned deals
    Geocode,
    /// Write the markdown reports from the cleaned tables
    Report,
    /// Import, clean, geocode and report in one go
    Run,
    /// Serve the dashboard
    Serve {
        /// Port to listen on, overriding the configuration
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let _guard = logging::init_logging(&config.paths.log_dir);
    observability::init();

    let pipeline = Pipeline::new(config.clone());
    match cli.command {
        Commands::Import => {
            let outcome = pipeline.import()?;
            println!(
                "📥 Import checklist written: {} of {} tables loaded",
                outcome.checklist.loaded_count(),
                outcome.checklist.tables.len()
            );
        }
        Commands::Clean => {
            let outcome = pipeline.import()?;
            let summary = pipeline.clean(&outcome)?;
            let failed = summary.failed();
            if failed.is_empty() {
                println!("✅ Cleaning finished for run {}", summary.run_id);
            } else {
                let names: Vec<String> = failed.iter().map(|d| d.to_string()).collect();
                error!(tables = %names.join(", "), "Some tables failed to clean");
                println!("❌ Cleaning failed for: {}", names.join(", "));
            }
        }
        Commands::Geocode => {
            let summary = pipeline.geocode().await?;
            println!("🌍 Geocoding done: {}", serde_json::to_string(&summary)?);
        }
        Commands::Report => {
            for path in pipeline.report()? {
                println!("📝 {}", path.display());
            }
        }
        Commands::Run => {
            let summary = pipeline.run().await?;
            println!("\n📊 Pipeline results for run {}:", summary.run_id);
            println!("   Tables loaded:  {}", summary.tables_loaded);
            println!("   Tables cleaned: {}", summary.tables_cleaned);
            println!("   Orphan keys:    {}", summary.orphans);
            println!("   Duration:       {:.1}s", summary.duration_secs);
            for path in &summary.reports {
                println!("   Report:         {}", path.display());
            }
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.server.port);
            info!(port, "Starting dashboard");
            server::start_server(config, port).await?;
        }
    }
    Ok(())
}
