use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Top-level configuration, read from `config.toml` when present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub import: ImportConfig,
    pub geocoder: GeocoderConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub log_dir: PathBuf,
}

/// Raw export file names per table. Lookup falls back to a fuzzy match on
/// the table name when the exact name is absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub contacts_file: String,
    pub calls_file: String,
    pub deals_file: String,
    pub spend_file: String,
    /// Columns with a null share above this are flagged in the checklist
    pub max_null_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub country: String,
    pub user_agent: String,
    pub delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            import: ImportConfig::default(),
            geocoder: GeocoderConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            clean_dir: PathBuf::from("data/clean"),
            temp_dir: PathBuf::from("data/temp"),
            reports_dir: PathBuf::from("reports"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            contacts_file: "Contacts (Done).xlsx".to_string(),
            calls_file: "Calls_(Done).xlsx".to_string(),
            deals_file: "Deals (Done).xlsx".to_string(),
            spend_file: "Spend (Done).xlsx".to_string(),
            max_null_rate: 0.5,
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            country: "Germany".to_string(),
            user_agent: concat!("crm_insight/", env!("CARGO_PKG_VERSION")).to_string(),
            delay_ms: 1100,
            timeout_seconds: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist, then apply `CRM_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            info!(path = %path.display(), "Loaded configuration file");
            toml::from_str::<Config>(&content)?
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("CRM_RAW_DIR") {
            self.paths.raw_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CRM_CLEAN_DIR") {
            self.paths.clean_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CRM_TEMP_DIR") {
            self.paths.temp_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CRM_REPORTS_DIR") {
            self.paths.reports_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CRM_PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| PipelineError::Config(format!("CRM_PORT is not a port: {v}")))?;
        }
        if let Ok(v) = std::env::var("CRM_GEOCODER_ENABLED") {
            self.geocoder.enabled = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Configured raw file name for a dataset
    pub fn raw_file_name(&self, dataset: crate::domain::Dataset) -> &str {
        use crate::domain::Dataset;
        match dataset {
            Dataset::Contacts => &self.import.contacts_file,
            Dataset::Calls => &self.import.calls_file,
            Dataset::Deals => &self.import.deals_file,
            Dataset::Spend => &self.import.spend_file,
        }
    }

    pub fn city_coords_path(&self) -> PathBuf {
        self.paths.temp_dir.join(crate::constants::CITY_COORDS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paths]
            raw_dir = "in"

            [geocoder]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.raw_dir, PathBuf::from("in"));
        assert_eq!(config.paths.clean_dir, PathBuf::from("data/clean"));
        assert!(config.geocoder.enabled);
        assert_eq!(config.geocoder.delay_ms, 1100);
        assert_eq!(config.import.max_null_rate, 0.5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("definitely/not/here.toml")).unwrap();
        assert_eq!(config.server.port, 8050);
    }
}
