//! Configuration management for the prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "BANK_PREDICTOR_CONFIG";

/// Serialization format of the classifier artifact
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Decision tree exported as JSON arrays
    #[default]
    Tree,
    /// ONNX graph, requires the `onnx` cargo feature
    Onnx,
}

/// Prediction store backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store; nothing survives a restart
    Memory,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub store: StoreConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
    /// Origins allowed by CORS (the dashboard)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_origins: vec![
                "http://localhost:8050".to_string(),
                "http://127.0.0.1:8050".to_string(),
            ],
        }
    }
}

/// Trained model and preprocessing artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory containing the artifact files
    pub dir: PathBuf,
    pub model_format: ModelFormat,
    pub model_file: String,
    /// Per-column label-encoder classes
    pub encoders_file: String,
    /// Per-column fallback codes for unseen categories (optional file)
    pub default_codes_file: String,
    /// Training column list
    pub feature_names_file: String,
    /// Training label column, removed from the feature order
    pub label_column: String,
    /// Number of threads for ONNX inference
    pub onnx_threads: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            model_format: ModelFormat::Tree,
            model_file: "model.json".to_string(),
            encoders_file: "encoders.json".to_string(),
            default_codes_file: "default_values.json".to_string(),
            feature_names_file: "feature_names.json".to_string(),
            label_column: "deposit".to_string(),
            onnx_threads: 1,
        }
    }
}

impl ArtifactsConfig {
    /// Artifacts read from `dir` with default file names
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model_file)
    }

    pub fn encoders_path(&self) -> PathBuf {
        self.dir.join(&self.encoders_file)
    }

    pub fn default_codes_path(&self) -> PathBuf {
        self.dir.join(&self.default_codes_file)
    }

    pub fn feature_names_path(&self) -> PathBuf {
        self.dir.join(&self.feature_names_file)
    }
}

/// Client/prediction store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Connection URL; falls back to `DATABASE_URL` and the `DB_*` variables
    pub url: Option<String>,
    pub max_connections: u32,
    /// Create the tables when they do not exist
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            url: None,
            max_connections: 5,
            run_migrations: true,
        }
    }
}

impl StoreConfig {
    /// Resolve the database URL: explicit setting, then `DATABASE_URL`,
    /// then one composed from `DB_USER`, `DB_PASSWORD`, `DB_HOST`,
    /// `DB_PORT` (default 5432) and `DB_NAME`.
    pub fn resolve_url(&self) -> Option<String> {
        self.resolve_url_with(|key| std::env::var(key).ok())
    }

    fn resolve_url_with<F>(&self, var: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        if let Some(url) = var("DATABASE_URL").filter(|u| !u.is_empty()) {
            return Some(url);
        }

        let user = var("DB_USER")?;
        let host = var("DB_HOST")?;
        let name = var("DB_NAME")?;
        let password = var("DB_PASSWORD").unwrap_or_default();
        let port = var("DB_PORT").unwrap_or_else(|| "5432".to_string());
        Some(format!("postgresql://{user}:{password}@{host}:{port}/{name}"))
    }
}

/// Pipeline metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `BANK_PREDICTOR_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, overridden by
    /// `BANK_PREDICTOR__SECTION__KEY` environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("BANK_PREDICTOR")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
