use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_page_url")]
    pub page_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_html_dir")]
    pub html_dir: PathBuf,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Snowflake worker id for record-id issuance.
    #[serde(default = "default_worker_id")]
    pub worker_id: i64,
}

/// Report configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_page_url() -> String {
    "https://www.ninwin.cn/index.php?m=cb&a=cb_all".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1500
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "cb-etl/0.1 (convertible bond research)".to_string()
}
fn default_html_dir() -> PathBuf {
    PathBuf::from("html")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/cb.duckdb")
}
fn default_worker_id() -> i64 {
    1
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CB").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig {
                page_url: default_page_url(),
                timeout_secs: default_timeout_secs(),
                request_delay_ms: default_request_delay_ms(),
                jitter_ms: default_jitter_ms(),
                max_retries: default_max_retries(),
                user_agent: default_user_agent(),
                html_dir: default_html_dir(),
            },
            storage: StorageConfig {
                db_path: default_db_path(),
                run_migrations: true,
            },
            pipeline: PipelineConfig {
                worker_id: default_worker_id(),
            },
            report: ReportConfig {
                out_dir: default_out_dir(),
            },
        }
    }
}
