use crate::fetch::FetchPolicy;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// One tracked symbol mapped to a column of the output table.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Instrument {
    pub symbol: String,
    pub column: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: crate::providers::yahoo_finance::DEFAULT_BASE_URL.to_string(),
            }),
        }
    }
}

/// Retry and throttle tunables for the backoff fetcher.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub base_wait_secs: f64,
    pub jitter: f64,
    pub courtesy_min_secs: f64,
    pub courtesy_max_secs: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            max_retries: 5,
            base_wait_secs: 60.0,
            jitter: 0.2,
            courtesy_min_secs: 1.0,
            courtesy_max_secs: 5.0,
        }
    }
}

impl FetchConfig {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.max_retries,
            base_wait: Duration::from_secs_f64(self.base_wait_secs),
            jitter: self.jitter,
            courtesy_min: Duration::from_secs_f64(self.courtesy_min_secs),
            courtesy_max: Duration::from_secs_f64(self.courtesy_max_secs),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    Sendmail,
    Smtp,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub from: String,
    pub recipient: String,
    #[serde(default = "default_mail_transport")]
    pub transport: MailTransport,
    pub sendmail_command: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

fn default_mail_transport() -> MailTransport {
    MailTransport::Sendmail
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub instruments: Vec<Instrument>,
    pub start_date: NaiveDate,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub mail: Option<MailConfig>,
}

fn default_timezone() -> String {
    "Europe/Warsaw".to_string()
}

fn default_output_file() -> PathBuf {
    PathBuf::from("scraped-data.csv")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "quotegrid")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// The timezone "today" is computed in.
    pub fn reference_timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone '{}': {e}", self.timezone))
    }
}
