use anyhow::{bail, Context, Result};
use chrono::Weekday;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use usage_rollup_common::config::GeneralConfig;
use usage_rollup_common::ConsistencyMode;

use crate::scheduler::WeeklySchedule;

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const ADMIN_SECRET_ENV: &str = "USAGE_ROLLUP_ADMIN_SECRET";
pub const TOKEN_KEY_ENV: &str = "USAGE_ROLLUP_TOKEN_KEY";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let data_dir =
            dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join("usage-rollup");

        Self { path: data_dir.join("usage-rollup.db").to_string_lossy().to_string() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8080".to_string() }
    }
}

/// Secrets as read from the file. Runtime code only sees them as `SecretString`.
#[derive(Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    pub admin_secret: Option<String>,
    pub token_signing_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_secret", &self.admin_secret.as_ref().map(|_| "[REDACTED]"))
            .field("token_signing_key", &self.token_signing_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AuthConfig {
    pub fn admin_secret(&self) -> Option<SecretString> {
        non_empty_secret(self.admin_secret.as_deref())
    }

    pub fn token_signing_key(&self) -> Option<SecretString> {
        non_empty_secret(self.token_signing_key.as_deref())
    }
}

fn non_empty_secret(value: Option<&str>) -> Option<SecretString> {
    value.filter(|v| !v.trim().is_empty()).map(|v| SecretString::from(v.to_string()))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { enabled: true, weekday: Weekday::Mon, hour: 3, minute: 0 }
    }
}

impl ScheduleConfig {
    pub fn weekly_schedule(&self) -> Result<WeeklySchedule> {
        WeeklySchedule::new(self.weekday, self.hour, self.minute).with_context(|| {
            format!("Invalid schedule time {:02}:{:02}", self.hour, self.minute)
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub time_budget_secs: Option<u64>,
    pub consistency: ConsistencyMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4, time_budget_secs: None, consistency: ConsistencyMode::default() }
    }
}

impl BatchConfig {
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }
}

/// A loaded configuration and where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ServerConfig,
    pub path: PathBuf,
    /// True when no file existed and defaults were written to `path`.
    pub created: bool,
}

impl ServerConfig {
    /// Default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("usage-rollup")
            .join("server.toml")
    }

    /// Load from `path` (or the default path), creating a default file if missing,
    /// then apply environment overrides.
    ///
    /// Runs before logging is set up, so the returned origin is what gets logged.
    pub fn load(path: Option<&Path>) -> Result<LoadedConfig> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_config_path);
        let created = !config_path.exists();

        let mut config = Self::load_from_path(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(LoadedConfig { config, path: config_path, created })
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        debug!("Loading server configuration from {:?}", config_path);

        if !config_path.exists() {
            info!(
                "Configuration file not found at {:?}, creating default configuration",
                config_path
            );
            let default_config = Self::default();
            default_config.save_to_path(config_path)?;
            return Ok(default_config);
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: ServerConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        info!("Loaded server configuration from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        debug!("Saving server configuration to {:?}", config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Saved server configuration to {:?}", config_path);
        Ok(())
    }

    /// Environment variables take precedence over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            debug!("Database path overridden by {}", DATABASE_URL_ENV);
            self.database.path = url;
        }
        if let Some(secret) = lookup(ADMIN_SECRET_ENV) {
            self.auth.admin_secret = Some(secret);
        }
        if let Some(key) = lookup(TOKEN_KEY_ENV) {
            self.auth.token_signing_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }

        self.http
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid http.bind address: {}", self.http.bind))?;

        self.schedule.weekly_schedule()?;

        if self.batch.max_concurrency == 0 {
            bail!("batch.max_concurrency must be at least 1");
        }
        if self.batch.time_budget_secs == Some(0) {
            bail!("batch.time_budget_secs must be positive when set");
        }

        if self.auth.admin_secret().is_none() {
            warn!("No admin secret configured - manual aggregation triggers will be rejected");
        }
        if self.auth.token_signing_key().is_none() {
            warn!("No token signing key configured - device tokens will not survive a restart");
        }
        if self.batch.consistency == ConsistencyMode::LastWriteWins {
            debug!("Summary writes use last-write-wins across producers");
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}
