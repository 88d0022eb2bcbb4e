//! Configuration loading and runtime paths.
//!
//! Courier reads a single human-owned `config.toml` from `~/.courier/`
//! (or an explicit path). Every section is optional and falls back to the
//! defaults below. Secrets never live in the file: the bot token is read from
//! the environment variable named by `telegram.bot_token_env`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dispatch::optimizer::DEFAULT_METHODS;
use crate::dispatch::validation::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::store::{DEFAULT_HEALTH_CAP, DEFAULT_TRANSMISSION_CAP};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram channel settings.
    pub telegram: TelegramConfig,
    /// Dispatch pipeline settings.
    pub dispatch: DispatchConfig,
    /// Periodic task intervals.
    pub maintenance: MaintenanceConfig,
    /// Storage locations and log caps.
    pub storage: StorageConfig,
    /// Tracing output.
    pub logging: LoggingConfig,
}

/// Telegram-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Environment variable name holding the bot token.
    pub bot_token_env: String,
    /// Telegram user IDs allowed to use the bot. Empty allows everyone.
    pub allowed_users: Vec<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            allowed_users: Vec::new(),
        }
    }
}

/// Dispatch pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Transmission methods in tie-break order. The first is the fallback.
    pub methods: Vec<String>,
    /// Delay before the single retry of a failed interactive send.
    pub retry_delay_ms: u64,
    /// Interval between queue drain ticks.
    pub drain_interval_ms: u64,
    /// Requests taken per drain tick.
    pub batch_size: usize,
    /// Delay before the single re-initialization attempt after a system error.
    pub reinit_delay_secs: u64,
    /// Fixed seed for the random source. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            methods: DEFAULT_METHODS.iter().map(|m| (*m).to_owned()).collect(),
            retry_delay_ms: 5_000,
            drain_interval_ms: 2_000,
            batch_size: 10,
            reinit_delay_secs: 30,
            seed: None,
        }
    }
}

/// Periodic task configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Idle time before a session is purged.
    pub session_ttl_secs: u64,
    /// Session GC and scheduled-release interval.
    pub gc_interval_secs: u64,
    /// Health sampling interval.
    pub health_interval_secs: u64,
    /// Take a backup every N health ticks. Zero disables backups.
    pub backup_every_health_ticks: u64,
    /// Learning hook interval.
    pub learning_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 300,
            gc_interval_secs: 60,
            health_interval_secs: 300,
            backup_every_health_ticks: 12,
            learning_interval_secs: 3_600,
        }
    }
}

/// Storage configuration. Relative paths resolve against the courier root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
    /// Log directory override.
    pub logs_dir: Option<PathBuf>,
    /// Backup directory override.
    pub backups_dir: Option<PathBuf>,
    /// Transmission log capacity.
    pub transmission_log_cap: usize,
    /// Health log capacity.
    pub health_log_cap: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            logs_dir: None,
            backups_dir: None,
            transmission_log_cap: DEFAULT_TRANSMISSION_CAP,
            health_log_cap: DEFAULT_HEALTH_CAP,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit debug-level traces for the courier crate.
    pub verbose: bool,
}

fn default_bot_token_env() -> String {
    "COURIER_TELEGRAM_TOKEN".to_owned()
}

/// Resolved filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Courier root (`~/.courier`).
    pub root: PathBuf,
    /// `config.toml` inside the root.
    pub config_toml: PathBuf,
    /// `.env` inside the root.
    pub env_file: PathBuf,
    /// Persisted collections.
    pub data_dir: PathBuf,
    /// Rolling log files.
    pub logs_dir: PathBuf,
    /// Timestamped backups.
    pub backups_dir: PathBuf,
    /// Latest health report.
    pub health_json: PathBuf,
}

impl RuntimePaths {
    /// Layout rooted at `root`, with storage overrides applied.
    pub fn from_root(root: &Path, storage: &StorageConfig) -> Self {
        let resolve = |over: &Option<PathBuf>, default: &str| match over {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root.join(p),
            None => root.join(default),
        };
        Self {
            root: root.to_owned(),
            config_toml: root.join("config.toml"),
            env_file: root.join(".env"),
            data_dir: resolve(&storage.data_dir, "data"),
            logs_dir: resolve(&storage.logs_dir, "logs"),
            backups_dir: resolve(&storage.backups_dir, "backups"),
            health_json: root.join("health.json"),
        }
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    parse_config(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))
}

/// Load configuration from `path` if it exists, defaults otherwise.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or parsed.
pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Parse configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or has wrongly-typed fields.
pub fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

/// Resolve the default config directory (`~/.courier/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".courier"))
}

/// Read the bot token from the environment variable named in `config`.
///
/// # Errors
///
/// Returns [`DispatchError::Init`](crate::dispatch::DispatchError::Init) when
/// the variable is unset or empty.
pub fn bot_token(config: &TelegramConfig) -> Result<String, crate::dispatch::DispatchError> {
    match std::env::var(&config.bot_token_env) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(crate::dispatch::DispatchError::Init(format!(
            "environment variable {} is not set",
            config.bot_token_env
        ))),
    }
}
