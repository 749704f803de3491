use mora_execution::settlement::RetryPolicy;
use mora_execution::{BetLimits, EngineConfig};
use mora_types::casino::{GameKind, UserId, DEFAULT_PITY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

pub mod commands;
pub mod engine;

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

const fn default_session_timeout_secs() -> u64 {
    90
}

const fn default_retry_attempts() -> u32 {
    5
}

const fn default_retry_base_delay_ms() -> u64 {
    25
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_pity_threshold() -> u32 {
    DEFAULT_PITY_THRESHOLD
}

/// Log level as written in the config file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Configuration for the [engine] wiring, read from YAML.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub database: String,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub json_logs: bool,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_pity_threshold")]
    pub pity_threshold: u32,

    #[serde(default)]
    pub premium_users: Vec<u64>,
    #[serde(default)]
    pub admin_users: Vec<u64>,
    /// Keyed by game name (`coinflip`, `rps`, `hilo`, ...).
    #[serde(default)]
    pub bet_limits: BTreeMap<String, BetLimits>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("database path must not be empty")]
    EmptyDatabase,
    #[error("unknown game in bet_limits: {0}")]
    UnknownGame(String),
    #[error("bet_limits.{game}: {reason}")]
    InvalidBetLimits { game: String, reason: String },
    #[error("user {0} is listed more than once in {1}")]
    DuplicateUser(u64, &'static str),
}

/// Config with every value checked and converted.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub database: PathBuf,
    pub log_level: Level,
    pub json_logs: bool,
    pub seed: Option<u64>,
    pub busy_timeout: Duration,
    pub premium_users: HashSet<UserId>,
    pub admin_users: HashSet<UserId>,
    pub engine: EngineConfig,
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn users(field: &'static str, ids: &[u64]) -> Result<HashSet<UserId>, ConfigError> {
    let mut set = HashSet::with_capacity(ids.len());
    for id in ids {
        if !set.insert(UserId(*id)) {
            return Err(ConfigError::DuplicateUser(*id, field));
        }
    }
    Ok(set)
}

impl Config {
    /// Minimal config pointing at `database`, everything else defaulted.
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            log_level: default_log_level(),
            json_logs: false,
            seed: None,
            session_timeout_secs: default_session_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pity_threshold: default_pity_threshold(),
            premium_users: Vec::new(),
            admin_users: Vec::new(),
            bet_limits: BTreeMap::new(),
        }
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        ensure_nonzero("session_timeout_secs", self.session_timeout_secs)?;
        ensure_nonzero("retry_attempts", u64::from(self.retry_attempts))?;
        ensure_nonzero("busy_timeout_ms", self.busy_timeout_ms)?;
        ensure_nonzero("pity_threshold", u64::from(self.pity_threshold))?;

        let mut bet_limits = Vec::with_capacity(self.bet_limits.len());
        for (game, limits) in &self.bet_limits {
            let kind =
                GameKind::from_str(game).map_err(|_| ConfigError::UnknownGame(game.clone()))?;
            limits
                .validate()
                .map_err(|reason| ConfigError::InvalidBetLimits {
                    game: game.clone(),
                    reason,
                })?;
            bet_limits.push((kind, *limits));
        }

        let engine = EngineConfig {
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
            session_timeout: Duration::from_secs(self.session_timeout_secs),
            pity_threshold: self.pity_threshold,
            bet_limits,
            ..EngineConfig::default()
        };

        Ok(ValidatedConfig {
            database: PathBuf::from(self.database),
            log_level: self.log_level.into(),
            json_logs: self.json_logs,
            seed: self.seed,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            premium_users: users("premium_users", &self.premium_users)?,
            admin_users: users("admin_users", &self.admin_users)?,
            engine,
        })
    }
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "database: {}", self.database.display())?;
        writeln!(f, "log level: {}", self.log_level)?;
        writeln!(f, "seeded: {}", self.seed.is_some())?;
        writeln!(f, "premium users: {}", self.premium_users.len())?;
        writeln!(f, "admin users: {}", self.admin_users.len())?;
        writeln!(
            f,
            "session timeout: {}s",
            self.engine.session_timeout.as_secs()
        )?;
        write!(f, "bet limit overrides: {}", self.engine.bet_limits.len())
    }
}
