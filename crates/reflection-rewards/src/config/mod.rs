use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};

use crate::rewards::PointsConfig;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub rewards: RewardsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            rewards: RewardsConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where streak state and the points ledger live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    Sqlite(PathBuf),
}

/// Reward schedule plus the engine's operational limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardsConfig {
    pub points: PointsConfig,
    /// Attempts per submission before a persistence conflict is surfaced.
    pub max_attempts: u32,
    pub recent_ledger_limit: usize,
    /// Wall clock on which calendar weeks are cut.
    pub week_offset: FixedOffset,
    pub storage: StorageConfig,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            points: PointsConfig::default(),
            max_attempts: 3,
            recent_ledger_limit: 10,
            week_offset: Utc.fix(),
            storage: StorageConfig::Memory,
        }
    }
}

impl RewardsConfig {
    /// Reward settings only, for commands that never bind a server.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut points = defaults.points;

        points.base_points_per_entry =
            env_number("REWARDS_BASE_POINTS", points.base_points_per_entry)?;
        points.streak_multiplier =
            env_number("REWARDS_STREAK_MULTIPLIER", points.streak_multiplier)?;
        points.max_weekly_points =
            env_number("REWARDS_MAX_WEEKLY_POINTS", points.max_weekly_points)?;
        points.multiple_entry_bonus =
            env_number("REWARDS_MULTIPLE_ENTRY_BONUS", points.multiple_entry_bonus)?;
        if let Ok(raw) = env::var("REWARDS_MILESTONES") {
            points.milestone_rewards = parse_milestones(&raw)?;
        }

        let offset_minutes: i32 = env_number("REWARDS_WEEK_UTC_OFFSET_MINUTES", 0)?;
        let week_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset {
                minutes: offset_minutes,
            })?;

        let storage = match env::var("REWARDS_DATABASE_PATH") {
            Ok(path) if !path.trim().is_empty() => {
                StorageConfig::Sqlite(PathBuf::from(path.trim()))
            }
            _ => StorageConfig::Memory,
        };

        let config = Self {
            points,
            max_attempts: env_number("REWARDS_MAX_ATTEMPTS", defaults.max_attempts)?,
            recent_ledger_limit: env_number(
                "REWARDS_RECENT_LEDGER_LIMIT",
                defaults.recent_ledger_limit,
            )?,
            week_offset,
            storage,
        };
        config.validate()?;
        Ok(config)
    }

    /// A zero base award would produce empty ledger rows and break the
    /// "a row exists for this week" check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points.base_points_per_entry == 0 {
            return Err(ConfigError::ZeroBasePoints);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

/// Parse `4:200,12:500` into a milestone table.
pub fn parse_milestones(raw: &str) -> Result<BTreeMap<u32, u32>, ConfigError> {
    let mut milestones = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let invalid = || ConfigError::InvalidMilestones {
            entry: entry.to_string(),
        };
        let (weeks, reward) = entry.split_once(':').ok_or_else(invalid)?;
        let weeks = weeks.trim().parse::<u32>().map_err(|_| invalid())?;
        let reward = reward.trim().parse::<u32>().map_err(|_| invalid())?;
        if weeks == 0 {
            return Err(invalid());
        }
        milestones.insert(weeks, reward);
    }
    Ok(milestones)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidMilestones { entry: String },
    InvalidOffset { minutes: i32 },
    ZeroBasePoints,
    ZeroAttempts,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::InvalidMilestones { entry } => write!(
                f,
                "REWARDS_MILESTONES entry '{entry}' must look like <weeks>:<points>"
            ),
            ConfigError::InvalidOffset { minutes } => write!(
                f,
                "REWARDS_WEEK_UTC_OFFSET_MINUTES={minutes} is outside a single day"
            ),
            ConfigError::ZeroBasePoints => write!(f, "REWARDS_BASE_POINTS must be at least 1"),
            ConfigError::ZeroAttempts => write!(f, "REWARDS_MAX_ATTEMPTS must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
