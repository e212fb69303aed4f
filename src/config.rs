use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::issue::RuleKey;
use crate::lifecycle::{InactiveRules, NewCodePeriod, RemovedComponents};

pub const CONFIG_FILE: &str = ".issue-tracker.toml";
pub const NEW_CODE_SINCE_ENV: &str = "ISSUE_TRACKER_NEW_CODE_SINCE";

const DEFAULT_BLOCK_RADIUS: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Top-level configuration loaded from .issue-tracker.toml.
///
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub new_code: NewCodeConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub components: ComponentsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCodeConfig {
    /// Issues created at or after this date are on new code.
    /// If None, falls back to ISSUE_TRACKER_NEW_CODE_SINCE.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Lines on each side of an issue covered by its block fingerprint
    #[serde(default = "default_block_radius")]
    pub block_radius: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            block_radius: DEFAULT_BLOCK_RADIUS,
        }
    }
}

fn default_block_radius() -> usize {
    DEFAULT_BLOCK_RADIUS
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    /// Rules deactivated in the quality profile, as "repository:rule"
    #[serde(default)]
    pub inactive: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsConfig {
    /// Components deleted from the project
    #[serde(default)]
    pub removed: Vec<String>,
}

impl Config {
    /// Load configuration from .issue-tracker.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.new_code.since.is_none() {
            if let Ok(value) = std::env::var(NEW_CODE_SINCE_ENV) {
                config.new_code.since = Some(parse_date(NEW_CODE_SINCE_ENV, &value)?);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.inactive_rules()?;
        Ok(config)
    }

    pub fn new_code_period(&self) -> NewCodePeriod {
        NewCodePeriod {
            since: self.new_code.since,
        }
    }

    pub fn inactive_rules(&self) -> Result<InactiveRules, ConfigError> {
        let rules = self
            .rules
            .inactive
            .iter()
            .map(|key| {
                key.parse::<RuleKey>().map_err(|reason| ConfigError::Invalid {
                    key: "rules.inactive".to_string(),
                    reason,
                })
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(InactiveRules(rules))
    }

    pub fn removed_components(&self) -> RemovedComponents {
        RemovedComponents(self.components.removed.iter().cloned().collect())
    }
}

/// Parse an RFC 3339 date from config or command line.
pub fn parse_date(key: &str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })
}
