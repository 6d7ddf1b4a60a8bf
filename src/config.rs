//! Layered configuration loader.
//!
//! Precedence, lowest to highest: compiled-in defaults, an optional TOML
//! file, then process environment variables prefixed `MIGRATE_`. Shape
//! validation (api id/hash/phone) runs eagerly, before any network or file
//! I/O that depends on these values.

use std::path::Path;

use chrono::{DateTime, Utc};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::ConversationType;

pub const DEFAULT_CONFIG_PATH: &str = "./migration.toml";
pub const ENV_PREFIX: &str = "MIGRATE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationFilterConfig {
    pub include_ids: Vec<String>,
    pub exclude_ids: Vec<String>,
    pub include_types: Vec<ConversationType>,
    pub exclude_types: Vec<ConversationType>,
    pub min_message_count: Option<u64>,
    pub max_message_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api_id: i64,
    pub api_hash: String,
    pub phone_a: String,
    pub target_user_b: String,

    pub session_path: String,
    pub progress_path: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub flood_wait_threshold_seconds: u64,
    pub group_name_prefix: String,
    pub log_level: String,
    pub log_file_path: String,
    pub group_creation_delay_ms: u64,
    pub daily_group_limit: u32,

    #[serde(default)]
    pub filter: ConversationFilterConfig,
    pub min_date: Option<DateTime<Utc>>,
    pub max_date: Option<DateTime<Utc>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            phone_a: String::new(),
            target_user_b: String::new(),
            session_path: "./session.txt".to_string(),
            progress_path: "./progress.json".to_string(),
            batch_size: 100,
            batch_delay_ms: 1000,
            flood_wait_threshold_seconds: 300,
            group_name_prefix: "[Migrated] ".to_string(),
            log_level: "info".to_string(),
            log_file_path: "./migration.log".to_string(),
            group_creation_delay_ms: 60_000,
            daily_group_limit: 50,
            filter: ConversationFilterConfig::default(),
            min_date: None,
            max_date: None,
        }
    }
}

/// Loads and validates configuration from defaults, an optional TOML file
/// at `config_path` (default `./migration.toml`, silently absent is fine),
/// and `MIGRATE_`-prefixed environment variables.
pub fn load(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let path = config_path.unwrap_or(default_path);

    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX));

    let config: Config = figment
        .extract()
        .map_err(|e| ConfigError::InvalidShape(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api_id <= 0 {
        return Err(ConfigError::MissingRequired("apiId".to_string()));
    }
    if config.api_hash.len() != 32 || !config.api_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidShape("apiHash must be 32 hex characters".to_string()));
    }
    if !is_valid_phone(&config.phone_a) {
        return Err(ConfigError::InvalidShape("phoneA must be '+' followed by digits".to_string()));
    }
    if config.target_user_b.trim().is_empty() {
        return Err(ConfigError::MissingRequired("targetUserB".to_string()));
    }
    Ok(())
}

fn is_valid_phone(phone: &str) -> bool {
    let Some(rest) = phone.strip_prefix('+') else { return false };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            api_id: 123456,
            api_hash: "a".repeat(32),
            phone_a: "+15551234567".to_string(),
            target_user_b: "targetuser".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validates_good_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn rejects_non_positive_api_id() {
        let mut cfg = valid_config();
        cfg.api_id = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn rejects_wrong_length_api_hash() {
        let mut cfg = valid_config();
        cfg.api_hash = "abc".to_string();
        assert!(matches!(validate(&cfg), Err(ConfigError::InvalidShape(_))));
    }

    #[test]
    fn rejects_phone_without_plus_prefix() {
        let mut cfg = valid_config();
        cfg.phone_a = "15551234567".to_string();
        assert!(matches!(validate(&cfg), Err(ConfigError::InvalidShape(_))));
    }

    #[test]
    fn rejects_missing_target_user() {
        let mut cfg = valid_config();
        cfg.target_user_b = "".to_string();
        assert!(matches!(validate(&cfg), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn load_with_no_file_and_no_env_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.toml");
        assert!(load(Some(&missing)).is_err());
    }
}
