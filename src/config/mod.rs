//! Configuration loading for the equipment ledger.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `LEDGER_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "LEDGER_";
const MIN_JWT_SECRET_BYTES: usize = 32;
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `LEDGER_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,

    /// HMAC secret for session tokens
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: i64,

    /// Threshold for new balances when no equipment specification applies
    #[serde(default = "default_threshold")]
    pub default_threshold: i32,
    /// Alerts whose balance exceeds `threshold * multiplier` are high priority
    #[serde(default = "default_high_priority_multiplier")]
    pub high_priority_multiplier: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_api_key: Option<String>,
    #[serde(default = "default_vision_api_base")]
    pub vision_api_base: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_vision_timeout_seconds")]
    pub vision_timeout_seconds: u64,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_origins: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_admin_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_admin_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_admin_password: Option<String>,
    #[serde(default = "default_true")]
    pub seed_equipment_specs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            jwt_secret: String::new(),
            jwt_expiration_hours: default_jwt_expiration_hours(),
            default_threshold: default_threshold(),
            high_priority_multiplier: default_high_priority_multiplier(),
            vision_api_key: None,
            vision_api_base: default_vision_api_base(),
            vision_model: default_vision_model(),
            vision_timeout_seconds: default_vision_timeout_seconds(),
            max_upload_mb: default_max_upload_mb(),
            cors_origins: Vec::new(),
            bootstrap_admin_username: None,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
            seed_equipment_specs: true,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// True for the `local` and `test` profiles.
    pub fn is_development(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.jwt_secret.is_empty() {
            config.jwt_secret = REDACTED.to_string();
        }
        if config.vision_api_key.is_some() {
            config.vision_api_key = Some(REDACTED.to_string());
        }
        if config.bootstrap_admin_password.is_some() {
            config.bootstrap_admin_password = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_development() {
            if self.jwt_secret.is_empty() {
                return Err(ConfigError::MissingJwtSecret);
            }
            if self.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
                return Err(ConfigError::WeakJwtSecret {
                    length: self.jwt_secret.len(),
                });
            }
        }

        if self.jwt_expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtExpiration {
                value: self.jwt_expiration_hours,
            });
        }

        if self.default_threshold < 0 {
            return Err(ConfigError::InvalidDefaultThreshold {
                value: self.default_threshold,
            });
        }

        if !self.high_priority_multiplier.is_finite() || self.high_priority_multiplier < 1.0 {
            return Err(ConfigError::InvalidPriorityMultiplier {
                value: self.high_priority_multiplier,
            });
        }

        if !(1..=50).contains(&self.max_upload_mb) {
            return Err(ConfigError::InvalidMaxUpload {
                value: self.max_upload_mb,
            });
        }

        if self.vision_timeout_seconds == 0 {
            return Err(ConfigError::InvalidVisionTimeout);
        }

        url::Url::parse(&self.vision_api_base).map_err(|e| ConfigError::InvalidVisionApiBase {
            value: self.vision_api_base.clone(),
            error: e.to_string(),
        })?;

        let admin_fields = [
            self.bootstrap_admin_username.is_some(),
            self.bootstrap_admin_email.is_some(),
            self.bootstrap_admin_password.is_some(),
        ];
        if admin_fields.iter().any(|set| *set) && !admin_fields.iter().all(|set| *set) {
            return Err(ConfigError::IncompleteBootstrapAdmin);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://equipment_ledger.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_jwt_expiration_hours() -> i64 {
    24
}

fn default_threshold() -> i32 {
    20
}

fn default_high_priority_multiplier() -> f64 {
    1.5
}

fn default_vision_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_vision_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_vision_timeout_seconds() -> u64 {
    30
}

fn default_max_upload_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("JWT secret is missing; set LEDGER_JWT_SECRET")]
    MissingJwtSecret,
    #[error("JWT secret must be at least 32 bytes, got {length}")]
    WeakJwtSecret { length: usize },
    #[error("JWT expiration must be positive, got {value} hours")]
    InvalidJwtExpiration { value: i64 },
    #[error("default threshold must be non-negative, got {value}")]
    InvalidDefaultThreshold { value: i32 },
    #[error("high priority multiplier must be at least 1.0, got {value}")]
    InvalidPriorityMultiplier { value: f64 },
    #[error("max upload size must be between 1 and 50 MB, got {value}")]
    InvalidMaxUpload { value: usize },
    #[error("vision timeout must be positive")]
    InvalidVisionTimeout,
    #[error("invalid vision api base '{value}': {error}")]
    InvalidVisionApiBase { value: String, error: String },
    #[error("bootstrap admin requires username, email and password together")]
    IncompleteBootstrapAdmin,
}

/// Loads configuration using layered `.env` files and `LEDGER_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Process environment wins over files.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| {
            layered
                .remove(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take("DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections =
            parse_or("DB_MAX_CONNECTIONS", take("DB_MAX_CONNECTIONS"), default_db_max_connections)?;
        let db_acquire_timeout_ms = parse_or(
            "DB_ACQUIRE_TIMEOUT_MS",
            take("DB_ACQUIRE_TIMEOUT_MS"),
            default_db_acquire_timeout_ms,
        )?;
        let jwt_secret = take("JWT_SECRET").unwrap_or_default();
        let jwt_expiration_hours = parse_or(
            "JWT_EXPIRATION_HOURS",
            take("JWT_EXPIRATION_HOURS"),
            default_jwt_expiration_hours,
        )?;
        let default_threshold =
            parse_or("DEFAULT_THRESHOLD", take("DEFAULT_THRESHOLD"), default_threshold)?;
        let high_priority_multiplier = parse_or(
            "HIGH_PRIORITY_MULTIPLIER",
            take("HIGH_PRIORITY_MULTIPLIER"),
            default_high_priority_multiplier,
        )?;
        let vision_api_key = take("VISION_API_KEY");
        let vision_api_base = take("VISION_API_BASE").unwrap_or_else(default_vision_api_base);
        let vision_model = take("VISION_MODEL").unwrap_or_else(default_vision_model);
        let vision_timeout_seconds = parse_or(
            "VISION_TIMEOUT_SECONDS",
            take("VISION_TIMEOUT_SECONDS"),
            default_vision_timeout_seconds,
        )?;
        let max_upload_mb = parse_or("MAX_UPLOAD_MB", take("MAX_UPLOAD_MB"), default_max_upload_mb)?;
        let cors_origins = take("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let bootstrap_admin_username = take("BOOTSTRAP_ADMIN_USERNAME");
        let bootstrap_admin_email = take("BOOTSTRAP_ADMIN_EMAIL");
        let bootstrap_admin_password = take("BOOTSTRAP_ADMIN_PASSWORD");
        let seed_equipment_specs = match take("SEED_EQUIPMENT_SPECS") {
            Some(value) => parse_bool("SEED_EQUIPMENT_SPECS", &value)?,
            None => true,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            jwt_secret,
            jwt_expiration_hours,
            default_threshold,
            high_priority_multiplier,
            vision_api_key,
            vision_api_base,
            vision_model,
            vision_timeout_seconds,
            max_upload_mb,
            cors_origins,
            bootstrap_admin_username,
            bootstrap_admin_email,
            bootstrap_admin_password,
            seed_equipment_specs,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
    default: fn() -> T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            value,
        }),
        None => Ok(default()),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_local_profile() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_threshold, 20);
        assert_eq!(config.high_priority_multiplier, 1.5);
    }

    #[test]
    fn production_requires_strong_jwt_secret() {
        let mut config = AppConfig {
            profile: "prod".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingJwtSecret)
        ));

        config.jwt_secret = "short".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeakJwtSecret { length: 5 })
        ));

        config.jwt_secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn multiplier_below_one_is_rejected() {
        let config = AppConfig {
            high_priority_multiplier: 0.9,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPriorityMultiplier { .. })
        ));
    }

    #[test]
    fn upload_limit_bounds() {
        let config = AppConfig {
            max_upload_mb: 51,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
        let config = AppConfig {
            max_upload_mb: 1,
            ..AppConfig::default()
        };
        assert_eq!(config.max_upload_bytes(), 1024 * 1024);
    }

    #[test]
    fn partial_bootstrap_admin_is_rejected() {
        let config = AppConfig {
            bootstrap_admin_username: Some("admin".into()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompleteBootstrapAdmin)
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            jwt_secret: "super-secret-value".into(),
            vision_api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret-value"));
        assert!(!json.contains("sk-test"));
        assert!(json.contains(REDACTED));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "Yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
