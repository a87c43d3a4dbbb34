//! Configuration module
//!
//! Settings are read from a TOML file (`~/.config/aiqiji-cms/config.toml`
//! unless overridden) and then from environment variables. A missing file
//! is not an error; a missing JWT secret is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::crypto::jwt::{parse_ttl, JwtConfig, DEFAULT_TOKEN_TTL};
use crate::infrastructure::crypto::password::DEFAULT_BCRYPT_COST;
use crate::infrastructure::database::DatabaseConfig;

/// Environment variable holding an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "AIQIJI_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("JWT_SECRET is not configured; refusing to start without a signing key")]
    MissingSecret,

    #[error("Invalid token lifetime '{0}' (expected e.g. 30d, 12h, 3600)")]
    InvalidTtl(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSection,
    pub security: SecurityConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8181,
            shutdown_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DatabaseConfig::default();
        Self {
            url: defaults.url,
            max_connections: defaults.max_connections,
        }
    }
}

impl DatabaseSection {
    pub fn connection_url(&self) -> &str {
        &self.url
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    /// Token lifetime, e.g. "30d"
    pub jwt_expire: String,
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expire: DEFAULT_TOKEN_TTL.to_string(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &if self.jwt_secret.is_empty() { "<unset>" } else { "<redacted>" })
            .field("jwt_expire", &self.jwt_expire)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

/// Credentials for the administrator seeded into an empty database
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin123".to_string(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "aiqiji_cms=debug,tower_http=info"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load from `path` (defaults if the file does not exist), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `JWT_SECRET`, `JWT_EXPIRE`, `DATABASE_URL` and `PORT` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            self.security.jwt_secret = secret;
        }
        if let Some(expire) = lookup("JWT_EXPIRE").filter(|s| !s.trim().is_empty()) {
            self.security.jwt_expire = expire;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()) {
            self.database.url = url;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
    }

    /// Reject configurations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token_ttl()?;

        if self.security.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                field: "security.bcrypt_cost",
                reason: format!("{} is outside 4..=31", self.security.bcrypt_cost),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.admin.password.chars().count() < crate::application::identity::MIN_PASSWORD_LEN {
            return Err(ConfigError::InvalidValue {
                field: "admin.password",
                reason: "must be at least 6 characters".to_string(),
            });
        }

        Ok(())
    }

    pub fn token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_ttl(&self.security.jwt_expire)
            // Claims carry whole seconds
            .filter(|ttl| *ttl >= Duration::from_secs(1))
            .ok_or_else(|| ConfigError::InvalidTtl(self.security.jwt_expire.clone()))
    }

    pub fn jwt_config(&self) -> Result<JwtConfig, ConfigError> {
        if self.security.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(JwtConfig::new(self.security.jwt_secret.clone(), self.token_ttl()?))
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
        }
    }
}

/// Default config file location: `$AIQIJI_CONFIG` or `<config dir>/aiqiji-cms/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aiqiji-cms")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8181);
        assert_eq!(config.security.jwt_expire, "30d");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(
            config.token_ttl().unwrap(),
            Duration::from_secs(30 * 86_400)
        );
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingSecret)));
        assert!(matches!(config.jwt_config(), Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            port = 9090

            [security]
            jwt_secret = "from-file"
            jwt_expire = "12h"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
        assert_eq!(config.jwt_config().unwrap().ttl, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = AppConfig::from_toml_str("[security]\njwt_secret = \"file\"").unwrap();
        let vars = env(&[
            ("JWT_SECRET", "from-env"),
            ("JWT_EXPIRE", "7d"),
            ("DATABASE_URL", "mysql://root:pw@localhost/aiqiji"),
            ("PORT", "3000"),
        ]);
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.security.jwt_secret, "from-env");
        assert_eq!(config.token_ttl().unwrap(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.database.connection_url(), "mysql://root:pw@localhost/aiqiji");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.security.jwt_secret = "kept".to_string();
        let vars = env(&[("JWT_SECRET", "  "), ("PORT", "not-a-port")]);
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.security.jwt_secret, "kept");
        assert_eq!(config.server.port, 8181);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.security.jwt_secret = "s".to_string();

        config.security.jwt_expire = "soon".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl(_))));

        config.security.jwt_expire = "0s".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl(_))));

        config.security.jwt_expire = "500ms".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTtl(_))));

        config.security.jwt_expire = "1000ms".to_string();
        assert_eq!(config.token_ttl().unwrap(), Duration::from_secs(1));

        config.security.jwt_expire = "1h".to_string();
        config.security.bcrypt_cost = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "security.bcrypt_cost", .. })
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("aiqiji-cms-does-not-exist.toml");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.admin.username, "admin");
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let mut config = AppConfig::default();
        config.security.jwt_secret = "top-secret".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("admin123"));
    }
}
