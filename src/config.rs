use serde::Deserialize;
use thiserror::Error;

/// Config file read when `FOLIO_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "folio.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Mongodb,
}

/// Application settings loaded from `folio.toml`.
/// Rocket's own settings (address, port, secret key) stay in `Rocket.toml` / `ROCKET_*`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    /// SQLite database file
    pub path: String,
    /// MongoDB connection string
    pub uri: String,
    /// MongoDB database name
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: Backend::Sqlite,
            path: "data/folio.db".to_string(),
            uri: "mongodb://localhost:27017".to_string(),
            name: "folio".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_days: i64,
    pub secure_cookie: bool,
    /// Login attempts allowed per IP in a 15 minute window
    pub login_rate_limit: u64,
    pub password_cost: u32,
    pub bootstrap_admin_name: String,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            session_days: 7,
            secure_cookie: false,
            login_rate_limit: 5,
            password_cost: bcrypt::DEFAULT_COST,
            bootstrap_admin_name: "Admin".to_string(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub contact_per_hour: u64,
    pub comments_per_hour: u64,
    pub subscribe_per_hour: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            contact_per_hour: 5,
            comments_per_hour: 5,
            subscribe_per_hour: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub session_cleanup_minutes: u64,
    pub activity_retention_days: i64,
    pub analytics_retention_days: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        MaintenanceConfig {
            enabled: true,
            session_cleanup_minutes: 30,
            activity_retention_days: 90,
            analytics_retention_days: 365,
        }
    }
}

impl Config {
    /// Load from `$FOLIO_CONFIG` or `folio.toml`. A missing file yields the defaults.
    pub fn load() -> Result<Config, ConfigError> {
        let path =
            std::env::var("FOLIO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        match std::fs::read_to_string(&path) {
            Ok(raw) => Config::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{} not found, using default configuration", path);
                Ok(Config::default())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.database.backend, Backend::Sqlite);
        assert_eq!(config.auth.session_days, 7);
        assert!(config.maintenance.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [database]
            backend = "mongodb"
            name = "portfolio"

            [auth]
            session_days = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.database.backend, Backend::Mongodb);
        assert_eq!(config.database.name, "portfolio");
        assert_eq!(config.database.uri, "mongodb://localhost:27017");
        assert_eq!(config.auth.session_days, 3);
        assert_eq!(config.auth.login_rate_limit, 5);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_toml_str("[database]\nbackend = \"postgres\"\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }
}
