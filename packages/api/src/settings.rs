//! Service configuration, layered with the `config` crate.
//!
//! Sources, later ones winning: built-in defaults, an optional `config.toml`,
//! `NOTES_<SECTION>__<KEY>` environment variables, then the short legacy names
//! (`DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `PORT`,
//! `JWT_SECRET`). The defaults are for local development only.

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment as EnvSource, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub max_connections: u32,
    /// Upper bound for a single store call issued by a handler.
    pub timeout_ms: u64,
}

impl Database {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            user: "postgres".into(),
            password: "postgres".into(),
            host: "localhost".into(),
            port: 5432,
            name: "authdb".into(),
            max_connections: 5,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: vec!["http://localhost:3000".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    /// HMAC key for session tokens. Empty means "not configured".
    pub secret: String,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Audit {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for Audit {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub environment: Environment,
    pub database: Database,
    pub server: Server,
    pub auth: AuthSettings,
    pub audit: Audit,
}

/// Legacy variable name → settings key.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_NAME", "database.name"),
    ("PORT", "server.port"),
    ("JWT_SECRET", "auth.secret"),
];

impl Settings {
    /// Load from the process environment.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load with an explicit environment map in place of the process environment.
    pub fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| -> Option<String> {
            match &env {
                Some(map) => map.get(key).cloned(),
                None => std::env::var(key).ok(),
            }
            .filter(|v| !v.is_empty())
        };

        let defaults = Database::default();
        let mut builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("database.user", defaults.user)?
            .set_default("database.password", defaults.password)?
            .set_default("database.host", defaults.host)?
            .set_default("database.port", i64::from(defaults.port))?
            .set_default("database.name", defaults.name)?
            .set_default("database.max_connections", i64::from(defaults.max_connections))?
            .set_default("database.timeout_ms", defaults.timeout_ms as i64)?
            .set_default("server.port", 8080)?
            .set_default("server.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("auth.secret", "")?
            .set_default("auth.secure_cookie", false)?
            .set_default("audit.enabled", true)?
            .set_default("audit.capacity", 1024)?
            .add_source(
                File::with_name("config.toml")
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                EnvSource::with_prefix("NOTES")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true)
                    .source(env.clone()),
            );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if settings.environment == Environment::Production {
            settings.auth.secure_cookie = true;
        }
        Ok(settings)
    }
}
