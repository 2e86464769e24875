use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_JWT_SECRET: &str = "change-me-this-secret-is-only-for-local-dev";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub migrate_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
    /// Seed account created when the users table is empty.
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageBackend {
    Database,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: MessageBackend,
    /// Directory holding the slot files of the local backend.
    pub data_dir: PathBuf,
    pub max_messages: usize,
    /// Keep an in-memory fallback medium for writes the directory refuses.
    pub memory_fallback: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./portfolio.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            migrate_on_start: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration_hours: 24,
            admin_username: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "admin123".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_seconds: 15 * 60,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: MessageBackend::Database,
            data_dir: PathBuf::from("./data"),
            max_messages: 100,
            memory_fallback: true,
        }
    }
}

impl AppConfig {
    /// Defaults, then `config.toml` when present, then `APP_*` variables
    /// (`APP_AUTH__JWT_SECRET` sets `auth.jwt_secret`).
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?);

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port cannot be 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max connections must be greater than 0".to_string(),
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Using default JWT secret - change this in production!");
        }

        if self.auth.jwt_expiration_hours == 0 {
            return Err(ConfigError::Message(
                "JWT expiration must be at least one hour".to_string(),
            ));
        }

        if self.auth.admin_username.trim().is_empty() || self.auth.admin_password.len() < 6 {
            return Err(ConfigError::Message(
                "Seed admin needs a username and a password of at least 6 characters".to_string(),
            ));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_seconds == 0)
        {
            return Err(ConfigError::Message(
                "Rate limit needs a positive request count and window".to_string(),
            ));
        }

        if self.store.max_messages == 0 {
            return Err(ConfigError::Message(
                "Store max messages must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
