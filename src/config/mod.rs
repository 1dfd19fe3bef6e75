//! Configuration management
//!
//! Configuration for the Ruifeng music server is loaded from a YAML file
//! (`config.yml` by default) and then overridden by environment variables.
//! Missing values are filled with defaults, so an absent or empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Access/refresh token configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Content module configuration
    #[serde(default)]
    pub content: ContentConfig,
    /// Meilisearch connection
    #[serde(default)]
    pub meilisearch: MeilisearchConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// API path prefix, routes are served under `/{prefix}/v1`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// CORS allowed origin. Any origin is allowed when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            prefix: default_prefix(),
            cors_origin: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3100
}

fn default_prefix() -> String {
    "api".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/ruifeng.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL (optional)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// In-memory cache (default)
    #[default]
    Memory,
    /// Redis cache
    Redis,
}

/// Token lifetimes and signing secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token lifetime in seconds
    #[serde(default = "default_token_expired")]
    pub token_expired: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_expired")]
    pub refresh_token_expired: i64,
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    #[serde(default = "default_refresh_token_secret")]
    pub refresh_token_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expired: default_token_expired(),
            refresh_token_expired: default_refresh_token_expired(),
            token_secret: default_token_secret(),
            refresh_token_secret: default_refresh_token_secret(),
        }
    }
}

fn default_token_expired() -> i64 {
    3600
}

fn default_refresh_token_expired() -> i64 {
    3600 * 30
}

fn default_token_secret() -> String {
    "my-access-secret".to_string()
}

fn default_refresh_token_secret() -> String {
    "my-refresh-secret".to_string()
}

/// Content module configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Sanitize bodies of `html` posts before storing them
    #[serde(default)]
    pub html_enabled: bool,
    /// Backend used for the post `search` filter
    #[serde(default)]
    pub search_type: SearchType,
}

/// Post search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// LIKE queries against the database (default)
    #[default]
    Database,
    /// Full-text queries against a Meilisearch index
    Meilisearch,
}

/// Meilisearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeilisearchConfig {
    #[serde(default = "default_meilisearch_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Index uid holding post documents
    #[serde(default = "default_meilisearch_index")]
    pub index: String,
}

impl Default for MeilisearchConfig {
    fn default() -> Self {
        Self {
            host: default_meilisearch_host(),
            api_key: None,
            index: default_meilisearch_index(),
        }
    }
}

fn default_meilisearch_host() -> String {
    "http://localhost:7700".to_string()
}

fn default_meilisearch_index() -> String {
    "posts".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns the default configuration.
    /// If the file exists but is invalid YAML, returns an error with its location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - RUIFENG_SERVER_HOST, RUIFENG_SERVER_PORT
    /// - RUIFENG_DATABASE_DRIVER, RUIFENG_DATABASE_URL
    /// - RUIFENG_CACHE_DRIVER, RUIFENG_REDIS_URL
    /// - RUIFENG_SEARCH_TYPE, RUIFENG_MEILISEARCH_HOST, RUIFENG_MEILISEARCH_API_KEY
    /// - USER_TOKEN_EXPIRED, USER_REFRESH_TOKEN_EXPIRED
    /// - USER_TOKEN_SECRET, USER_REFRESH_TOKEN_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url cannot be empty".to_string(),
            ));
        }
        if self.auth.token_expired <= 0 || self.auth.refresh_token_expired <= 0 {
            return Err(ConfigError::ValidationError(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.cache.driver == CacheDriver::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::ValidationError(
                "cache.redis_url is required for the redis driver".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("RUIFENG_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("RUIFENG_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Database configuration
        if let Ok(driver) = std::env::var("RUIFENG_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("RUIFENG_DATABASE_URL") {
            self.database.url = url;
        }

        // Cache configuration
        if let Ok(driver) = std::env::var("RUIFENG_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("RUIFENG_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }

        // Search configuration
        if let Ok(search_type) = std::env::var("RUIFENG_SEARCH_TYPE") {
            match search_type.to_lowercase().as_str() {
                "database" => self.content.search_type = SearchType::Database,
                "meilisearch" => self.content.search_type = SearchType::Meilisearch,
                _ => {}
            }
        }
        if let Ok(host) = std::env::var("RUIFENG_MEILISEARCH_HOST") {
            self.meilisearch.host = host;
        }
        if let Ok(key) = std::env::var("RUIFENG_MEILISEARCH_API_KEY") {
            self.meilisearch.api_key = Some(key);
        }

        // Token configuration
        if let Ok(expired) = std::env::var("USER_TOKEN_EXPIRED") {
            if let Ok(expired) = expired.parse::<i64>() {
                self.auth.token_expired = expired;
            }
        }
        if let Ok(expired) = std::env::var("USER_REFRESH_TOKEN_EXPIRED") {
            if let Ok(expired) = expired.parse::<i64>() {
                self.auth.refresh_token_expired = expired;
            }
        }
        if let Ok(secret) = std::env::var("USER_TOKEN_SECRET") {
            self.auth.token_secret = secret;
        }
        if let Ok(secret) = std::env::var("USER_REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = secret;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "RUIFENG_SERVER_HOST",
    "RUIFENG_SERVER_PORT",
    "RUIFENG_DATABASE_DRIVER",
    "RUIFENG_DATABASE_URL",
    "RUIFENG_CACHE_DRIVER",
    "RUIFENG_REDIS_URL",
    "RUIFENG_SEARCH_TYPE",
    "RUIFENG_MEILISEARCH_HOST",
    "RUIFENG_MEILISEARCH_API_KEY",
    "USER_TOKEN_EXPIRED",
    "USER_REFRESH_TOKEN_EXPIRED",
    "USER_TOKEN_SECRET",
    "USER_REFRESH_TOKEN_SECRET",
];

#[cfg(test)]
fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}
