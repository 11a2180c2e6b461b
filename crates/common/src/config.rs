//! Application configuration.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cursor signing configuration.
    #[serde(default)]
    pub cursor: CursorConfig,
    /// External movie catalog configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Background job configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL. Without one the in-process cache is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            prefix: default_redis_prefix(),
        }
    }
}

/// Cursor signing configuration.
#[derive(Clone, Default, Deserialize)]
pub struct CursorConfig {
    /// HMAC secret for pagination cursors.
    #[serde(default)]
    pub secret: Option<String>,
}

impl fmt::Debug for CursorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CursorConfig {
    /// Whether a non-empty secret was configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Secret bytes for the cursor codec.
    ///
    /// Without a configured secret, 32 random bytes are generated. Cursors
    /// signed with a generated secret do not survive a restart.
    #[must_use]
    pub fn secret_bytes(&self) -> Vec<u8> {
        match &self.secret {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                use rand::RngCore;
                let mut buf = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut buf);
                buf
            }
        }
    }
}

/// External movie catalog (TMDb) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// TMDb API key. Without one, catalog sync is disabled.
    #[serde(default)]
    pub api_key: Option<String>,
    /// TMDb API base URL.
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    /// Release region filter.
    #[serde(default = "default_catalog_region")]
    pub region: String,
    /// Response language.
    #[serde(default = "default_catalog_language")]
    pub language: String,
    /// Discovery stops at the first result below this popularity.
    #[serde(default = "default_catalog_min_popularity")]
    pub min_popularity: f64,
    /// Original languages skipped during discovery.
    #[serde(default = "default_excluded_languages")]
    pub excluded_languages: Vec<String>,
    /// Concurrent external-id lookups during enrichment.
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_catalog_base_url(),
            region: default_catalog_region(),
            language: default_catalog_language(),
            min_popularity: default_catalog_min_popularity(),
            excluded_languages: default_excluded_languages(),
            enrich_concurrency: default_enrich_concurrency(),
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Run the weekly catalog sync.
    #[serde(default = "default_true")]
    pub catalog_sync_enabled: bool,
    /// Populate the catalog at startup when no movie exists.
    #[serde(default = "default_true")]
    pub seed_if_empty: bool,
    /// Run the monthly snapshot archival.
    #[serde(default = "default_true")]
    pub archive_enabled: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            catalog_sync_enabled: true,
            seed_if_empty: true,
            archive_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_redis_prefix() -> String {
    "cinekami".to_string()
}

fn default_catalog_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_catalog_region() -> String {
    "RO".to_string()
}

fn default_catalog_language() -> String {
    "en-US".to_string()
}

const fn default_catalog_min_popularity() -> f64 {
    3.0
}

fn default_excluded_languages() -> Vec<String> {
    [
        "hi", "ta", "te", "ml", "kn", "mr", "bn", "gu", "pa", "or", "as", "ne", "sd", "ur",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_enrich_concurrency() -> usize {
    10
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (best-effort, only populates the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `CINEKAMI_ENV`)
    /// 4. Environment variables with `CINEKAMI__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("CINEKAMI_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("CINEKAMI")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_allowed_origins")
            .with_list_parse_key("catalog.excluded_languages")
            .try_parsing(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/cinekami"
            "#,
        );
        assert_eq!(config.server.port, 8080);
        assert!(config.redis.url.is_none());
        assert_eq!(config.redis.prefix, "cinekami");
        assert!(!config.cursor.is_configured());
        assert_eq!(config.catalog.enrich_concurrency, 10);
        assert!(config.catalog.excluded_languages.contains(&"hi".to_string()));
        assert!(config.jobs.archive_enabled);
    }

    #[test]
    fn test_configured_secret_is_stable() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/cinekami"
            [cursor]
            secret = "s3cret"
            "#,
        );
        assert_eq!(config.cursor.secret_bytes(), b"s3cret".to_vec());
        assert_eq!(config.cursor.secret_bytes(), config.cursor.secret_bytes());
        assert!(config.cursor.is_configured());
    }

    #[test]
    fn test_empty_secret_is_not_configured() {
        let cursor = CursorConfig {
            secret: Some(String::new()),
        };
        assert!(!cursor.is_configured());
        assert_ne!(cursor.secret_bytes(), cursor.secret_bytes());
    }

    #[test]
    fn test_generated_secret_length() {
        let cursor = CursorConfig::default();
        assert_eq!(cursor.secret_bytes().len(), 32);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cursor = CursorConfig {
            secret: Some("s3cret".to_string()),
        };
        assert!(!format!("{cursor:?}").contains("s3cret"));
    }
}
