//! API Configuration Module
//!
//! Reads server, backend, cache and loader settings from `PENNANT_*`
//! environment variables. Unset variables fall back to defaults; set but
//! unparseable values are rejected so a typo never silently turns a feature
//! off.

use pennant_core::settings::{env_setting, parse_flag, parse_setting};
use pennant_core::ConfigError;
use pennant_storage::{CacheConfig, LoaderConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which record store backs the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL through a deadpool connection pool
    Postgres,
    /// Process-local store, seeded with demo data on startup
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(ConfigError::invalid("PENNANT_STORE", other, "expected 'postgres' or 'memory'")),
        }
    }
}

/// Which key-value cache sits in front of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::invalid("PENNANT_CACHE", other, "expected 'memory' or 'lmdb'")),
        }
    }
}

/// Top-level API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    pub store_backend: StoreBackend,
    pub cache_backend: CacheBackendKind,
    /// Directory of the LMDB environment when `cache_backend` is LMDB
    pub lmdb_path: PathBuf,
    pub lmdb_max_size_mb: usize,
    /// Entry TTL and key prefix for every repository
    pub cache: CacheConfig,
    /// Flush window and batch bound for every request's loaders
    pub loader: LoaderConfig,
    /// Deadline for a whole GraphQL request, loaders included
    pub request_timeout: Duration,
    /// Attach the `ftv1` resolver trace to responses
    pub tracing_enabled: bool,
    /// Number of demo campaigns seeded into the memory store
    pub seed_campaigns: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            store_backend: StoreBackend::Memory,
            cache_backend: CacheBackendKind::Memory,
            lmdb_path: PathBuf::from("./data/cache"),
            lmdb_max_size_mb: 256,
            cache: CacheConfig::default(),
            loader: LoaderConfig::default(),
            request_timeout: Duration::from_secs(30),
            tracing_enabled: true,
            seed_campaigns: 500,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(env_setting)
    }

    /// Same as [`ApiConfig::from_env`], reading settings through `lookup`.
    pub fn from_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: lookup("PENNANT_HOST").unwrap_or(defaults.host),
            port: parse_setting("PENNANT_PORT", lookup("PENNANT_PORT"))?.unwrap_or(defaults.port),
            store_backend: parse_setting("PENNANT_STORE", lookup("PENNANT_STORE"))?
                .unwrap_or(defaults.store_backend),
            cache_backend: parse_setting("PENNANT_CACHE", lookup("PENNANT_CACHE"))?
                .unwrap_or(defaults.cache_backend),
            lmdb_path: lookup("PENNANT_LMDB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_max_size_mb: parse_setting("PENNANT_LMDB_MAX_SIZE_MB", lookup("PENNANT_LMDB_MAX_SIZE_MB"))?
                .unwrap_or(defaults.lmdb_max_size_mb),
            cache: CacheConfig::from_settings(&lookup)?,
            loader: LoaderConfig::from_settings(&lookup)?,
            request_timeout: parse_setting::<u64>(
                "PENNANT_REQUEST_TIMEOUT_MS",
                lookup("PENNANT_REQUEST_TIMEOUT_MS"),
            )?
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout),
            tracing_enabled: parse_flag("PENNANT_TRACING_ENABLED", lookup("PENNANT_TRACING_ENABLED"))?
                .unwrap_or(defaults.tracing_enabled),
            seed_campaigns: parse_setting("PENNANT_SEED_CAMPAIGNS", lookup("PENNANT_SEED_CAMPAIGNS"))?
                .unwrap_or(defaults.seed_campaigns),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "PENNANT_REQUEST_TIMEOUT_MS",
                "0",
                "request timeout must be positive",
            ));
        }
        if self.seed_campaigns < 0 {
            return Err(ConfigError::invalid(
                "PENNANT_SEED_CAMPAIGNS",
                &self.seed_campaigns.to_string(),
                "must not be negative",
            ));
        }
        Ok(())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Socket address to bind the HTTP listener on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::invalid("PENNANT_HOST", &self.host, "not an IP address"))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Postgres".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("LMDB".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Lmdb));
        assert!("redis".parse::<CacheBackendKind>().is_err());
    }

    #[test]
    fn test_bind_addr() -> Result<(), ConfigError> {
        let config = ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 9100,
            ..ApiConfig::default()
        };
        assert_eq!(config.bind_addr()?.to_string(), "127.0.0.1:9100");

        let bad = ApiConfig {
            host: "not-an-ip".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ApiConfig::default().with_request_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "PENNANT_REQUEST_TIMEOUT_MS"
        ));
    }

    fn settings(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_from_settings_reads_nested_configs() -> Result<(), ConfigError> {
        let config = ApiConfig::from_settings(settings(&[
            ("PENNANT_PORT", "9200"),
            ("PENNANT_STORE", "memory"),
            ("PENNANT_CACHE_TTL_SECS", "45"),
            ("PENNANT_LOADER_MAX_BATCH_SIZE", "10"),
            ("PENNANT_TRACING_ENABLED", "0"),
        ]))?;
        assert_eq!(config.port, 9200);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.cache.entry_ttl, Duration::from_secs(45));
        assert_eq!(config.loader.max_batch_size, 10);
        assert!(!config.tracing_enabled);
        Ok(())
    }

    #[test]
    fn test_malformed_cache_ttl_is_rejected() {
        let result = ApiConfig::from_settings(settings(&[("PENNANT_CACHE_TTL_SECS", "5min")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, value, .. })
                if field == "PENNANT_CACHE_TTL_SECS" && value == "5min"
        ));
    }

    #[test]
    fn test_malformed_loader_setting_is_rejected() {
        let result = ApiConfig::from_settings(settings(&[("PENNANT_LOADER_MEMOIZE", "maybe")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "PENNANT_LOADER_MEMOIZE"
        ));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.tracing_enabled);
        assert_eq!(config.seed_campaigns, 500);
    }
}
