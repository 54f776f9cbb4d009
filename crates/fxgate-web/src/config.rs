//! Startup configuration.
//!
//! Layers, later ones winning:
//!
//! | Layer | Source |
//! |-------|--------|
//! | defaults | [`AppConfig::default`] |
//! | file | JSON file (`--config`, else `fxgate.json` when present) |
//! | environment | `FXGATE_*` variables, see [`ENV_OVERRIDES`] |
//! | flags | command-line options applied by the binary |
//!
//! The resulting config is immutable for the lifetime of the process.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fxgate_core::{
    Backoff, CacheTtls, CircuitBreakerConfig, ProviderId, ProviderPolicy, RetryConfig,
    FRANKFURTER_SERVICE_ID,
};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "fxgate.json";

/// Environment variables recognized as overrides.
pub const ENV_OVERRIDES: [&str; 8] = [
    "FXGATE_BIND",
    "FXGATE_UPSTREAM_BASE_URL",
    "FXGATE_RETRY_COUNT",
    "FXGATE_BREAK_AFTER_ATTEMPTS",
    "FXGATE_BREAK_DURATION_SECONDS",
    "FXGATE_JWT_SIGNING_KEY",
    "FXGATE_JWT_ISSUER",
    "FXGATE_JWT_AUDIENCE",
];

/// Shortest HS256 signing key accepted, in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: '{value}'")]
    InvalidOverride { name: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub overall_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(fxgate_core::frankfurter::DEFAULT_BASE_URL),
            request_timeout_ms: 3_000,
            overall_timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    pub retry_count: u32,
    pub break_after_attempts: u32,
    pub break_duration_seconds: u64,
    pub backoff_base_ms: u64,
    /// Upper bound for one backoff delay. Unset means the delay keeps doubling.
    pub backoff_max_ms: Option<u64>,
    pub jitter: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            break_after_attempts: 5,
            break_duration_seconds: 30,
            backoff_base_ms: 1_000,
            backoff_max_ms: None,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub latest_ttl_seconds: u64,
    pub historical_ttl_seconds: u64,
    /// How often expired entries are dropped from the in-memory store.
    pub purge_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            latest_ttl_seconds: 600,
            historical_ttl_seconds: 1_800,
            purge_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub request_limit: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            request_limit: 10,
            window_seconds: 60,
        }
    }
}

/// JWT bearer validation settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 shared secret. Empty rejects every token.
    pub signing_key: String,
    pub issuer: String,
    pub audience: String,
    pub clock_skew_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            issuer: String::from("fxgate"),
            audience: String::from("fxgate-clients"),
            clock_skew_seconds: 300,
        }
    }
}

impl AuthConfig {
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub upstream: UpstreamConfig,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
    /// Service id to provider name.
    pub services: BTreeMap<String, String>,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    /// Deadline for handling one inbound request.
    pub request_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            String::from(FRANKFURTER_SERVICE_ID),
            ProviderId::Frankfurter.as_str().to_owned(),
        );
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            upstream: UpstreamConfig::default(),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
            services,
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
            request_timeout_ms: 30_000,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the config file, then environment overrides.
    ///
    /// An explicit `path` must exist; without one, [`DEFAULT_CONFIG_FILE`] is
    /// read only if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FXGATE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FXGATE_BIND") {
            self.bind = parse_override("FXGATE_BIND", &value)?;
        }
        if let Some(value) = lookup("FXGATE_UPSTREAM_BASE_URL") {
            self.upstream.base_url = value;
        }
        if let Some(value) = lookup("FXGATE_RETRY_COUNT") {
            self.resilience.retry_count = parse_override("FXGATE_RETRY_COUNT", &value)?;
        }
        if let Some(value) = lookup("FXGATE_BREAK_AFTER_ATTEMPTS") {
            self.resilience.break_after_attempts =
                parse_override("FXGATE_BREAK_AFTER_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("FXGATE_BREAK_DURATION_SECONDS") {
            self.resilience.break_duration_seconds =
                parse_override("FXGATE_BREAK_DURATION_SECONDS", &value)?;
        }
        if let Some(value) = lookup("FXGATE_JWT_SIGNING_KEY") {
            self.auth.signing_key = value;
        }
        if let Some(value) = lookup("FXGATE_JWT_ISSUER") {
            self.auth.issuer = value;
        }
        if let Some(value) = lookup("FXGATE_JWT_AUDIENCE") {
            self.auth.audience = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resilience.break_after_attempts == 0 {
            return Err(ConfigError::Invalid(String::from(
                "resilience.break_after_attempts must be at least 1",
            )));
        }
        if self.rate_limit.request_limit == 0 || self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::Invalid(String::from(
                "rate_limit.request_limit and rate_limit.window_seconds must be at least 1",
            )));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "upstream.base_url must not be empty",
            )));
        }
        if !self.auth.signing_key.is_empty() && self.auth.signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "auth.signing_key must be at least {MIN_SIGNING_KEY_LEN} bytes"
            )));
        }
        if self.auth.issuer.trim().is_empty() || self.auth.audience.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "auth.issuer and auth.audience must not be empty",
            )));
        }
        if self.cache.purge_interval_seconds == 0 {
            return Err(ConfigError::Invalid(String::from(
                "cache.purge_interval_seconds must be at least 1",
            )));
        }
        Ok(())
    }

    /// Resilience, timeout and cache settings for `provider`.
    pub fn provider_policy(&self, provider: ProviderId) -> ProviderPolicy {
        ProviderPolicy {
            provider_id: provider,
            base_url: self.upstream.base_url.clone(),
            request_timeout: Duration::from_millis(self.upstream.request_timeout_ms),
            overall_timeout: Duration::from_millis(self.upstream.overall_timeout_ms),
            retry: RetryConfig {
                max_retries: self.resilience.retry_count,
                backoff: Backoff::Exponential {
                    base: Duration::from_millis(self.resilience.backoff_base_ms),
                    factor: 2.0,
                    max: self
                        .resilience
                        .backoff_max_ms
                        .map_or(Duration::MAX, Duration::from_millis),
                    jitter: self.resilience.jitter,
                },
            },
            circuit: CircuitBreakerConfig {
                failure_threshold: self.resilience.break_after_attempts,
                open_timeout: Duration::from_secs(self.resilience.break_duration_seconds),
            },
            cache_ttls: CacheTtls {
                latest: Duration::from_secs(self.cache.latest_ttl_seconds),
                historical: Duration::from_secs(self.cache.historical_ttl_seconds),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_seconds)
    }

    pub fn cache_purge_interval(&self) -> Duration {
        Duration::from_secs(self.cache.purge_interval_seconds)
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            name: name.to_owned(),
            value: value.to_owned(),
        })
}
