use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::frankfurter::DEFAULT_BASE_URL;
use crate::{ProviderId, RetryConfig};

/// Cache lifetimes for the two cacheable lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub latest: Duration,
    pub historical: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            latest: Duration::from_secs(10 * 60),
            historical: Duration::from_secs(30 * 60),
        }
    }
}

/// Everything needed to build one upstream-backed exchange rate service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub base_url: String,
    /// Deadline of a single transport attempt.
    pub request_timeout: Duration,
    /// Deadline of a whole call, retries and backoff included.
    pub overall_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit: CircuitBreakerConfig,
    pub cache_ttls: CacheTtls,
}

impl ProviderPolicy {
    pub fn frankfurter_default() -> Self {
        Self {
            provider_id: ProviderId::Frankfurter,
            base_url: String::from(DEFAULT_BASE_URL),
            request_timeout: Duration::from_secs(3),
            overall_timeout: Duration::from_secs(20),
            retry: RetryConfig::exponential(3),
            circuit: CircuitBreakerConfig {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(30),
            },
            cache_ttls: CacheTtls::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Frankfurter => Self::frankfurter_default(),
        }
    }

    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
