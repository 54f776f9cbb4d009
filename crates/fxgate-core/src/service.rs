//! Exchange rate service contract and the Frankfurter-backed implementation.
//!
//! # Operations
//!
//! | Operation | Cache key | TTL |
//! |-----------|-----------|-----|
//! | [`ExchangeRateService::latest_rates`] | `latest:{BASE}` | 10 min |
//! | [`ExchangeRateService::convert`] | via `latest_rates` | 10 min |
//! | [`ExchangeRateService::historical_rates`] | `historical:{BASE}:{start}:{end}` | 30 min |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::cache::{CacheAside, CacheStore};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::frankfurter::FrankfurterClient;
use crate::http_client::HttpClient;
use crate::provider_policy::{CacheTtls, ProviderPolicy};
use crate::resilience::ResilientTransport;
use crate::{
    is_excluded_currency, ConversionRequest, CurrencyCode, DateRange, HistoricalRateSeries,
    ProviderId, RateError, RateSnapshot, ValidationError,
};

pub type RateFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RateError>> + Send + 'a>>;

/// Exchange rate operations backed by one upstream provider.
pub trait ExchangeRateService: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn circuit_state(&self) -> CircuitState;

    fn latest_rates<'a>(&'a self, base: &'a CurrencyCode) -> RateFuture<'a, RateSnapshot>;

    /// Convert `amount` units of `from` into `to` using the latest rates of `from`.
    fn convert<'a>(&'a self, request: &'a ConversionRequest) -> RateFuture<'a, Decimal>;

    fn historical_rates<'a>(
        &'a self,
        base: &'a CurrencyCode,
        range: DateRange,
    ) -> RateFuture<'a, HistoricalRateSeries>;
}

pub fn latest_cache_key(base: &CurrencyCode) -> String {
    format!("latest:{base}")
}

pub fn historical_cache_key(base: &CurrencyCode, range: &DateRange) -> String {
    format!("historical:{base}:{}:{}", range.start(), range.end())
}

/// Cache-aside service over the Frankfurter API.
pub struct FrankfurterExchangeRateService {
    client: FrankfurterClient,
    cache: CacheAside,
    ttls: CacheTtls,
}

impl FrankfurterExchangeRateService {
    pub fn new(client: FrankfurterClient, cache: CacheAside, ttls: CacheTtls) -> Self {
        Self {
            client,
            cache,
            ttls,
        }
    }

    /// Wire a service from its policy: one breaker per service instance,
    /// shared by every call it makes.
    pub fn from_policy(
        policy: &ProviderPolicy,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(policy.circuit));
        let transport = ResilientTransport::new(
            policy.provider_id,
            http_client,
            policy.retry.clone(),
            breaker,
            policy.overall_timeout,
        );
        let client = FrankfurterClient::new(
            policy.base_url.clone(),
            policy.request_timeout_ms(),
            transport,
        );
        Self::new(client, CacheAside::new(store), policy.cache_ttls)
    }

    async fn cached_latest(&self, base: &CurrencyCode) -> Result<RateSnapshot, RateError> {
        let key = latest_cache_key(base);
        self.cache
            .get_or_fetch(&key, self.ttls.latest, || async {
                info!(base = %base, "fetching latest rates from upstream");
                self.client.latest(base).await
            })
            .await
    }

    async fn cached_historical(
        &self,
        base: &CurrencyCode,
        range: DateRange,
    ) -> Result<HistoricalRateSeries, RateError> {
        if range.is_inverted() {
            warn!(base = %base, range = %range, "inverted date range, returning empty series");
            return Ok(HistoricalRateSeries::new(base.clone(), Default::default()));
        }

        let key = historical_cache_key(base, &range);
        self.cache
            .get_or_fetch(&key, self.ttls.historical, || async {
                info!(base = %base, range = %range, "fetching historical rates from upstream");
                self.client.range(base, &range).await
            })
            .await
    }

    async fn convert_amount(&self, request: &ConversionRequest) -> Result<Decimal, RateError> {
        if is_excluded_currency(&request.from) || is_excluded_currency(&request.to) {
            return Err(RateError::UnsupportedCurrency {
                from: request.from.clone(),
                to: request.to.clone(),
            });
        }
        if request.amount <= Decimal::ZERO {
            return Err(ValidationError::AmountNotPositive.into());
        }

        let from = CurrencyCode::parse(&request.from)?;
        let to = CurrencyCode::parse(&request.to)?;

        let snapshot = self.cached_latest(&from).await?;
        let rate = snapshot
            .rate(&to)
            .ok_or_else(|| RateError::RateNotFound { currency: to.clone() })?;

        request
            .amount
            .checked_mul(rate)
            .ok_or_else(|| ValidationError::AmountOutOfRange.into())
    }
}

impl ExchangeRateService for FrankfurterExchangeRateService {
    fn provider(&self) -> ProviderId {
        ProviderId::Frankfurter
    }

    fn circuit_state(&self) -> CircuitState {
        self.client.transport().circuit_state()
    }

    fn latest_rates<'a>(&'a self, base: &'a CurrencyCode) -> RateFuture<'a, RateSnapshot> {
        Box::pin(async move {
            self.cached_latest(base).await.inspect_err(|e| {
                error!(base = %base, code = e.code(), error = %e, "latest rates lookup failed");
            })
        })
    }

    fn convert<'a>(&'a self, request: &'a ConversionRequest) -> RateFuture<'a, Decimal> {
        Box::pin(async move {
            self.convert_amount(request).await.inspect_err(|e| {
                error!(
                    from = %request.from,
                    to = %request.to,
                    amount = %request.amount,
                    code = e.code(),
                    error = %e,
                    "currency conversion failed"
                );
            })
        })
    }

    fn historical_rates<'a>(
        &'a self,
        base: &'a CurrencyCode,
        range: DateRange,
    ) -> RateFuture<'a, HistoricalRateSeries> {
        Box::pin(async move {
            self.cached_historical(base, range).await.inspect_err(|e| {
                error!(
                    base = %base,
                    range = %range,
                    code = e.code(),
                    error = %e,
                    "historical rates lookup failed"
                );
            })
        })
    }
}
