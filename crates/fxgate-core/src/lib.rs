//! # fxgate core
//!
//! Exchange rate lookups and currency conversion over pluggable upstream
//! providers.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache-aside layer and in-memory TTL store |
//! | [`circuit_breaker`] | Consecutive-failure circuit breaker |
//! | [`domain`] | Currency codes, dates, rate tables and requests |
//! | [`error`] | Validation and service error taxonomy |
//! | [`factory`] | Service-id registry |
//! | [`frankfurter`] | Frankfurter API client |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider_policy`] | Per-provider timeouts, retry, breaker and TTLs |
//! | [`resilience`] | Retry and breaker composition around the transport |
//! | [`retry`] | Backoff schedules |
//! | [`service`] | Exchange rate service contract |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fxgate_core::{ConversionRequest, ServiceRegistry};
//!
//! let registry = ServiceRegistry::builder().build()?;
//! let service = registry.resolve("1011")?;
//! let request = ConversionRequest::new("USD", "EUR", "100".parse()?)?;
//! let converted = service.convert(&request).await?;
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod domain;
pub mod error;
pub mod factory;
pub mod frankfurter;
pub mod http_client;
pub mod provider_policy;
pub mod resilience;
pub mod retry;
pub mod service;
pub mod source;

pub use cache::{CacheAside, CacheError, CacheStore, InMemoryCacheStore};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit, CircuitState};
pub use domain::{
    is_excluded_currency, ConversionRequest, CurrencyCode, DateRange, HistoricalRateSeries,
    RateDate, RateSnapshot, RateTable, ServiceId, EXCLUDED_CURRENCIES,
};
pub use error::{RateError, ValidationError};
pub use factory::{RegisteredService, ServiceRegistry, ServiceRegistryBuilder, FRANKFURTER_SERVICE_ID};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient,
};
pub use provider_policy::{CacheTtls, ProviderPolicy};
pub use retry::{Backoff, RetryConfig};
pub use service::{ExchangeRateService, FrankfurterExchangeRateService, RateFuture};
pub use source::ProviderId;
