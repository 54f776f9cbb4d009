//! # fxgate web
//!
//! HTTP surface for the exchange rate service.
//!
//! | Method | Path | Role |
//! |--------|------|------|
//! | `GET` | `/api/v1/rates/latest` | user |
//! | `POST` | `/api/v1/rates/convert` | admin |
//! | `GET` | `/api/v1/rates/historical` | user |
//! | `GET` | `/api/v1/health` | none |
//!
//! Every request passes request logging, the inbound timeout and per-client
//! throttling, in that order.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod throttling;

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use fxgate_core::{HttpClient, InMemoryCacheStore, ProviderId, RateError, ServiceRegistry};
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tracing::debug;

use crate::auth::JwtAuthenticator;
use crate::config::AppConfig;
use crate::throttling::ClientRateLimiter;

/// Shared, immutable application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: ServiceRegistry,
    cache: InMemoryCacheStore,
    authenticator: JwtAuthenticator,
    limiter: ClientRateLimiter,
    request_timeout: Duration,
}

impl AppState {
    /// `cache` must be the store the registry's services write to, so that
    /// housekeeping purges the entries they create.
    pub fn new(
        registry: ServiceRegistry,
        cache: InMemoryCacheStore,
        authenticator: JwtAuthenticator,
        limiter: ClientRateLimiter,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                cache,
                authenticator,
                limiter,
                request_timeout,
            }),
        }
    }

    /// Build the registry, cache, authenticator and limiter described by `config`.
    pub fn from_config(
        config: &AppConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, RateError> {
        let cache = InMemoryCacheStore::new();
        let registry = ProviderId::ALL
            .into_iter()
            .fold(ServiceRegistry::builder(), |builder, provider| {
                builder.with_policy(config.provider_policy(provider))
            })
            .with_mappings(config.services.clone())
            .with_http_client(http_client)
            .with_cache_store(Arc::new(cache.clone()))
            .build()?;

        Ok(Self::new(
            registry,
            cache,
            JwtAuthenticator::new(&config.auth),
            ClientRateLimiter::new(config.rate_limit_window(), config.rate_limit.request_limit),
            config.request_timeout(),
        ))
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &InMemoryCacheStore {
        &self.inner.cache
    }

    pub fn authenticator(&self) -> &JwtAuthenticator {
        &self.inner.authenticator
    }

    pub fn limiter(&self) -> &ClientRateLimiter {
        &self.inner.limiter
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/latest", get(handlers::latest_rates))
        .route("/historical", get(handlers::historical_rates))
        .route_layer(from_fn_with_state(state.clone(), auth::require_user));

    let admin_routes = Router::new()
        .route("/convert", post(handlers::convert))
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin));

    let api = Router::new()
        .nest("/rates", user_routes.merge(admin_routes))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(TimeoutLayer::new(state.request_timeout()))
        .layer(from_fn_with_state(state.clone(), middleware::request_logging))
        .with_state(state)
}

/// Periodically drop expired cache entries and idle limiter keys.
///
/// Cached keys are caller-chosen (one per base and date range), so without
/// this the store only grows.
pub fn spawn_housekeeping(
    state: AppState,
    cache_every: Duration,
    limiter_every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cache_ticker = tokio::time::interval(cache_every);
        let mut limiter_ticker = tokio::time::interval(limiter_every);
        loop {
            tokio::select! {
                _ = cache_ticker.tick() => {
                    let purged = state.cache().clear_expired().await;
                    if purged > 0 {
                        debug!(purged, "expired cache entries dropped");
                    }
                }
                _ = limiter_ticker.tick() => state.limiter().retain_recent(),
            }
        }
    })
}
