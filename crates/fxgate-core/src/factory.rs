//! Service-id to exchange rate service registry.
//!
//! The mapping is fixed at construction and never mutated, so lookups need no
//! locking. Every registered service owns its own circuit breaker; all of them
//! share one cache store and one HTTP client.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{error, info};

use crate::cache::{CacheStore, InMemoryCacheStore};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::service::{ExchangeRateService, FrankfurterExchangeRateService};
use crate::{ProviderId, RateError, ServiceId, ValidationError};

/// Service id registered out of the box.
pub const FRANKFURTER_SERVICE_ID: &str = "1011";

/// Registry entry exposed for health reporting.
#[derive(Clone)]
pub struct RegisteredService {
    pub id: ServiceId,
    pub service: Arc<dyn ExchangeRateService>,
}

/// Resolves service ids to exchange rate services.
pub struct ServiceRegistry {
    services: HashMap<ServiceId, Arc<dyn ExchangeRateService>>,
}

impl ServiceRegistry {
    pub fn new(services: impl IntoIterator<Item = (ServiceId, Arc<dyn ExchangeRateService>)>) -> Self {
        Self {
            services: services.into_iter().collect(),
        }
    }

    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    /// Look up the service registered under `service_id`.
    ///
    /// Blank and unknown ids both fail with a configuration error that lists
    /// the valid ids.
    pub fn resolve(&self, service_id: &str) -> Result<Arc<dyn ExchangeRateService>, RateError> {
        let found = ServiceId::parse(service_id)
            .ok()
            .and_then(|id| self.services.get(&id));
        if let Some(service) = found {
            return Ok(Arc::clone(service));
        }

        let valid_ids = self.valid_ids();
        let message = match ServiceId::parse(service_id) {
            Ok(id) => format!("Service not found for ID: {id}. Valid IDs are: {}", valid_ids.join(", ")),
            Err(e) => format!("{e} Valid IDs are: {}", valid_ids.join(", ")),
        };
        let error = RateError::Configuration { message, valid_ids };
        error!(service_id = service_id.trim(), error = %error, "service id did not resolve");
        Err(error)
    }

    pub fn valid_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .services
            .keys()
            .map(|id| id.as_str().to_owned())
            .collect();
        ids.sort();
        ids
    }

    /// Registered services ordered by id.
    pub fn services(&self) -> Vec<RegisteredService> {
        let mut entries: Vec<RegisteredService> = self
            .services
            .iter()
            .map(|(id, service)| RegisteredService {
                id: id.clone(),
                service: Arc::clone(service),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Builder wiring service ids to provider-backed services.
///
/// # Example
///
/// ```rust,ignore
/// use fxgate_core::ServiceRegistry;
///
/// let registry = ServiceRegistry::builder().build()?;
/// let service = registry.resolve("1011")?;
/// ```
pub struct ServiceRegistryBuilder {
    mappings: BTreeMap<String, String>,
    policies: HashMap<ProviderId, ProviderPolicy>,
    http_client: Option<Arc<dyn HttpClient>>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl Default for ServiceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistryBuilder {
    /// Starts from the default mapping `1011 -> frankfurter`.
    pub fn new() -> Self {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            String::from(FRANKFURTER_SERVICE_ID),
            ProviderId::Frankfurter.as_str().to_owned(),
        );
        Self {
            mappings,
            policies: HashMap::new(),
            http_client: None,
            cache_store: None,
        }
    }

    /// Replace the whole id-to-provider mapping.
    pub fn with_mappings(mut self, mappings: BTreeMap<String, String>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policies.insert(policy.provider_id, policy);
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn build(self) -> Result<ServiceRegistry, RateError> {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()));

        let mut services: HashMap<ServiceId, Arc<dyn ExchangeRateService>> = HashMap::new();
        for (raw_id, raw_provider) in &self.mappings {
            let id = ServiceId::parse(raw_id)?;
            let provider: ProviderId = raw_provider
                .parse()
                .map_err(|e: ValidationError| RateError::Configuration {
                    message: format!("service {id}: {e}"),
                    valid_ids: Vec::new(),
                })?;
            let policy = self
                .policies
                .get(&provider)
                .cloned()
                .unwrap_or_else(|| ProviderPolicy::default_for(provider));

            let service: Arc<dyn ExchangeRateService> = match provider {
                ProviderId::Frankfurter => Arc::new(FrankfurterExchangeRateService::from_policy(
                    &policy,
                    Arc::clone(&http_client),
                    Arc::clone(&store),
                )),
            };
            info!(service_id = %id, provider = %provider, base_url = %policy.base_url, "registered exchange rate service");
            services.insert(id, service);
        }

        Ok(ServiceRegistry { services })
    }
}
