//! Retry and circuit-breaker policies composed around upstream calls.
//!
//! The circuit breaker is the outer policy and retry the inner one: a call
//! that exhausts its retries is reported to the breaker as a single failure.
//! Qualifying failures are transport errors and responses with status >= 500;
//! any other response is handed back to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, CircuitPermit, CircuitState};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::{ProviderId, RateError, RetryConfig};

/// Upstream transport wrapped in retry, circuit breaker and an overall deadline.
#[derive(Clone)]
pub struct ResilientTransport {
    provider: ProviderId,
    client: Arc<dyn HttpClient>,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    overall_timeout: Duration,
}

impl ResilientTransport {
    pub fn new(
        provider: ProviderId,
        client: Arc<dyn HttpClient>,
        retry: RetryConfig,
        breaker: Arc<CircuitBreaker>,
        overall_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            client,
            retry,
            breaker,
            overall_timeout,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, RateError> {
        let Some(permit) = self.breaker.allow_request() else {
            warn!(provider = %self.provider, url = %request.url, "circuit open, failing fast");
            return Err(RateError::CircuitOpen {
                provider: self.provider,
            });
        };

        let mut admission = Admission {
            breaker: &self.breaker,
            permit,
            settled: false,
        };
        let outcome =
            tokio::time::timeout(self.overall_timeout, self.execute_with_retry(request)).await;
        admission.settled = true;

        match outcome {
            Ok(Ok(response)) => {
                self.breaker.record_success(permit);
                Ok(response)
            }
            Ok(Err(error)) => {
                self.breaker.record_failure(permit);
                Err(error)
            }
            Err(_) => {
                self.breaker.record_failure(permit);
                Err(RateError::upstream(format!(
                    "{} upstream call exceeded overall timeout of {} ms",
                    self.provider,
                    self.overall_timeout.as_millis()
                )))
            }
        }
    }

    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse, RateError> {
        let mut attempt = 0_u32;
        loop {
            let failure = match self.client.execute(request.clone()).await {
                Ok(response) if !self.retry.should_retry_status(response.status) => {
                    return Ok(response)
                }
                Ok(response) => RateError::upstream_status(
                    format!(
                        "{} upstream returned status {}",
                        self.provider, response.status
                    ),
                    response.status,
                ),
                Err(error) => RateError::upstream(format!(
                    "{} transport error: {}",
                    self.provider,
                    error.message()
                )),
            };

            if attempt >= self.retry.max_retries {
                return Err(failure);
            }

            attempt += 1;
            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                provider = %self.provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "upstream call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns an unsettled breaker admission when the call future is dropped.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    permit: CircuitPermit,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon(self.permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::http_client::{HttpError, ScriptedHttpClient};

    fn transport(
        client: Arc<ScriptedHttpClient>,
        max_retries: u32,
        failure_threshold: u32,
    ) -> ResilientTransport {
        ResilientTransport::new(
            ProviderId::Frankfurter,
            client,
            RetryConfig::fixed(Duration::from_millis(1), max_retries),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold,
                open_timeout: Duration::from_secs(60),
            })),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.push_response(503, "busy");
        client.push_error(HttpError::new("connection reset"));
        client.push_response(200, "{}");

        let transport = transport(client.clone(), 3, 5);
        let response = transport
            .execute(HttpRequest::get("https://example.test/latest"))
            .await
            .expect("third attempt succeeds");

        assert_eq!(response.status, 200);
        assert_eq!(client.call_count(), 3);
        assert_eq!(transport.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::new(404, "nope"))));

        let transport = transport(client.clone(), 3, 5);
        let response = transport
            .execute(HttpRequest::get("https://example.test/latest"))
            .await
            .expect("4xx is returned to the caller");

        assert_eq!(response.status, 404);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_count_as_one_breaker_failure() {
        let client = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::new(500, ""))));

        let transport = transport(client.clone(), 2, 5);
        let error = transport
            .execute(HttpRequest::get("https://example.test/latest"))
            .await
            .expect_err("all attempts fail");

        assert!(matches!(error, RateError::Upstream { status: Some(500), .. }));
        assert_eq!(client.call_count(), 3);
        assert_eq!(transport.breaker().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn overall_timeout_bounds_slow_upstreams() {
        let client = Arc::new(
            ScriptedHttpClient::always(Ok(HttpResponse::ok_json("{}")))
                .with_latency(Duration::from_millis(200)),
        );
        let transport = ResilientTransport::new(
            ProviderId::Frankfurter,
            client,
            RetryConfig::no_retry(),
            Arc::new(CircuitBreaker::default()),
            Duration::from_millis(20),
        );

        let error = transport
            .execute(HttpRequest::get("https://example.test/latest"))
            .await
            .expect_err("deadline exceeded");

        assert!(error.to_string().contains("overall timeout"));
        assert_eq!(transport.breaker().consecutive_failures(), 1);
    }
}
