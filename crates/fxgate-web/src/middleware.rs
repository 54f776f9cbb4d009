//! Request-scoped middleware: correlation ids, request logging and
//! per-client throttling.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub static CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Per-request id carried in request extensions and echoed in the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Peer address from the connection, else the first `X-Forwarded-For` entry.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| forwarded_for(request.headers()))
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Logs every request and response under a fresh correlation id.
pub async fn request_logging(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let correlation_id = CorrelationId::generate();
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let ip = client_ip(&request);
    let client_id = state
        .authenticator()
        .authenticate(request.headers())
        .map(|principal| principal.client_id)
        .unwrap_or_else(|_| String::from("anonymous"));

    let span = tracing::info_span!("request", correlation_id = %correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    async move {
        info!(
            method = %method,
            path = %path,
            client_ip = ?ip,
            client_id = %client_id,
            "request received"
        );

        let mut response = next.run(request).await;

        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "response sent"
        );
        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response
                .headers_mut()
                .insert(CORRELATION_ID_HEADER.clone(), value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Rejects clients over their quota with 429; clients without an address
/// pass through unthrottled.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(ip) = client_ip(&request) else {
        return next.run(request).await;
    };

    match state.limiter().check(ip) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            warn!(client_ip = %ip, retry_after_ms = wait.as_millis() as u64, "rate limit exceeded");
            ApiError::RateLimited { retry_after: wait }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn forwarded_for_uses_first_entry() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .expect("request");

        assert_eq!(client_ip(&request), "203.0.113.7".parse().ok());
    }

    #[test]
    fn connect_info_wins_over_forwarded_header() {
        let mut request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .expect("request");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));

        assert_eq!(client_ip(&request), "192.0.2.1".parse().ok());
    }

    #[test]
    fn request_without_address_has_no_client_ip() {
        let request = Request::builder().body(Body::empty()).expect("request");
        assert_eq!(client_ip(&request), None);
    }

    #[test]
    fn correlation_ids_are_uuids() {
        let id = CorrelationId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }
}
