//! Behavior tests for the HTTP surface, driven through the axum router.

use std::sync::Arc;

use axum::http::StatusCode;
use fxgate_core::{HttpResponse, ScriptedHttpClient};
use std::time::Duration;

use fxgate_core::CacheStore;
use fxgate_tests::{
    admin_token, body_json, claims, dec, get, post_json, sign, test_app, test_app_with,
    test_config, test_state, user_token, LATEST_USD, RANGE_USD, SIGNING_KEY,
};
use fxgate_web::{app, spawn_housekeeping};
use jsonwebtoken::get_current_timestamp;
use serde_json::json;
use tower::ServiceExt;

const LATEST_URI: &str = "/api/v1/rates/latest?serviceId=1011&baseCurrency=USD";
const CONVERT_URI: &str = "/api/v1/rates/convert";

fn convert_body(from: &str, to: &str, amount: &str) -> serde_json::Value {
    json!({
        "serviceId": "1011",
        "fromCurrency": from,
        "toCurrency": to,
        "amount": serde_json::from_str::<serde_json::Value>(amount).expect("numeric literal"),
    })
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn when_no_token_is_sent_rate_routes_answer_unauthorized() {
    // Given: The application with a healthy upstream
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: Latest rates are requested anonymously
    let response = app.oneshot(get(LATEST_URI, None)).await.expect("response");

    // Then: 401 and no upstream traffic
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "auth.unauthorized");
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_user_token_calls_convert_access_is_forbidden() {
    // Given: A caller holding the user role
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: The admin-only convert route is called
    let response = app
        .oneshot(post_json(CONVERT_URI, Some(user_token()), convert_body("USD", "EUR", "10")))
        .await
        .expect("response");

    // Then: 403
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_token_only_carries_admin_role_user_routes_are_forbidden() {
    // Given: An admin-only caller and a caller holding both roles
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);
    let both_roles = sign(&claims(json!(["Admin", "User"])), SIGNING_KEY);

    // When: A user-level route is called by each
    let admin_only = app
        .clone()
        .oneshot(get(LATEST_URI, Some(admin_token())))
        .await
        .expect("response");
    let both = app.oneshot(get(LATEST_URI, Some(both_roles))).await.expect("response");

    // Then: Role checks are exact
    assert_eq!(admin_only.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(admin_only).await["code"], "auth.forbidden");
    assert_eq!(both.status(), StatusCode::OK);
}

#[tokio::test]
async fn when_token_fails_validation_the_request_is_unauthorized() {
    // Given: Tokens that are expired, meant for another audience or issuer,
    // or signed with a foreign key
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    let mut expired = claims(json!("User"));
    expired["exp"] = json!(get_current_timestamp() - 3_600);
    let mut foreign_audience = claims(json!("User"));
    foreign_audience["aud"] = json!("another-api");
    let mut foreign_issuer = claims(json!("User"));
    foreign_issuer["iss"] = json!("https://elsewhere.test");

    let tokens = [
        sign(&expired, SIGNING_KEY),
        sign(&foreign_audience, SIGNING_KEY),
        sign(&foreign_issuer, SIGNING_KEY),
        sign(&claims(json!("User")), "some-other-signing-key-0123456789abcdef"),
        String::from("not-a-jwt"),
    ];

    for token in tokens {
        // When: Latest rates are requested with the token
        let response = app
            .clone()
            .oneshot(get(LATEST_URI, Some(token)))
            .await
            .expect("response");

        // Then: 401
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(http.call_count(), 0);
}

// =============================================================================
// Latest rates
// =============================================================================

#[tokio::test]
async fn when_latest_rates_are_requested_body_is_a_currency_to_rate_map() {
    // Given: A healthy upstream
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: Latest USD rates are requested
    let response = app.oneshot(get(LATEST_URI, Some(user_token()))).await.expect("response");

    // Then: The rate map is returned with exact numbers
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["EUR"].to_string(), "0.91954");
    assert_eq!(body["JPY"].to_string(), "155.67");
}

#[tokio::test]
async fn when_base_currency_is_empty_request_is_rejected_before_upstream() {
    // Given: The application
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    for uri in [
        "/api/v1/rates/latest?serviceId=1011&baseCurrency=",
        "/api/v1/rates/latest?serviceId=1011",
        "/api/v1/rates/historical?serviceId=1011&baseCurrency=&startDate=2024-01-01&endDate=2024-01-31",
    ] {
        // When: The base currency is missing
        let response = app
            .clone()
            .oneshot(get(uri, Some(user_token())))
            .await
            .expect("response");

        // Then: 400 with the documented message
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Base currency is required.");
    }
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_service_id_is_unknown_response_lists_valid_ids() {
    // Given: The default service table
    let http = Arc::new(ScriptedHttpClient::new());
    let app = test_app(&http);

    // When: Service 9999 is requested
    let response = app
        .oneshot(get(
            "/api/v1/rates/latest?serviceId=9999&baseCurrency=USD",
            Some(user_token()),
        ))
        .await
        .expect("response");

    // Then: 400 naming the valid ids
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "service.configuration");
    assert_eq!(
        body["message"],
        "Service not found for ID: 9999. Valid IDs are: 1011"
    );
}

#[tokio::test]
async fn when_upstream_keeps_failing_errors_turn_into_service_unavailable() {
    // Given: An upstream answering 500 and a breaker threshold of two calls
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::new(500, ""))));
    let app = test_app(&http);

    // When: Two calls fail through their retries
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get(LATEST_URI, Some(user_token())))
            .await
            .expect("response");

        // Then: Each is reported as an internal error
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        let message = body["message"].as_str().expect("message");
        assert!(message.starts_with("Internal server error: "));
    }
    let attempts = http.call_count();

    // When: A third call arrives
    let response = app.oneshot(get(LATEST_URI, Some(user_token()))).await.expect("response");

    // Then: The open breaker answers 503 without touching the upstream
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "upstream.circuit_open");
    assert_eq!(http.call_count(), attempts);
}

// =============================================================================
// Conversion
// =============================================================================

#[tokio::test]
async fn when_admin_converts_a_supported_pair_converted_amount_is_returned() {
    // Given: USD rates upstream
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: 100 USD is converted to EUR
    let response = app
        .oneshot(post_json(CONVERT_URI, Some(admin_token()), convert_body("USD", "EUR", "100")))
        .await
        .expect("response");

    // Then: The exact decimal product is returned
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let converted = dec(&body["convertedAmount"].to_string());
    assert_eq!(converted, dec("91.954"));
}

#[tokio::test]
async fn when_amount_is_not_positive_conversion_is_a_bad_request() {
    // Given: The application
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    for amount in ["0", "-5"] {
        // When: A non-positive amount is sent
        let response = app
            .clone()
            .oneshot(post_json(CONVERT_URI, Some(admin_token()), convert_body("USD", "EUR", amount)))
            .await
            .expect("response");

        // Then: 400 with the documented message
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Amount must be greater than zero."
        );
    }
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_currency_is_excluded_conversion_is_a_bad_request_without_upstream() {
    // Given: The application
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: THB is the source currency
    let response = app
        .oneshot(post_json(CONVERT_URI, Some(admin_token()), convert_body("thb", "USD", "10")))
        .await
        .expect("response");

    // Then: 400 naming both currencies, and the upstream was never called
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Conversion involving excluded currencies (TRY, PLN, THB, MXN) is not allowed. From: thb, To: USD"
    );
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_target_rate_is_missing_conversion_is_not_found() {
    // Given: USD rates without CAD
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let app = test_app(&http);

    // When: USD is converted to CAD
    let response = app
        .oneshot(post_json(CONVERT_URI, Some(admin_token()), convert_body("USD", "CAD", "1")))
        .await
        .expect("response");

    // Then: 404 with the documented message
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["message"],
        "Exchange rate not found for the target currency."
    );
}

#[tokio::test]
async fn when_convert_body_is_malformed_request_is_rejected() {
    // Given: The application
    let http = Arc::new(ScriptedHttpClient::new());
    let app = test_app(&http);

    // When: The amount field is missing
    let response = app
        .oneshot(post_json(
            CONVERT_URI,
            Some(admin_token()),
            json!({"serviceId": "1011", "fromCurrency": "USD", "toCurrency": "EUR"}),
        ))
        .await
        .expect("response");

    // Then: 400 with the invalid request code
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "request.invalid");
}

// =============================================================================
// Historical rates
// =============================================================================

#[tokio::test]
async fn when_start_date_is_after_end_date_request_never_reaches_service() {
    // Given: The application
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(RANGE_USD))));
    let app = test_app(&http);

    // When: An inverted range is requested
    let response = app
        .oneshot(get(
            "/api/v1/rates/historical?serviceId=1011&baseCurrency=USD&startDate=2024-02-01&endDate=2024-01-01",
            Some(user_token()),
        ))
        .await
        .expect("response");

    // Then: 400 with the documented message and no upstream call
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Start date cannot be later than end date."
    );
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn when_historical_page_is_requested_only_that_slice_is_returned() {
    // Given: Three days of rates upstream
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(RANGE_USD))));
    let app = test_app(&http);

    // When: Page 2 of size 1 is requested
    let response = app
        .oneshot(get(
            "/api/v1/rates/historical?serviceId=1011&baseCurrency=USD&startDate=2024-01-02&endDate=2024-01-04&page=2&pageSize=1",
            Some(user_token()),
        ))
        .await
        .expect("response");

    // Then: Only the second date is in the body
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let days: Vec<&String> = body.as_object().expect("object").keys().collect();
    assert_eq!(days, ["2024-01-03"]);
    assert_eq!(body["2024-01-03"]["EUR"].to_string(), "0.9152");
}

#[tokio::test]
async fn when_paging_defaults_apply_first_ten_dates_are_returned() {
    // Given: Three days of rates upstream
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(RANGE_USD))));
    let app = test_app(&http);

    // When: No paging parameters are sent
    let response = app
        .oneshot(get(
            "/api/v1/rates/historical?serviceId=1011&baseCurrency=USD&startDate=2024-01-02&endDate=2024-01-04",
            Some(user_token()),
        ))
        .await
        .expect("response");

    // Then: All three fit on the default page
    let body = body_json(response).await;
    assert_eq!(body.as_object().expect("object").len(), 3);
}

// =============================================================================
// Cross-cutting
// =============================================================================

#[tokio::test]
async fn when_client_exceeds_its_quota_requests_are_throttled() {
    // Given: A quota of two requests per client
    let http = Arc::new(ScriptedHttpClient::new());
    let mut config = test_config();
    config.rate_limit.request_limit = 2;
    let app = test_app_with(&http, &config);

    let from = |ip: &str| {
        let mut request = get("/api/v1/health", None);
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().expect("header value"));
        request
    };

    // When: One client sends three requests
    for _ in 0..2 {
        let response = app.clone().oneshot(from("198.51.100.1")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
    let throttled = app.clone().oneshot(from("198.51.100.1")).await.expect("response");

    // Then: The third is rejected with Retry-After, other clients are unaffected
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(throttled.headers().contains_key("retry-after"));
    assert_eq!(
        body_json(throttled).await["message"],
        "Rate limit exceeded. Try again later."
    );

    let other = app.oneshot(from("198.51.100.2")).await.expect("response");
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn when_health_is_requested_circuit_state_is_reported_per_service() {
    // Given: A fresh application
    let http = Arc::new(ScriptedHttpClient::new());
    let app = test_app(&http);

    // When: Health is requested without a token
    let response = app.oneshot(get("/api/v1/health", None)).await.expect("response");

    // Then: Every breaker is closed and the service is ok
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-correlation-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"][0]["serviceId"], "1011");
    assert_eq!(body["services"][0]["provider"], "frankfurter");
    assert_eq!(body["services"][0]["circuit"], "closed");
}

#[tokio::test]
async fn when_cached_entries_expire_housekeeping_drops_them() {
    // Given: An application whose services cache into the state's store
    let http = Arc::new(ScriptedHttpClient::always(Ok(HttpResponse::ok_json(LATEST_USD))));
    let state = test_state(&http, &test_config());
    let app = app(state.clone());

    let response = app.oneshot(get(LATEST_URI, Some(user_token()))).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.cache().get("latest:USD").await.expect("store ok").is_some());

    // And: Many caller-chosen keys that expire almost at once
    for day in 1..=28 {
        let key = format!("historical:USD:2024-02-{day:02}:2024-03-01");
        state
            .cache()
            .set(&key, b"{}".to_vec(), Duration::from_millis(1))
            .await
            .expect("store ok");
    }
    assert_eq!(state.cache().len().await, 29);

    // When: Housekeeping runs for a few ticks
    let housekeeping = spawn_housekeeping(
        state.clone(),
        Duration::from_millis(10),
        Duration::from_secs(60),
    );
    tokio::time::sleep(Duration::from_millis(60)).await;
    housekeeping.abort();

    // Then: Only the live latest-rates entry remains
    assert_eq!(state.cache().len().await, 1);
}
