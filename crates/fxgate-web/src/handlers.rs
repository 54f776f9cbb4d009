//! Route handlers. Input is validated here, before a service is resolved or
//! any cache or upstream work starts.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use fxgate_core::{
    CircuitState, ConversionRequest, CurrencyCode, DateRange, ProviderId, RateDate, RateTable,
    ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub base_currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    #[serde(default)]
    pub service_id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub converted_amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub base_currency: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub service_id: String,
    pub provider: ProviderId,
    pub circuit: CircuitState,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: Vec<ServiceHealth>,
}

fn invalid_query(rejection: QueryRejection) -> ApiError {
    ApiError::InvalidRequest(rejection.body_text())
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError::InvalidRequest(rejection.body_text())
}

/// `GET /rates/latest?serviceId&baseCurrency`
pub async fn latest_rates(
    State(state): State<AppState>,
    query: Result<Query<LatestQuery>, QueryRejection>,
) -> Result<Json<RateTable>, ApiError> {
    let Query(query) = query.map_err(invalid_query)?;
    let base = CurrencyCode::parse_base(&query.base_currency)?;

    let service = state.registry().resolve(&query.service_id)?;
    let snapshot = service.latest_rates(&base).await?;
    Ok(Json(snapshot.rates))
}

/// `POST /rates/convert`
pub async fn convert(
    State(state): State<AppState>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Json(body) = body.map_err(invalid_body)?;
    let request = ConversionRequest::new(body.from_currency, body.to_currency, body.amount)?;

    let service = state.registry().resolve(&body.service_id)?;
    let converted_amount = service.convert(&request).await?;
    Ok(Json(ConvertResponse { converted_amount }))
}

/// `GET /rates/historical?serviceId&baseCurrency&startDate&endDate&page&pageSize`
pub async fn historical_rates(
    State(state): State<AppState>,
    query: Result<Query<HistoricalQuery>, QueryRejection>,
) -> Result<Json<BTreeMap<RateDate, RateTable>>, ApiError> {
    let Query(query) = query.map_err(invalid_query)?;
    let base = CurrencyCode::parse_base(&query.base_currency)?;
    let range = DateRange::new(
        RateDate::parse(&query.start_date)?,
        RateDate::parse(&query.end_date)?,
    )?;
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 || page_size == 0 {
        return Err(ValidationError::InvalidPage.into());
    }

    let service = state.registry().resolve(&query.service_id)?;
    let series = service.historical_rates(&base, range).await?;
    Ok(Json(series.page(page, page_size)?))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let services: Vec<ServiceHealth> = state
        .registry()
        .services()
        .into_iter()
        .map(|entry| ServiceHealth {
            service_id: entry.id.to_string(),
            provider: entry.service.provider(),
            circuit: entry.service.circuit_state(),
        })
        .collect();

    let status = if services
        .iter()
        .all(|service| service.circuit == CircuitState::Closed)
    {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status, services })
}
