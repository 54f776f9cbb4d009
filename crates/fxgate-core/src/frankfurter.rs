//! Client for the Frankfurter public exchange-rate API.
//!
//! Upstream contract:
//!
//! | Call | Response |
//! |------|----------|
//! | `GET /latest?from={code}` | `{"base", "date", "rates": {code: number}}` |
//! | `GET /{start}..{end}?from={code}` | `{"base", "rates": {date: {code: number}}}` |
//!
//! Non-2xx responses and bodies without a usable `rates` field are upstream
//! failures.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::http_client::{HttpRequest, HttpResponse};
use crate::resilience::ResilientTransport;
use crate::{
    CurrencyCode, DateRange, HistoricalRateSeries, RateDate, RateError, RateSnapshot, RateTable,
};

pub const DEFAULT_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Deserialize)]
struct LatestPayload {
    #[serde(default)]
    date: Option<String>,
    rates: Option<BTreeMap<String, Decimal>>,
}

#[derive(Debug, Deserialize)]
struct RangePayload {
    rates: Option<BTreeMap<String, BTreeMap<String, Decimal>>>,
}

/// Frankfurter upstream client; every call goes through the resilience policies.
#[derive(Clone)]
pub struct FrankfurterClient {
    base_url: String,
    request_timeout_ms: u64,
    transport: ResilientTransport,
}

impl FrankfurterClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout_ms: u64,
        transport: ResilientTransport,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            request_timeout_ms,
            transport,
        }
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }

    pub fn latest_url(&self, base: &CurrencyCode) -> String {
        format!(
            "{}/latest?from={}",
            self.base_url,
            urlencoding::encode(base.as_str())
        )
    }

    pub fn range_url(&self, base: &CurrencyCode, range: &DateRange) -> String {
        format!(
            "{}/{}?from={}",
            self.base_url,
            range.path_segment(),
            urlencoding::encode(base.as_str())
        )
    }

    pub async fn latest(&self, base: &CurrencyCode) -> Result<RateSnapshot, RateError> {
        let response = self.get(self.latest_url(base)).await?;
        parse_latest(base, &response.body)
    }

    pub async fn range(
        &self,
        base: &CurrencyCode,
        range: &DateRange,
    ) -> Result<HistoricalRateSeries, RateError> {
        let response = self.get(self.range_url(base, range)).await?;
        parse_range(base, &response.body)
    }

    async fn get(&self, url: String) -> Result<HttpResponse, RateError> {
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_timeout_ms(self.request_timeout_ms);

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(RateError::upstream_status(
                format!("frankfurter upstream returned status {}", response.status),
                response.status,
            ));
        }
        Ok(response)
    }
}

fn parse_latest(base: &CurrencyCode, body: &str) -> Result<RateSnapshot, RateError> {
    let payload: LatestPayload = serde_json::from_str(body)
        .map_err(|e| RateError::upstream(format!("malformed latest rates payload: {e}")))?;
    let rates = payload
        .rates
        .ok_or_else(|| RateError::upstream("Failed to retrieve exchange rates."))?;

    let as_of = payload
        .date
        .as_deref()
        .map(RateDate::parse)
        .transpose()
        .map_err(|e| RateError::upstream(format!("malformed latest rates payload: {e}")))?;

    Ok(RateSnapshot::new(base.clone(), as_of, normalize_table(rates)?))
}

fn parse_range(base: &CurrencyCode, body: &str) -> Result<HistoricalRateSeries, RateError> {
    let payload: RangePayload = serde_json::from_str(body)
        .map_err(|e| RateError::upstream(format!("malformed historical rates payload: {e}")))?;
    let rates = payload
        .rates
        .ok_or_else(|| RateError::upstream("Failed to retrieve historical exchange rates."))?;

    let mut series = BTreeMap::new();
    for (day, table) in rates {
        let date = RateDate::parse(&day)
            .map_err(|e| RateError::upstream(format!("malformed historical rates payload: {e}")))?;
        series.insert(date, normalize_table(table)?);
    }

    Ok(HistoricalRateSeries::new(base.clone(), series))
}

fn normalize_table(raw: BTreeMap<String, Decimal>) -> Result<RateTable, RateError> {
    raw.into_iter()
        .map(|(code, rate)| {
            let currency = CurrencyCode::parse(&code).map_err(|e| {
                RateError::upstream(format!("upstream returned invalid currency '{code}': {e}"))
            })?;
            if rate <= Decimal::ZERO {
                return Err(RateError::upstream(format!(
                    "upstream returned non-positive rate {rate} for {currency}"
                )));
            }
            Ok((currency, rate))
        })
        .collect()
}
