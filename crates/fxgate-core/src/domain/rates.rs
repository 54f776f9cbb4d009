use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CurrencyCode, RateDate, ValidationError};

/// Currency code to rate, quoted against one unit of a base currency.
pub type RateTable = BTreeMap<CurrencyCode, Decimal>;

/// Latest rates for a base currency as returned by the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub base: CurrencyCode,
    pub as_of: Option<RateDate>,
    pub rates: RateTable,
}

impl RateSnapshot {
    pub fn new(base: CurrencyCode, as_of: Option<RateDate>, rates: RateTable) -> Self {
        Self { base, as_of, rates }
    }

    pub fn rate(&self, currency: &CurrencyCode) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }
}

/// Date-keyed rate tables for a base currency.
///
/// Keys are `yyyy-MM-dd` dates, so iteration order is chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRateSeries {
    pub base: CurrencyCode,
    pub rates: BTreeMap<RateDate, RateTable>,
}

impl HistoricalRateSeries {
    pub fn new(base: CurrencyCode, rates: BTreeMap<RateDate, RateTable>) -> Self {
        Self { base, rates }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Slice the series into a 1-based page of `page_size` dates.
    pub fn page(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<BTreeMap<RateDate, RateTable>, ValidationError> {
        if page == 0 || page_size == 0 {
            return Err(ValidationError::InvalidPage);
        }

        let skip = (page - 1).saturating_mul(page_size);
        Ok(self
            .rates
            .iter()
            .skip(skip)
            .take(page_size)
            .map(|(date, table)| (*date, table.clone()))
            .collect())
    }
}

/// Validated conversion input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

impl ConversionRequest {
    /// Currencies are kept as given so the denylist can be checked on the raw
    /// input before anything else; only the amount is validated here.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Decimal,
    ) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::AmountNotPositive);
        }
        Ok(Self {
            from: from.into(),
            to: to.into(),
            amount,
        })
    }
}

/// Opaque key selecting an exchange rate service implementation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(String);

impl ServiceId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::ServiceIdRequired);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ServiceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceId> for String {
    fn from(value: ServiceId) -> Self {
        value.0
    }
}
