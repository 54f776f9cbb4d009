use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Currencies the conversion operation refuses to handle in either direction.
pub const EXCLUDED_CURRENCIES: [&str; 4] = ["TRY", "PLN", "THB", "MXN"];

/// Normalized (trimmed, uppercase) currency code.
///
/// Only emptiness is checked here. Whether a code is actually known is left to
/// the upstream provider, so an unknown code surfaces as an upstream error or
/// a missing rate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and normalize a currency code to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCurrency);
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Parse a code used as the base of a rate query.
    pub fn parse_base(input: &str) -> Result<Self, ValidationError> {
        Self::parse(input).map_err(|error| match error {
            ValidationError::EmptyCurrency => ValidationError::BaseCurrencyRequired,
            other => other,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_excluded(&self) -> bool {
        is_excluded_currency(&self.0)
    }
}

/// Case-insensitive denylist check on a raw, unparsed code.
pub fn is_excluded_currency(code: &str) -> bool {
    let code = code.trim();
    EXCLUDED_CURRENCIES
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(code))
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}
