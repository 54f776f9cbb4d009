use thiserror::Error;

use crate::{CurrencyCode, ProviderId};

/// Input validation errors, detected before any cache or upstream access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Base currency is required.")]
    BaseCurrencyRequired,
    #[error("Currency code is required.")]
    EmptyCurrency,

    #[error("Amount must be greater than zero.")]
    AmountNotPositive,
    #[error("converted amount is out of the representable decimal range")]
    AmountOutOfRange,

    #[error("Start date cannot be later than end date.")]
    InvalidDateRange,
    #[error("date must be formatted as yyyy-MM-dd: '{value}'")]
    InvalidDate { value: String },

    #[error("Service id is required.")]
    ServiceIdRequired,
    #[error("invalid provider '{value}', expected one of frankfurter")]
    InvalidProvider { value: String },

    #[error("page and pageSize must be at least 1")]
    InvalidPage,
}

/// Error taxonomy surfaced by the exchange rate service and factory.
///
/// Callers branch on the variant for status-code mapping, so the distinction
/// between validation, unsupported currency, not found and upstream failures
/// must be preserved when converting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Conversion involving excluded currencies (TRY, PLN, THB, MXN) is not allowed. From: {from}, To: {to}")]
    UnsupportedCurrency { from: String, to: String },

    #[error("Exchange rate for {currency} not found.")]
    RateNotFound { currency: CurrencyCode },

    #[error("{message}")]
    Upstream {
        message: String,
        status: Option<u16>,
    },

    #[error("{provider} circuit breaker is open; skipping upstream call")]
    CircuitOpen { provider: ProviderId },

    #[error("{message}")]
    Configuration {
        message: String,
        valid_ids: Vec<String>,
    },
}

impl RateError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status: None,
        }
    }

    pub fn upstream_status(message: impl Into<String>, status: u16) -> Self {
        Self::Upstream {
            message: message.into(),
            status: Some(status),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "rate.validation",
            Self::UnsupportedCurrency { .. } => "rate.unsupported_currency",
            Self::RateNotFound { .. } => "rate.not_found",
            Self::Upstream { .. } => "upstream.failure",
            Self::CircuitOpen { .. } => "upstream.circuit_open",
            Self::Configuration { .. } => "service.configuration",
        }
    }

    /// True for failures caused by the caller's input rather than the upstream.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnsupportedCurrency { .. } | Self::Configuration { .. }
        )
    }
}
