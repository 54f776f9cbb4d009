//! # Domain Models
//!
//! Canonical domain types for fxgate exchange rates.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CurrencyCode`] | Normalized uppercase currency code |
//! | [`RateDate`] | `yyyy-MM-dd` fixing date |
//! | [`DateRange`] | Inclusive historical date range |
//! | [`RateSnapshot`] | Latest rates for one base currency |
//! | [`HistoricalRateSeries`] | Date-keyed rate tables |
//! | [`ConversionRequest`] | Validated conversion input |
//! | [`ServiceId`] | Opaque service selector |
//!
//! Rates are `rust_decimal::Decimal`; nothing in this crate routes a rate
//! through `f64`.

mod currency;
mod date;
mod rates;

pub use currency::{is_excluded_currency, CurrencyCode, EXCLUDED_CURRENCIES};
pub use date::{DateRange, RateDate};
pub use rates::{ConversionRequest, HistoricalRateSeries, RateSnapshot, RateTable, ServiceId};
