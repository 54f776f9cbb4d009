use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::ValidationError;

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Calendar date of a rate fixing, rendered as `yyyy-MM-dd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateDate(Date);

impl RateDate {
    /// Parse `yyyy-MM-dd`, or an RFC 3339 timestamp reduced to its date.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        Date::parse(trimmed, ISO_DATE)
            .or_else(|_| OffsetDateTime::parse(trimmed, &Rfc3339).map(OffsetDateTime::date))
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: input.to_owned(),
            })
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }
}

impl Display for RateDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let formatted = self.0.format(ISO_DATE).map_err(|_| std::fmt::Error)?;
        f.write_str(&formatted)
    }
}

impl TryFrom<String> for RateDate {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RateDate> for String {
    fn from(value: RateDate) -> Self {
        value.to_string()
    }
}

/// Inclusive date range for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: RateDate,
    end: RateDate,
}

impl DateRange {
    pub fn new(start: RateDate, end: RateDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange);
        }
        Ok(Self { start, end })
    }

    /// Builds a range without ordering checks.
    ///
    /// Services answer such ranges with an empty series without calling the
    /// upstream; handlers reject them before this point.
    pub const fn unchecked(start: RateDate, end: RateDate) -> Self {
        Self { start, end }
    }

    pub const fn start(&self) -> RateDate {
        self.start
    }

    pub const fn end(&self) -> RateDate {
        self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Upstream path segment, `{start}..{end}`.
    pub fn path_segment(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
