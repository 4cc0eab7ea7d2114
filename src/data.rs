use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::{Deserialize, Serialize};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One normalized sales row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRecord {
    product_name: String,
    sales: Decimal,
    date: NaiveDate,
}

impl SalesRecord {
    pub fn new(product_name: impl Into<String>, sales: Decimal, date: NaiveDate) -> Self {
        Self {
            product_name: product_name.into(),
            sales,
            date,
        }
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn sales(&self) -> Decimal {
        self.sales
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn month(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }
}

/// A calendar month; the day component of a date truncated away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1-based month of the year.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Human label such as `Sep 2024`.
    pub fn label(&self) -> String {
        let abbreviation = MONTH_ABBREVIATIONS[self.month as usize - 1];
        format!("{abbreviation} {:04}", self.year)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
        "%Y%m%d",
        "%d %b %Y",
        "%b %d, %Y",
        "%d %B %Y",
        "%B %d, %Y",
    ];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M",
        "%d/%m/%Y %H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a bare date, a date with a time of day, or an RFC 3339 timestamp,
/// discarding any time component.
pub fn parse_sales_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_naive_date(trimmed)
        .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.date()))
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Why a sales amount could not become a [`Decimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    NotANumber,
    /// A finite number beyond the `Decimal` range.
    OutOfRange,
}

/// Parses a sales amount. Thousands separators and a leading currency symbol
/// are not accepted.
pub fn parse_sales_amount(value: &str) -> Result<Decimal, AmountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AmountError::NotANumber);
    }
    if let Ok(amount) = Decimal::from_str(trimmed).or_else(|_| Decimal::from_scientific(trimmed)) {
        return Ok(amount);
    }
    match trimmed.parse::<f64>() {
        Ok(float) => decimal_from_f64(float),
        Err(_) => Err(AmountError::NotANumber),
    }
}

pub fn decimal_from_f64(value: f64) -> Result<Decimal, AmountError> {
    if !value.is_finite() {
        return Err(AmountError::NotANumber);
    }
    Decimal::from_f64(value)
        .map(|d| d.normalize())
        .ok_or(AmountError::OutOfRange)
}

/// Renders an amount without trailing fractional zeros.
pub fn format_amount(value: Decimal) -> String {
    value.normalize().to_string()
}
