//! Date and number normalization
//!
//! Export values carry formatting meant for people: thousands separators,
//! unit suffixes (`" 10 Nos"`, `"50.00/Nos"`) and the `(-)` negative
//! prefix. These helpers reduce them to typed values. Aggregate amounts
//! never become NaN: anything unparseable is either `None` or zero.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid date '{0}': expected YYYYMMDD")]
    InvalidDate(String),
}

/// Parse a compact `YYYYMMDD` date.
pub fn parse_compact_date(text: &str) -> Result<NaiveDate, NormalizeError> {
    let s = text.trim();
    let invalid = || NormalizeError::InvalidDate(text.to_string());

    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = s[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = s[4..6].parse().map_err(|_| invalid())?;
    let day: u32 = s[6..8].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Split a formatted number into its numeric token and the text after it.
fn numeric_token(text: &str) -> Option<(Decimal, &str)> {
    let s = text.trim();
    let (negative_prefix, s) = match s.strip_prefix("(-)") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };

    let start = s.find(|c: char| c.is_ascii_digit() || c == '.' || c == '-')?;
    let mut negative = negative_prefix;
    let mut body = &s[start..];
    if let Some(rest) = body.strip_prefix('-') {
        negative = !negative;
        body = rest;
    }

    let end = body
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(body.len());
    let digits: String = body[..end].chars().filter(|c| *c != ',').collect();
    if !digits.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let value = Decimal::from_str(&digits).ok()?;
    Some((if negative { -value } else { value }, &body[end..]))
}

/// Parse a formatted amount, quantity or rate.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    numeric_token(text).map(|(value, _)| value)
}

/// Parse an optional field, treating absence and garbage as zero.
pub fn decimal_or_zero(text: Option<&str>) -> Decimal {
    text.and_then(parse_decimal).unwrap_or(Decimal::ZERO)
}

/// Unit following a quantity or rate (`" 10 Nos"` → `"Nos"`).
pub fn unit_suffix(text: &str) -> Option<String> {
    let (_, rest) = numeric_token(text)?;
    let unit = rest.trim_start().trim_start_matches('/').trim();
    let unit = unit.split_whitespace().next()?;
    Some(unit.to_string())
}

/// The exporter's boolean: `Yes`/`No`.
pub fn parse_flag(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

pub fn parse_integer(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}
