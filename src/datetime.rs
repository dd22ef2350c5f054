// Date parsing and formatting for the dateFormat filter
// Host collections carry dates as ISO-8601 strings; format arguments use
// .NET-style tokens (the engine's template dialect inherits them), which
// are translated to chrono specifiers before formatting.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Format used when neither the stage argument nor the `defaultDateFormat`
/// global argument supplies one.
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd";

/// DateTime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateTimeError {
    #[error("Cannot parse '{0}' as a date")]
    ParseError(String),
}

/// Parse an ISO-8601-ish date string: RFC 3339, a naive datetime, or a bare
/// date.
pub fn parse_date(s: &str) -> Result<NaiveDateTime, DateTimeError> {
    if let Ok(dt) = s.parse::<DateTime<chrono::Utc>>() {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d.and_hms_opt(0, 0, 0).unwrap());
        }
    }
    Err(DateTimeError::ParseError(s.to_string()))
}

/// Translate a .NET-style format string (`yyyy/MM/dd`) into chrono
/// specifiers (`%Y/%m/%d`). Unrecognized characters pass through verbatim.
pub fn to_strftime(format: &str) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::with_capacity(format.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        match (c, run) {
            ('y', r) if r >= 4 => out.push_str("%Y"),
            ('y', _) => out.push_str("%y"),
            ('M', r) if r >= 2 => out.push_str("%m"),
            ('M', _) => out.push_str("%-m"),
            ('d', r) if r >= 2 => out.push_str("%d"),
            ('d', _) => out.push_str("%-d"),
            ('H', r) if r >= 2 => out.push_str("%H"),
            ('H', _) => out.push_str("%-H"),
            ('h', _) => out.push_str("%I"),
            ('m', _) => out.push_str("%M"),
            ('s', _) => out.push_str("%S"),
            ('f', _) => out.push_str("%3f"),
            ('t', _) => out.push_str("%p"),
            ('%', _) => out.push_str("%%"),
            (other, r) => {
                for _ in 0..r {
                    out.push(other);
                }
            }
        }
        i += run;
    }
    out
}

/// Format a parsed date with a .NET-style format string.
pub fn format_date(dt: &NaiveDateTime, format: &str) -> String {
    dt.format(&to_strftime(format)).to_string()
}
