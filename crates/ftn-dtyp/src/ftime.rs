//! FTS-0001 date-time codec.
//!
//! Timestamps are held as UTC unix seconds throughout the stack and only
//! rendered to the 19-character `DD Mon YY  HH:MM:SS` form at the packet
//! boundary.

use time::OffsetDateTime;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Error parsing an FTS-0001 date-time field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    #[error("malformed date-time `{0}`")]
    Malformed(String),
    #[error("unknown month `{0}`")]
    Month(String),
    #[error("date-time out of range `{0}`")]
    Range(String),
}

/// Renders unix seconds as the FTS-0001 `DD Mon YY  HH:MM:SS` form.
///
/// Reference: FTS-0001 §5.2
pub fn format_fts_datetime(unix: i64) -> String {
    let dt = OffsetDateTime::from_unix_timestamp(unix)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    format!(
        "{:02} {} {:02}  {:02}:{:02}:{:02}",
        dt.day(),
        MONTHS[dt.month() as usize - 1],
        dt.year() % 100,
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// Parses the FTS-0001 `DD Mon YY  HH:MM:SS` form into unix seconds.
///
/// Two-digit years below 80 are taken as 20xx, the rest as 19xx. Some
/// historical tossers emit a single space before the time; both forms
/// are accepted.
pub fn parse_fts_datetime(text: &str) -> Result<i64, TimeParseError> {
    let malformed = || TimeParseError::Malformed(text.to_string());

    let mut parts = text.split_whitespace();
    let day: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed())?;
    let month_name = parts.next().ok_or_else(|| malformed())?;
    let yy: i32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| malformed())?;
    let clock = parts.next().ok_or_else(|| malformed())?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    let month_index = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))
        .ok_or_else(|| TimeParseError::Month(month_name.to_string()))?;
    let month = time::Month::try_from(month_index as u8 + 1)
        .map_err(|_| TimeParseError::Range(text.to_string()))?;

    let mut clock_parts = clock.split(':');
    let mut next_clock = || -> Result<u8, TimeParseError> {
        clock_parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| malformed())
    };
    let hour = next_clock()?;
    let minute = next_clock()?;
    let second = next_clock()?;

    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
    let date = time::Date::from_calendar_date(year, month, day)
        .map_err(|_| TimeParseError::Range(text.to_string()))?;
    let time = time::Time::from_hms(hour, minute, second)
        .map_err(|_| TimeParseError::Range(text.to_string()))?;
    Ok(date.with_time(time).assume_utc().unix_timestamp())
}
