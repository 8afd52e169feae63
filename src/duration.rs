//! Duration parsing for the units used by the supported report dialects.
//!
//! Every parser here is total: input that cannot be understood resolves to
//! zero (or `None` where the caller has a fallback) and is logged at debug.

use chrono::NaiveDateTime;
use tracing::debug;

const NBSP: char = '\u{a0}';

/// Parse a decimal number of seconds into milliseconds.
///
/// Whichever of `,` and `.` appears last is treated as the decimal point and
/// the other one as a thousands separator. Quote marks and non-breaking
/// spaces (also used as group separators by some locales) are stripped.
pub fn parse_seconds(text: Option<&str>) -> u64 {
    let Some(raw) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0;
    };

    let normalized = normalize_decimal(raw);
    match normalized.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds > 0.0 => (seconds * 1000.0).round() as u64,
        Ok(_) => 0,
        Err(e) => {
            debug!(value = raw, error = %e, "unparseable duration in seconds, using 0");
            0
        }
    }
}

fn normalize_decimal(raw: &str) -> String {
    let last_comma = raw.rfind(',');
    let last_dot = raw.rfind('.');

    let swapped = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if comma > dot => raw.replace('.', "").replace(',', "."),
        (Some(_), None) => raw.replace(',', "."),
        _ => raw.replace(',', ""),
    };

    swapped
        .chars()
        .filter(|c| *c != '\'' && *c != NBSP && !c.is_whitespace())
        .collect()
}

/// Parse an integral number of milliseconds (optional sign, then digits).
pub fn parse_millis(text: Option<&str>) -> u64 {
    let Some(raw) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0;
    };
    if !is_number(raw) {
        debug!(value = raw, "unparseable duration in milliseconds, using 0");
        return 0;
    }
    match raw.parse::<i64>() {
        Ok(ms) => ms.max(0) as u64,
        Err(e) => {
            debug!(value = raw, error = %e, "duration in milliseconds out of range, using 0");
            0
        }
    }
}

/// True when `text` is an optional sign followed by at least one digit.
pub fn is_number(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parse an MSTest `H:MM:SS.fffffff` duration. Seconds are rounded up to the
/// next millisecond.
pub fn parse_clock(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        debug!(value = text, "duration is not in H:MM:SS form");
        return None;
    };

    let parsed = (
        hours.parse::<f64>(),
        minutes.parse::<f64>(),
        seconds.parse::<f64>(),
    );
    match parsed {
        (Ok(h), Ok(m), Ok(s)) => {
            let total = (1000.0 * s).ceil() + 1000.0 * (60.0 * (m + 60.0 * h));
            (total.is_finite() && total >= 0.0).then_some(total as u64)
        }
        _ => {
            debug!(value = text, "duration has non-numeric components");
            None
        }
    }
}

/// Milliseconds between two `yyyy-MM-ddTHH:mm:ss` timestamps. Fractions of a
/// second and zone offsets are ignored.
pub fn parse_timestamp_delta(start: &str, end: &str) -> Option<u64> {
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;
    let delta = (end - start).num_milliseconds();
    (delta >= 0).then_some(delta as u64)
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let prefix = text.trim().get(..19)?;
    NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S").ok()
}
