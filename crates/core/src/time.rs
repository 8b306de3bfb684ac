//! Time windows and period parsing.
//!
//! All timestamps are epoch milliseconds in UTC. Windows are half-open
//! `[start, end)`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VigilError};

/// Half-open time window `[start, end)` in epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Split into consecutive chunks of at most `step_ms`. A non-positive step
    /// yields the window itself.
    pub fn split(&self, step_ms: i64) -> Vec<TimeRange> {
        if step_ms <= 0 || self.is_empty() {
            return vec![*self];
        }
        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = cursor.saturating_add(step_ms).min(self.end);
            out.push(TimeRange::new(cursor, next));
            cursor = next;
        }
        out
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (
            Utc.timestamp_millis_opt(self.start).single(),
            Utc.timestamp_millis_opt(self.end).single(),
        ) {
            (Some(s), Some(e)) => write!(f, "[{}, {})", s.to_rfc3339(), e.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start, self.end),
        }
    }
}

/// Round `ts` down to a multiple of `step_ms` (epoch aligned).
pub fn floor_to(ts: i64, step_ms: i64) -> i64 {
    if step_ms <= 0 {
        return ts;
    }
    ts - ts.rem_euclid(step_ms)
}

/// Round `ts` up to a multiple of `step_ms` (epoch aligned).
pub fn ceil_to(ts: i64, step_ms: i64) -> i64 {
    let floored = floor_to(ts, step_ms);
    if floored == ts { ts } else { floored + step_ms }
}

/// Parse a fixed-length period.
///
/// Accepts ISO-8601 durations (`PT2H`, `P7D`, `P1W`, `P1DT12H`, `PT0.5S`) and
/// the shorthand used in plan files (`2h`, `30m`, `2h30m`, `7d`, `1w`, `45s`).
/// Calendar units (years, months) are rejected because they have no fixed length.
pub fn parse_period(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(VigilError::InvalidPeriod(input.to_string()));
    }
    if s.starts_with('P') || s.starts_with('p') {
        parse_iso_period(s).ok_or_else(|| VigilError::InvalidPeriod(input.to_string()))
    } else {
        parse_shorthand(s).ok_or_else(|| VigilError::InvalidPeriod(input.to_string()))
    }
}

fn parse_iso_period(s: &str) -> Option<Duration> {
    let body = &s[1..];
    if body.is_empty() {
        return None;
    }
    let (date_part, time_part) = match body.find(['T', 't']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut total = Duration::zero();
    let mut seen = false;

    let mut num = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let n: i64 = num.parse().ok()?;
        num.clear();
        let step = match c.to_ascii_uppercase() {
            'W' => Duration::try_weeks(n)?,
            'D' => Duration::try_days(n)?,
            _ => return None,
        };
        total = total.checked_add(&step)?;
        seen = true;
    }
    if !num.is_empty() {
        return None;
    }

    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        for c in time_part.chars() {
            if c.is_ascii_digit() || c == '.' {
                num.push(c);
                continue;
            }
            let unit = c.to_ascii_uppercase();
            let step = if unit == 'S' {
                let millis = num.parse::<f64>().ok()? * 1000.0;
                if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
                    return None;
                }
                Duration::try_milliseconds(millis.round() as i64)?
            } else {
                let n: i64 = num.parse().ok()?;
                match unit {
                    'H' => Duration::try_hours(n)?,
                    'M' => Duration::try_minutes(n)?,
                    _ => return None,
                }
            };
            total = total.checked_add(&step)?;
            num.clear();
            seen = true;
        }
        if !num.is_empty() {
            return None;
        }
    }

    seen.then_some(total)
}

fn parse_shorthand(s: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut num = String::new();
    let mut seen = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let n: i64 = num.parse().ok()?;
        num.clear();
        let step = match c {
            'w' => Duration::try_weeks(n)?,
            'd' => Duration::try_days(n)?,
            'h' => Duration::try_hours(n)?,
            'm' => Duration::try_minutes(n)?,
            's' => Duration::try_seconds(n)?,
            _ => return None,
        };
        total = total.checked_add(&step)?;
        seen = true;
    }
    if !num.is_empty() {
        return None;
    }
    seen.then_some(total)
}

/// Interpret a plan parameter as a timestamp in epoch millis.
///
/// Numbers are taken as millis. Strings are parsed with `format` (a chrono
/// strftime pattern, UTC assumed) when given, otherwise as RFC 3339 or as a
/// plain integer.
pub fn parse_timestamp(value: &Value, format: Option<&str>) -> Result<i64> {
    let invalid = |reason: &str| VigilError::InvalidTimestamp {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| invalid("not an integer")),
        Value::String(s) => {
            if let Some(fmt) = format {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Ok(dt.and_utc().timestamp_millis());
                }
                if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                    return d
                        .and_hms_opt(0, 0, 0)
                        .map(|dt| dt.and_utc().timestamp_millis())
                        .ok_or_else(|| invalid("date out of range"));
                }
                return Err(invalid(&format!("does not match format '{fmt}'")));
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.timestamp_millis());
            }
            s.trim().parse::<i64>().map_err(|_| invalid("expected RFC 3339 or epoch millis"))
        }
        _ => Err(invalid("expected a number or a string")),
    }
}
