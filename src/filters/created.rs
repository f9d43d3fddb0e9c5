//! Creation-time window and the time-bound expression parser.
//!
//! A bound is written either as an RFC 3339 timestamp or as an age relative
//! to the moment the filter file is loaded:
//!
//! - `<N>d` days, `<N>w` weeks, `<N>M` calendar months, `<N>y` calendar years
//! - a sequence of `<number><unit>` with units `h`, `m`, `s` (e.g. `2h`,
//!   `90m`, `1h30m`, `1.5h`)
//!
//! Relative bounds resolve to `now - age` exactly once, at load time.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Months, TimeDelta, Utc};
use tracing::trace;

use crate::types::error::CloudrmError;

/// Resolve a `before`/`after` expression to an absolute instant.
///
/// Resolution order: RFC 3339 timestamp, then `N{d,w,M,y}`, then an
/// `h`/`m`/`s` duration. The first form that parses wins.
pub fn parse_time_bound(expression: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let expression = expression.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(expression) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let resolved = match parse_calendar_age(expression, now) {
        Some(resolved) => Some(resolved),
        None => parse_clock_duration(expression).and_then(|age| now.checked_sub_signed(age)),
    };

    let resolved = resolved.ok_or_else(|| {
        anyhow!(CloudrmError::InvalidCreatedTime(format!(
            "'{expression}' is neither an RFC 3339 timestamp nor a duration like 30d, 2w, 6M, 1y or 12h"
        )))
    })?;

    trace!(
        expression = expression,
        resolved = resolved.to_rfc3339(),
        "time bound resolved."
    );
    Ok(resolved)
}

/// `N` followed by exactly one of `d`, `w`, `M`, `y` (case-sensitive).
fn parse_calendar_age(expression: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let unit = expression.chars().last()?;
    let digits = &expression[..expression.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u32 = digits.parse().ok()?;

    match unit {
        'd' => now.checked_sub_signed(TimeDelta::try_days(i64::from(amount))?),
        'w' => now.checked_sub_signed(TimeDelta::try_weeks(i64::from(amount))?),
        'M' => now.checked_sub_months(Months::new(amount)),
        'y' => now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

/// Hours, minutes and seconds, possibly fractional and combined: `1h30m`, `2.5s`.
fn parse_clock_duration(expression: &str) -> Option<TimeDelta> {
    if expression.is_empty() {
        return None;
    }

    let mut total_millis: f64 = 0.0;
    let mut rest = expression;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_millis = match rest.chars().next()? {
            'h' => 3_600_000.0,
            'm' => 60_000.0,
            's' => 1_000.0,
            _ => return None,
        };
        rest = &rest[1..];
        total_millis += value * unit_millis;
    }

    if !total_millis.is_finite() || total_millis > i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(total_millis.round() as i64)
}

/// Creation-time window. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatedWindow {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
}

impl CreatedWindow {
    /// Build a window from filter-file expressions, resolving relative bounds against `now`.
    pub fn parse(before: Option<&str>, after: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            before: before.map(|b| parse_time_bound(b, now)).transpose()?,
            after: after.map(|a| parse_time_bound(a, now)).transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }

    /// `after < created_at < before`, each side only when the bound is set.
    ///
    /// A resource without a creation time never falls inside a non-empty window.
    pub fn contains(&self, created_at: Option<DateTime<Utc>>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(created_at) = created_at else {
            return false;
        };

        if let Some(after) = self.after {
            if created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if created_at >= before {
                return false;
            }
        }
        true
    }
}
