//! Lightweight cron expressions for the daily checks.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds), evaluated in the
//! reference offset. Minute and hour accept `*`, `*/N`, `N`, `a-b` and
//! `a,b,c`; the date fields only accept `*`.
//! Example: "0 18 * * *" = every day at 18:00.

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use trainbell_core::{Result, TrainbellError};

/// A parsed daily schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(expression, "need 5 fields: MIN HOUR DOM MON DOW"));
        }
        if parts[2..].iter().any(|f| *f != "*") {
            return Err(invalid(expression, "day-of-month, month and day-of-week must be '*'"));
        }

        let minutes = parse_field(parts[0], 0, 59).ok_or_else(|| invalid(expression, "bad minute field"))?;
        let hours = parse_field(parts[1], 0, 23).ok_or_else(|| invalid(expression, "bad hour field"))?;
        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing time strictly after `after`.
    pub fn next_after(&self, after: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let mut candidate = after + Duration::minutes(1);
        candidate = candidate.with_second(0).unwrap_or(candidate);
        candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

        // Every field set is non-empty, so a match exists within a day.
        for _ in 0..(24 * 60) {
            if self.minutes.contains(&candidate.minute()) && self.hours.contains(&candidate.hour()) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn invalid(expression: &str, reason: &str) -> TrainbellError {
    TrainbellError::Config(format!("invalid cron expression '{expression}': {reason}"))
}

/// Parse a cron field into its sorted, non-empty list of values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let part = part.trim();
        if part == "*" {
            values.extend(min..=max);
        } else if let Some(step) = part.strip_prefix("*/") {
            let n: usize = step.parse().ok()?;
            if n == 0 {
                return None;
            }
            values.extend((min..=max).step_by(n));
        } else if let Some((lo, hi)) = part.split_once('-') {
            let (lo, hi): (u32, u32) = (lo.parse().ok()?, hi.parse().ok()?);
            if lo > hi || lo < min || hi > max {
                return None;
            }
            values.extend(lo..=hi);
        } else {
            let n: u32 = part.parse().ok()?;
            if n < min || n > max {
                return None;
            }
            values.push(n);
        }
    }
    values.sort_unstable();
    values.dedup();
    if values.is_empty() { None } else { Some(values) }
}
