//! Day arithmetic in the fixed reference timezone.
//!
//! "Today", "tomorrow" and "the day after" are always computed in one fixed
//! UTC offset (Taipei, UTC+08:00, by default) regardless of the host clock.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};

use crate::error::{Result, TrainbellError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceCalendar {
    offset: FixedOffset,
}

impl ReferenceCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Parse an offset written as `+HH:MM` / `-HH:MM` (or `Z`).
    pub fn parse(value: &str) -> Result<Self> {
        parse_offset(value).map(Self::new)
    }

    /// UTC+08:00.
    pub fn taipei() -> Self {
        Self::new(FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset"))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date_naive()
    }

    /// The calendar day `days` after today.
    pub fn days_ahead(&self, now: DateTime<Utc>, days: u32) -> NaiveDate {
        self.today(now) + Days::new(u64::from(days))
    }
}

impl Default for ReferenceCalendar {
    fn default() -> Self {
        Self::taipei()
    }
}

fn parse_offset(value: &str) -> Result<FixedOffset> {
    let bad = || TrainbellError::Config(format!("invalid UTC offset '{value}' (expected +HH:MM)"));
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(bad()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| bad())?;
    let minutes: i32 = minutes.parse().map_err(|_| bad())?;
    if hours > 14 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}
