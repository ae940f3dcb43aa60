// src/cycle/def.rs

//! Cycle definitions: stateless generators of cycle timestamps.
//!
//! A [`CycleDefinition`] is either a bounded interval (start/end/step) or
//! a cron-like field pattern. Given a reference timestamp it can produce
//! the previous matching timestamp (latest not after the reference), the
//! next matching timestamp (earliest strictly after), and answer whether
//! a given timestamp belongs to the definition at all.
//!
//! All timestamps are canonical UTC, truncated to whole minutes.

use std::collections::BTreeSet;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::errors::{CycleflowError, Result};

/// Timestamp format used throughout the source model.
pub const CYCLE_FORMAT: &str = "%Y%m%d%H%M";

/// How far a cron search will scan before giving up. Generous enough for
/// sparse patterns (e.g. Feb 29) while keeping runaway patterns bounded.
const CRON_SCAN_DAYS: i64 = 366 * 130;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CycleDefinition {
    /// `"YYYYMMDDHHMM YYYYMMDDHHMM HH:MM:SS"`, both endpoints inclusive.
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_seconds: i64,
    },
    /// `minute hour day-of-month month day-of-week year` field pattern.
    Cron(CronPattern),
}

impl CycleDefinition {
    /// Parse a 3-field interval definition.
    pub fn parse_interval(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(CycleflowError::Model(format!(
                "interval '{}' must have 3 fields: start end step",
                text
            )));
        }

        let start = parse_cycle_timestamp(fields[0])?;
        let end = parse_cycle_timestamp(fields[1])?;
        let step_seconds = parse_step(fields[2])?;

        if end < start {
            return Err(CycleflowError::Model(format!(
                "interval '{}' ends before it starts",
                text
            )));
        }

        Ok(CycleDefinition::Interval {
            start,
            end,
            step_seconds,
        })
    }

    /// Parse a 6-field cron definition.
    pub fn parse_cron(text: &str) -> Result<Self> {
        Ok(CycleDefinition::Cron(CronPattern::parse(text)?))
    }

    /// Latest generated timestamp not after `at`, if any.
    pub fn previous(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CycleDefinition::Interval {
                start,
                end,
                step_seconds,
            } => {
                let at = at.min(*end);
                if at < *start {
                    return None;
                }
                let k = (at - *start).num_seconds() / step_seconds;
                Some(*start + Duration::seconds(k * step_seconds))
            }
            CycleDefinition::Cron(pattern) => pattern.previous(at),
        }
    }

    /// Earliest generated timestamp strictly after `after`, if any.
    pub fn next(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CycleDefinition::Interval {
                start,
                end,
                step_seconds,
            } => {
                if after < *start {
                    return Some(*start);
                }
                let k = (after - *start).num_seconds() / step_seconds + 1;
                let candidate = *start + Duration::seconds(k * step_seconds);
                (candidate <= *end).then_some(candidate)
            }
            CycleDefinition::Cron(pattern) => pattern.next(after),
        }
    }

    /// Whether `cycle` is one of the timestamps this definition generates.
    pub fn contains(&self, cycle: DateTime<Utc>) -> bool {
        match self {
            CycleDefinition::Interval {
                start,
                end,
                step_seconds,
            } => {
                if cycle < *start || cycle > *end {
                    return false;
                }
                (cycle - *start).num_seconds() % step_seconds == 0
            }
            CycleDefinition::Cron(pattern) => pattern.matches(cycle),
        }
    }
}

/// Parse a `YYYYMMDDHHMM` timestamp as canonical UTC.
pub fn parse_cycle_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, CYCLE_FORMAT).map_err(|_| {
        CycleflowError::Model(format!(
            "'{}' is not a valid YYYYMMDDHHMM timestamp",
            text
        ))
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Render a cycle timestamp in the model's `YYYYMMDDHHMM` form.
pub fn format_cycle(cycle: DateTime<Utc>) -> String {
    cycle.format(CYCLE_FORMAT).to_string()
}

/// Parse a `DD:HH:MM:SS` or `HH:MM:SS` duration into seconds.
pub fn parse_duration(text: &str) -> Result<i64> {
    let parts: Vec<&str> = text.split(':').collect();
    let bad = || {
        CycleflowError::Model(format!(
            "duration '{}' must have the form DD:HH:MM:SS or HH:MM:SS",
            text
        ))
    };

    let (days, rest) = match parts.len() {
        3 => (0, &parts[..]),
        4 => (parts[0].parse::<i64>().map_err(|_| bad())?, &parts[1..]),
        _ => return Err(bad()),
    };
    let hours: i64 = rest[0].parse().map_err(|_| bad())?;
    let minutes: i64 = rest[1].parse().map_err(|_| bad())?;
    let seconds: i64 = rest[2].parse().map_err(|_| bad())?;
    if days < 0 || minutes >= 60 || seconds >= 60 || minutes < 0 || seconds < 0 || hours < 0 {
        return Err(bad());
    }

    let total = days * 86_400 + hours * 3600 + minutes * 60 + seconds;
    if total <= 0 {
        return Err(CycleflowError::Model(format!(
            "duration '{}' must be positive",
            text
        )));
    }
    Ok(total)
}

fn parse_step(text: &str) -> Result<i64> {
    let parts: Vec<&str> = text.split(':').collect();
    let bad = || {
        CycleflowError::Model(format!(
            "step '{}' must have the form HH:MM:SS",
            text
        ))
    };
    if parts.len() != 3 {
        return Err(bad());
    }
    let hours: i64 = parts[0].parse().map_err(|_| bad())?;
    let minutes: i64 = parts[1].parse().map_err(|_| bad())?;
    let seconds: i64 = parts[2].parse().map_err(|_| bad())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(bad());
    }
    let total = hours * 3600 + minutes * 60 + seconds;
    if total <= 0 {
        return Err(CycleflowError::Model(format!(
            "step '{}' must be a positive duration",
            text
        )));
    }
    Ok(total)
}

/// A cron-like field pattern over UTC minutes.
///
/// Field order is classic cron with a trailing year field:
/// `minute hour day-of-month month day-of-week year`. Day-of-month and
/// day-of-week both constrain the date. Day-of-week uses 0 = Sunday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronPattern {
    minute: FieldPattern,
    hour: FieldPattern,
    day: FieldPattern,
    month: FieldPattern,
    weekday: FieldPattern,
    year: FieldPattern,
}

impl CronPattern {
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(CycleflowError::Model(format!(
                "cron pattern '{}' must have 6 fields: \
                 minute hour day month day-of-week year",
                text
            )));
        }

        Ok(Self {
            minute: FieldPattern::parse(fields[0], 0, 59)?,
            hour: FieldPattern::parse(fields[1], 0, 23)?,
            day: FieldPattern::parse(fields[2], 1, 31)?,
            month: FieldPattern::parse(fields[3], 1, 12)?,
            weekday: FieldPattern::parse(fields[4], 0, 6)?,
            year: FieldPattern::parse(fields[5], 1970, 2199)?,
        })
    }

    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        at.second() == 0
            && at.nanosecond() == 0
            && self.matches_date(at.date_naive())
            && self.hour.matches(at.hour())
            && self.minute.matches(at.minute())
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        self.year.matches(date.year() as u32)
            && self.month.matches(date.month())
            && self.day.matches(date.day())
            && self.weekday.matches(date.weekday().num_days_from_sunday())
    }

    fn next(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Never return `after` itself: start the minute search one past it.
        let floor = floor_minute(after);
        let mut date = floor.date_naive();

        for _ in 0..CRON_SCAN_DAYS {
            if self.matches_date(date) {
                for hour in self.hour.iter_up(23) {
                    for minute in self.minute.iter_up(59) {
                        let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        let candidate = Utc.from_utc_datetime(&naive);
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    fn previous(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let floor = floor_minute(at);
        let mut date = floor.date_naive();

        for _ in 0..CRON_SCAN_DAYS {
            if self.matches_date(date) {
                for hour in self.hour.iter_down(23) {
                    for minute in self.minute.iter_down(59) {
                        let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        let candidate = Utc.from_utc_datetime(&naive);
                        if candidate <= floor {
                            return Some(candidate);
                        }
                    }
                }
            }
            date = date.pred_opt()?;
        }
        None
    }
}

fn floor_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), at.day(), at.hour(), at.minute(), 0)
        .single()
        .unwrap_or(at)
}

/// One cron field: `*`, `N`, `A-B`, `*/S`, `A-B/S` and comma lists.
///
/// `None` means `*` (unconstrained); otherwise the allowed values are
/// expanded into a set at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPattern {
    values: Option<BTreeSet<u32>>,
}

impl FieldPattern {
    pub fn any() -> Self {
        Self { values: None }
    }

    pub fn parse(text: &str, min: u32, max: u32) -> Result<Self> {
        if text == "*" {
            return Ok(Self::any());
        }

        let bad = |part: &str| {
            CycleflowError::Model(format!(
                "invalid cron field entry '{}' (allowed range {}-{})",
                part, min, max
            ))
        };

        let mut values = BTreeSet::new();
        for part in text.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((r, s)) => {
                    let step: u32 = s.parse().map_err(|_| bad(part))?;
                    if step == 0 {
                        return Err(bad(part));
                    }
                    (r, step)
                }
                None => (part, 1),
            };

            let (lo, hi) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                let a: u32 = a.parse().map_err(|_| bad(part))?;
                let b: u32 = b.parse().map_err(|_| bad(part))?;
                (a, b)
            } else {
                let v: u32 = range.parse().map_err(|_| bad(part))?;
                (v, v)
            };

            if lo > hi || lo < min || hi > max {
                return Err(bad(part));
            }
            values.extend((lo..=hi).step_by(step as usize));
        }

        Ok(Self {
            values: Some(values),
        })
    }

    pub fn matches(&self, v: u32) -> bool {
        match &self.values {
            None => true,
            Some(set) => set.contains(&v),
        }
    }

    fn iter_up(&self, max: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        match &self.values {
            None => Box::new(0..=max),
            Some(set) => Box::new(set.iter().copied()),
        }
    }

    fn iter_down(&self, max: u32) -> Box<dyn Iterator<Item = u32> + '_> {
        match &self.values {
            None => Box::new((0..=max).rev()),
            Some(set) => Box::new(set.iter().rev().copied()),
        }
    }
}
