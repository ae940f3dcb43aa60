// src/cycle/template.rs

//! Time-templated strings.
//!
//! Task actions, properties, environment values, data paths, the journal
//! target and `timedep` targets are all "time templates": plain strings
//! with `@`-escapes that are substituted from a cycle timestamp.
//!
//! Supported escapes:
//!
//! | escape | meaning              |
//! |--------|----------------------|
//! | `@Y`   | 4-digit year         |
//! | `@y`   | 2-digit year         |
//! | `@m`   | 2-digit month        |
//! | `@d`   | 2-digit day          |
//! | `@j`   | 3-digit day of year  |
//! | `@H`   | 2-digit hour         |
//! | `@M`   | 2-digit minute       |
//! | `@S`   | 2-digit second       |
//! | `@s`   | seconds since epoch  |
//! | `@@`   | literal `@`          |
//!
//! Any other escape is kept verbatim, so paths containing stray `@`s do
//! not have to be escaped.

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// An immutable time template, resolved per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeTemplate {
    raw: String,
}

impl TimeTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Substitute all escapes against the given timestamp.
    pub fn resolve(&self, at: DateTime<Utc>) -> String {
        let mut out = String::with_capacity(self.raw.len());
        let mut chars = self.raw.chars();

        while let Some(c) = chars.next() {
            if c != '@' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('Y') => out.push_str(&format!("{:04}", at.year())),
                Some('y') => out.push_str(&format!("{:02}", at.year() % 100)),
                Some('m') => out.push_str(&format!("{:02}", at.month())),
                Some('d') => out.push_str(&format!("{:02}", at.day())),
                Some('j') => out.push_str(&format!("{:03}", at.ordinal())),
                Some('H') => out.push_str(&format!("{:02}", at.hour())),
                Some('M') => out.push_str(&format!("{:02}", at.minute())),
                Some('S') => out.push_str(&format!("{:02}", at.second())),
                Some('s') => out.push_str(&at.timestamp().to_string()),
                Some('@') => out.push('@'),
                Some(other) => {
                    out.push('@');
                    out.push(other);
                }
                None => out.push('@'),
            }
        }

        out
    }
}

impl fmt::Display for TimeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for TimeTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
