//! Timestamp labels shown next to each message.

use chrono::{DateTime, Local, Utc};

pub trait TimeFormatter {
    fn format(&self, at: DateTime<Utc>) -> String;
}

/// Short wall-clock time in the local timezone, e.g. `14:05`.
#[derive(Debug, Clone, Default)]
pub struct LocalTimeFormatter;

impl TimeFormatter for LocalTimeFormatter {
    fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&Local).format("%H:%M").to_string()
    }
}

/// Fixed-offset formatter in UTC; deterministic across machines.
#[derive(Debug, Clone, Default)]
pub struct UtcTimeFormatter;

impl TimeFormatter for UtcTimeFormatter {
    fn format(&self, at: DateTime<Utc>) -> String {
        at.format("%H:%M").to_string()
    }
}
