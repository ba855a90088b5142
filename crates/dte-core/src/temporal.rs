//! # Temporal Types — Authority Timestamps and Injected Clocks
//!
//! The tax authority's documents carry local wall-clock timestamps with no
//! zone designator (`YYYY-MM-DDTHH:MM:SS`) and calendar dates
//! (`YYYY-MM-DD`). `Timestamp` enforces seconds precision and that exact
//! rendering.
//!
//! Components that stamp time (stamp generation, document and envelope
//! signing) take a [`Clock`] at construction instead of reading the system
//! time directly, so tests can advance time deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::DteError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A local wall-clock timestamp truncated to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Wrap a naive datetime, truncating sub-seconds.
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Parse `YYYY-MM-DDTHH:MM:SS`.
    pub fn parse(s: &str) -> Result<Self, DteError> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|e| DteError::Temporal(format!("invalid timestamp {s:?}: {e}")))
    }

    /// Access the inner datetime.
    pub fn as_naive(&self) -> &NaiveDateTime {
        &self.0
    }

    /// Render in the authority's format (`2026-01-15T12:00:00`).
    pub fn to_authority_string(&self) -> String {
        self.0.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_authority_string())
    }
}

/// Parse an authority calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Result<NaiveDate, DteError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| DteError::Temporal(format!("invalid date {s:?}: {e}")))
}

/// Render an authority calendar date.
pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current local timestamp.
    fn now(&self) -> Timestamp;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_naive(Local::now().naive_local())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    epoch_secs: AtomicI64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            epoch_secs: AtomicI64::new(start.0.and_utc().timestamp()),
        }
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.epoch_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let secs = self.epoch_secs.load(Ordering::SeqCst);
        let dt = DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default();
        Timestamp(dt)
    }
}
