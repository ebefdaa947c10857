//! Request filters: sort key, time window, result limit, date range
//!
//! Parsing is lenient by contract: unknown values are reported as `None`
//! and callers substitute the documented default.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::PluginStatusCounts;

/// Column the top-plugins table is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSort {
    #[default]
    Total,
    Activated,
    Deactivated,
}

impl StatusSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "total" => Some(Self::Total),
            "activated" => Some(Self::Activated),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        }
    }

    /// Sort key of a tally under this ordering
    pub fn key(&self, counts: &PluginStatusCounts) -> u64 {
        match self {
            Self::Total => counts.total,
            Self::Activated => counts.activated,
            Self::Deactivated => counts.deactivated,
        }
    }
}

/// How far back the top-plugins table looks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[default]
    #[serde(rename = "all-time")]
    AllTime,
    #[serde(rename = "24hours")]
    Last24Hours,
    #[serde(rename = "1week")]
    LastWeek,
    #[serde(rename = "1month")]
    LastMonth,
    #[serde(rename = "1year")]
    LastYear,
}

impl TimeWindow {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all-time" => Some(Self::AllTime),
            "24hours" => Some(Self::Last24Hours),
            "1week" => Some(Self::LastWeek),
            "1month" => Some(Self::LastMonth),
            "1year" => Some(Self::LastYear),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllTime => "all-time",
            Self::Last24Hours => "24hours",
            Self::LastWeek => "1week",
            Self::LastMonth => "1month",
            Self::LastYear => "1year",
        }
    }

    /// Oldest `update_date` still inside the window, `None` for all-time
    ///
    /// Months and years are calendar-relative (Mar 31 minus one month is
    /// Feb 28/29), matching how the admin UI describes them.
    pub fn cutoff(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::AllTime => None,
            Self::Last24Hours => Some(now - Duration::hours(24)),
            Self::LastWeek => Some(now - Duration::weeks(1)),
            Self::LastMonth => now.checked_sub_months(Months::new(1)),
            Self::LastYear => now.checked_sub_months(Months::new(12)),
        }
    }
}

/// Maximum number of ranked rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopLimit {
    Count(usize),
    /// No limit (`-1` on the wire)
    All,
}

impl Default for TopLimit {
    fn default() -> Self {
        Self::Count(5)
    }
}

impl TopLimit {
    /// `-1` means unlimited; other negative values are invalid
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::All),
            n if n >= 0 => Some(Self::Count(n as usize)),
            _ => None,
        }
    }

    pub fn apply<T>(&self, items: &mut Vec<T>) {
        if let Self::Count(n) = self {
            items.truncate(*n);
        }
    }
}

/// Inclusive calendar-date range `[from 00:00:00, to 23:59:59]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Parse a `YYYY-MM-DD` date
    pub fn parse_date(value: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
    }

    /// Both ends must be present and valid, otherwise there is no range
    pub fn parse(from: &str, to: &str) -> Option<Self> {
        Some(Self::new(Self::parse_date(from)?, Self::parse_date(to)?))
    }

    /// First instant of the range (`from 00:00:00`)
    pub fn start(&self) -> NaiveDateTime {
        self.from.and_time(NaiveTime::MIN)
    }

    /// Last instant of the range (`to 23:59:59`)
    pub fn end(&self) -> NaiveDateTime {
        self.to
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.to.and_time(NaiveTime::MIN))
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start() && *ts <= self.end()
    }
}
