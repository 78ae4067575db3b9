//! Date-range selection: named presets anchored on the dataset's latest send,
//! or explicit custom bounds.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};

/// Inclusive UTC range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Range covering whole days `from 00:00:00` through `to 23:59:59`.
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            start: start_of_day(from),
            end: end_of_day(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    /// Number of calendar days touched by the range (at least 1).
    pub fn days(&self) -> i64 {
        ((self.end_date() - self.start_date()).num_days() + 1).max(1)
    }

    pub fn weeks(&self) -> f64 {
        self.days() as f64 / 7.0
    }

    /// The range of equal length ending the day before this one starts.
    pub fn previous(&self) -> Self {
        let days = self.days();
        let prev_end = self.start_date() - Duration::days(1);
        let prev_start = prev_end - Duration::days(days - 1);
        Self::from_dates(prev_start, prev_end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date(), self.end_date())
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last).and_utc()
}

/// Named range choices offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangePreset {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "14d")]
    Last14Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "60d")]
    Last60Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "120d")]
    Last120Days,
    #[serde(rename = "180d")]
    Last180Days,
    #[serde(rename = "365d")]
    Last365Days,
    #[serde(rename = "730d")]
    Last730Days,
    #[serde(rename = "all")]
    All,
    #[serde(rename = "custom")]
    Custom,
}

impl RangePreset {
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Last7Days => Some(7),
            Self::Last14Days => Some(14),
            Self::Last30Days => Some(30),
            Self::Last60Days => Some(60),
            Self::Last90Days => Some(90),
            Self::Last120Days => Some(120),
            Self::Last180Days => Some(180),
            Self::Last365Days => Some(365),
            Self::Last730Days => Some(730),
            Self::All | Self::Custom => None,
        }
    }
}

impl FromStr for RangePreset {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(Self::Last7Days),
            "14d" => Ok(Self::Last14Days),
            "30d" => Ok(Self::Last30Days),
            "60d" => Ok(Self::Last60Days),
            "90d" => Ok(Self::Last90Days),
            "120d" => Ok(Self::Last120Days),
            "180d" => Ok(Self::Last180Days),
            "365d" => Ok(Self::Last365Days),
            "730d" => Ok(Self::Last730Days),
            "all" => Ok(Self::All),
            "custom" => Ok(Self::Custom),
            other => Err(AnalyticsError::InvalidDateRange(format!(
                "unknown range preset '{other}'"
            ))),
        }
    }
}

/// What the caller asked for; resolved against the dataset's bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeSelector {
    pub preset: RangePreset,
    #[serde(default)]
    pub custom_from: Option<String>,
    #[serde(default)]
    pub custom_to: Option<String>,
}

impl DateRangeSelector {
    pub fn preset(preset: RangePreset) -> Self {
        Self {
            preset,
            custom_from: None,
            custom_to: None,
        }
    }

    pub fn custom(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            preset: RangePreset::Custom,
            custom_from: Some(from.into()),
            custom_to: Some(to.into()),
        }
    }
}

/// Resolve a selector into concrete bounds.
///
/// `data_bounds` is `(first, last)` send date of the dataset. Presets count
/// backwards from `last` inclusive, so `30d` ending on the 30th starts on the 1st.
pub fn resolve_date_range(
    selector: &DateRangeSelector,
    data_bounds: Option<(NaiveDate, NaiveDate)>,
) -> AnalyticsResult<DateRange> {
    if selector.preset == RangePreset::Custom {
        let from = parse_iso_date(selector.custom_from.as_deref(), "customFrom")?;
        let to = parse_iso_date(selector.custom_to.as_deref(), "customTo")?;
        if from > to {
            return Err(AnalyticsError::InvalidDateRange(format!(
                "custom range starts after it ends ({from} > {to})"
            )));
        }
        return Ok(DateRange::from_dates(from, to));
    }

    let (first, last) = data_bounds.ok_or_else(|| {
        AnalyticsError::InvalidDateRange("dataset has no dated send records".to_string())
    })?;

    match selector.preset.days() {
        Some(days) => Ok(DateRange::from_dates(last - Duration::days(days - 1), last)),
        None => Ok(DateRange::from_dates(first, last)),
    }
}

fn parse_iso_date(value: Option<&str>, field: &str) -> AnalyticsResult<NaiveDate> {
    let raw = value.ok_or_else(|| {
        AnalyticsError::InvalidDateRange(format!("{field} is required for a custom range"))
    })?;
    // Accept full ISO timestamps by keeping only the date part.
    let date_part = raw.trim().get(..10).unwrap_or(raw.trim());
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| AnalyticsError::InvalidDateRange(format!("{field} '{raw}': {e}")))
}
