//! Period summaries, period-over-period comparison, and metric time series.

use sendlens_core::{DateRange, SendRecord};
use serde::{Deserialize, Serialize};

use crate::bucketing::{aggregate_periods, Granularity, MetricRates, MetricSums};

/// Metrics exposed on dashboards and in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Revenue,
    EmailsSent,
    TotalOrders,
    OpenRate,
    ClickRate,
    ClickToOpenRate,
    ConversionRate,
    SpamRate,
    BounceRate,
    UnsubscribeRate,
    RevenuePerEmail,
    AvgOrderValue,
}

impl MetricKey {
    pub const ALL: [MetricKey; 12] = [
        Self::Revenue,
        Self::EmailsSent,
        Self::TotalOrders,
        Self::OpenRate,
        Self::ClickRate,
        Self::ClickToOpenRate,
        Self::ConversionRate,
        Self::SpamRate,
        Self::BounceRate,
        Self::UnsubscribeRate,
        Self::RevenuePerEmail,
        Self::AvgOrderValue,
    ];

    pub fn value(&self, sums: &MetricSums, rates: &MetricRates) -> f64 {
        match self {
            Self::Revenue => sums.revenue,
            Self::EmailsSent => sums.emails_sent as f64,
            Self::TotalOrders => sums.total_orders as f64,
            Self::OpenRate => rates.open_rate,
            Self::ClickRate => rates.click_rate,
            Self::ClickToOpenRate => rates.click_to_open_rate,
            Self::ConversionRate => rates.conversion_rate,
            Self::SpamRate => rates.spam_rate,
            Self::BounceRate => rates.bounce_rate,
            Self::UnsubscribeRate => rates.unsubscribe_rate,
            Self::RevenuePerEmail => rates.revenue_per_email,
            Self::AvgOrderValue => rates.avg_order_value,
        }
    }

    /// For risk metrics a decrease is the good direction.
    pub fn lower_is_better(&self) -> bool {
        matches!(
            self,
            Self::SpamRate | Self::BounceRate | Self::UnsubscribeRate
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub range: DateRange,
    pub sums: MetricSums,
    pub rates: MetricRates,
}

pub fn summarize<'a>(
    records: impl IntoIterator<Item = &'a SendRecord>,
    range: &DateRange,
) -> PeriodSummary {
    let sums =
        MetricSums::from_records(records.into_iter().filter(|r| range.contains(r.sent_date)));
    PeriodSummary {
        range: *range,
        rates: sums.rates(),
        sums,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: MetricKey,
    pub current: f64,
    pub previous: f64,
    /// `None` when the previous value is zero.
    pub change_percent: Option<f64>,
    pub trend: Trend,
    pub improved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub current: PeriodSummary,
    pub previous: PeriodSummary,
    pub metrics: Vec<MetricComparison>,
}

/// Changes smaller than this (in percent) are reported as flat.
const FLAT_BAND_PERCENT: f64 = 0.5;

/// Compare `range` against the immediately preceding range of equal length.
pub fn compare_periods(records: &[&SendRecord], range: &DateRange) -> PeriodComparison {
    let current = summarize(records.iter().copied(), range);
    let previous = summarize(records.iter().copied(), &range.previous());

    let metrics = MetricKey::ALL
        .iter()
        .map(|key| {
            let cur = key.value(&current.sums, &current.rates);
            let prev = key.value(&previous.sums, &previous.rates);
            let change_percent = (prev != 0.0).then(|| (cur - prev) / prev.abs() * 100.0);
            let trend = match change_percent {
                Some(c) if c > FLAT_BAND_PERCENT => Trend::Up,
                Some(c) if c < -FLAT_BAND_PERCENT => Trend::Down,
                Some(_) => Trend::Flat,
                None if cur > 0.0 => Trend::Up,
                None => Trend::Flat,
            };
            let improved = match trend {
                Trend::Up => !key.lower_is_better(),
                Trend::Down => key.lower_is_better(),
                Trend::Flat => false,
            };
            MetricComparison {
                metric: *key,
                current: cur,
                previous: prev,
                change_percent,
                trend,
                improved,
            }
        })
        .collect();

    PeriodComparison {
        current,
        previous,
        metrics,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub period_start: chrono::NaiveDate,
    pub value: f64,
    pub is_complete: bool,
}

/// One point per week or month touching the range.
pub fn metric_time_series<'a>(
    records: impl IntoIterator<Item = &'a SendRecord>,
    range: &DateRange,
    granularity: Granularity,
    metric: MetricKey,
) -> Vec<TimeSeriesPoint> {
    aggregate_periods(records, range, granularity)
        .into_iter()
        .map(|bucket| TimeSeriesPoint {
            period_start: bucket.period_start,
            value: metric.value(&bucket.sums, &bucket.rates),
            is_complete: bucket.is_complete,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn send(m: u32, day: u32, emails: u64, revenue: f64, spam: u64) -> SendRecord {
        let mut r = SendRecord::campaign("c", Utc.with_ymd_and_hms(2024, m, day, 9, 0, 0).unwrap());
        r.emails_sent = emails;
        r.revenue = revenue;
        r.spam_complaints_count = spam;
        r
    }

    fn range(m: u32) -> DateRange {
        let from = NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
        DateRange::from_dates(from, from + chrono::Duration::days(27))
    }

    #[test]
    fn test_comparison_against_previous_period() {
        let records = vec![send(2, 5, 1000, 100.0, 3), send(3, 5, 1000, 150.0, 1)];
        let refs: Vec<&SendRecord> = records.iter().collect();
        let cmp = compare_periods(&refs, &range(3));

        let revenue = cmp
            .metrics
            .iter()
            .find(|m| m.metric == MetricKey::Revenue)
            .unwrap();
        assert_eq!(revenue.current, 150.0);
        assert_eq!(revenue.previous, 100.0);
        assert!((revenue.change_percent.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(revenue.trend, Trend::Up);
        assert!(revenue.improved);

        let spam = cmp
            .metrics
            .iter()
            .find(|m| m.metric == MetricKey::SpamRate)
            .unwrap();
        assert_eq!(spam.trend, Trend::Down);
        assert!(spam.improved);
    }

    #[test]
    fn test_zero_previous_has_no_percent() {
        let records = vec![send(3, 5, 1000, 150.0, 0)];
        let refs: Vec<&SendRecord> = records.iter().collect();
        let cmp = compare_periods(&refs, &range(3));
        let revenue = cmp
            .metrics
            .iter()
            .find(|m| m.metric == MetricKey::Revenue)
            .unwrap();
        assert!(revenue.change_percent.is_none());
        assert_eq!(revenue.trend, Trend::Up);
    }

    #[test]
    fn test_time_series_includes_empty_weeks() {
        let records = vec![send(3, 5, 1000, 150.0, 0)];
        let series =
            metric_time_series(&records, &range(3), Granularity::Weekly, MetricKey::Revenue);
        assert!(series.len() >= 4);
        assert_eq!(series.iter().map(|p| p.value).sum::<f64>(), 150.0);
        assert!(series.iter().any(|p| p.value == 0.0));
    }
}
