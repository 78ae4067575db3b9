//! Time bucketing: groups send records into Monday-start UTC weeks or
//! calendar months and computes zero-guarded rates per bucket.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use sendlens_core::{DateRange, SendRecord};
use serde::{Deserialize, Serialize};

use crate::stats::safe_div;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Weekly,
    Monthly,
}

/// Monday of the UTC week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

impl Granularity {
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Weekly => week_start(date),
            Self::Monthly => month_start(date),
        }
    }

    pub fn next_period(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Self::Weekly => start + Duration::days(7),
            Self::Monthly => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start + Duration::days(31)),
        }
    }

    /// Last day of the period beginning at `start`.
    pub fn period_end(&self, start: NaiveDate) -> NaiveDate {
        self.next_period(start) - Duration::days(1)
    }
}

// ─── Sums and Rates ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSums {
    pub send_count: u64,
    pub emails_sent: u64,
    pub revenue: f64,
    pub total_orders: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub unsubscribes: u64,
    pub spam_complaints: u64,
    pub bounces: u64,
}

impl MetricSums {
    pub fn add(&mut self, record: &SendRecord) {
        self.send_count += 1;
        self.emails_sent += record.emails_sent;
        self.revenue += record.revenue;
        self.total_orders += record.total_orders;
        self.unique_opens += record.unique_opens;
        self.unique_clicks += record.unique_clicks;
        self.unsubscribes += record.unsubscribes_count;
        self.spam_complaints += record.spam_complaints_count;
        self.bounces += record.bounces_count;
    }

    pub fn merge(&mut self, other: &MetricSums) {
        self.send_count += other.send_count;
        self.emails_sent += other.emails_sent;
        self.revenue += other.revenue;
        self.total_orders += other.total_orders;
        self.unique_opens += other.unique_opens;
        self.unique_clicks += other.unique_clicks;
        self.unsubscribes += other.unsubscribes;
        self.spam_complaints += other.spam_complaints;
        self.bounces += other.bounces;
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a SendRecord>) -> Self {
        let mut sums = Self::default();
        for record in records {
            sums.add(record);
        }
        sums
    }

    pub fn rates(&self) -> MetricRates {
        MetricRates::from_sums(self)
    }
}

/// Percentages of emails sent, plus per-email and per-order money metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRates {
    pub open_rate: f64,
    pub click_rate: f64,
    pub click_to_open_rate: f64,
    pub conversion_rate: f64,
    pub spam_rate: f64,
    pub bounce_rate: f64,
    pub unsubscribe_rate: f64,
    pub revenue_per_email: f64,
    pub avg_order_value: f64,
}

impl MetricRates {
    pub fn from_sums(sums: &MetricSums) -> Self {
        let emails = sums.emails_sent as f64;
        Self {
            open_rate: pct(sums.unique_opens as f64, emails),
            click_rate: pct(sums.unique_clicks as f64, emails),
            click_to_open_rate: pct(sums.unique_clicks as f64, sums.unique_opens as f64),
            conversion_rate: pct(sums.total_orders as f64, sums.unique_clicks as f64),
            spam_rate: pct(sums.spam_complaints as f64, emails),
            bounce_rate: pct(sums.bounces as f64, emails),
            unsubscribe_rate: pct(sums.unsubscribes as f64, emails),
            revenue_per_email: safe_div(sums.revenue, emails),
            avg_order_value: safe_div(sums.revenue, sums.total_orders as f64),
        }
    }
}

/// `count / total * 100`, zero-guarded and clamped into `[0, 100]`.
pub fn pct(count: f64, total: f64) -> f64 {
    (safe_div(count, total) * 100.0).clamp(0.0, 100.0)
}

// ─── Period Buckets ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// The whole calendar period lies inside the requested range.
    pub is_complete: bool,
    pub sums: MetricSums,
    pub rates: MetricRates,
}

/// One bucket per period touching `range`, empty periods included, in
/// chronological order. Records outside `range` are ignored.
pub fn aggregate_periods<'a>(
    records: impl IntoIterator<Item = &'a SendRecord>,
    range: &DateRange,
    granularity: Granularity,
) -> Vec<PeriodBucket> {
    let mut by_period: BTreeMap<NaiveDate, MetricSums> = BTreeMap::new();
    for record in records {
        if !range.contains(record.sent_date) {
            continue;
        }
        let key = granularity.period_start(record.sent_date.date_naive());
        by_period.entry(key).or_default().add(record);
    }

    let first_day = range.start_date();
    let last_day = range.end_date();
    let mut buckets = Vec::new();
    let mut start = granularity.period_start(first_day);

    while start <= last_day {
        let end = granularity.period_end(start);
        let sums = by_period.get(&start).copied().unwrap_or_default();
        buckets.push(PeriodBucket {
            period_start: start,
            period_end: end,
            is_complete: start >= first_day && end <= last_day,
            rates: sums.rates(),
            sums,
        });
        start = granularity.next_period(start);
    }

    buckets
}

/// Buckets whose whole period is inside the range.
pub fn complete_only(buckets: &[PeriodBucket]) -> Vec<&PeriodBucket> {
    buckets.iter().filter(|b| b.is_complete).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn send(y: i32, m: u32, day: u32, emails: u64, revenue: f64) -> SendRecord {
        let mut r = SendRecord::campaign("c", Utc.with_ymd_and_hms(y, m, day, 15, 0, 0).unwrap());
        r.emails_sent = emails;
        r.revenue = revenue;
        r.unique_opens = emails / 4;
        r.spam_complaints_count = emails / 1000;
        r
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2024-01-07 is a Sunday; its week starts Monday 2024-01-01.
        assert_eq!(week_start(d(2024, 1, 7)), d(2024, 1, 1));
        assert_eq!(week_start(d(2024, 1, 8)), d(2024, 1, 8));
        assert_eq!(month_start(d(2024, 2, 29)), d(2024, 2, 1));
    }

    #[test]
    fn test_zero_emails_give_zero_rates() {
        let rates = MetricSums::default().rates();
        assert_eq!(rates, MetricRates::default());
        assert!(!rates.open_rate.is_nan());
    }

    #[test]
    fn test_rates_are_percentages() {
        let sums = MetricSums::from_records(&[send(2024, 1, 2, 10_000, 500.0)]);
        let rates = sums.rates();
        assert!((rates.open_rate - 25.0).abs() < 1e-9);
        assert!((rates.spam_rate - 0.1).abs() < 1e-9);
        assert!((rates.revenue_per_email - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_weekly_buckets_mark_partial_boundaries() {
        // Wednesday 2024-01-03 through Sunday 2024-01-28.
        let range = DateRange::from_dates(d(2024, 1, 3), d(2024, 1, 28));
        let records = vec![send(2024, 1, 4, 100, 10.0), send(2024, 1, 16, 200, 20.0)];
        let buckets = aggregate_periods(&records, &range, Granularity::Weekly);

        let starts: Vec<NaiveDate> = buckets.iter().map(|b| b.period_start).collect();
        assert_eq!(
            starts,
            vec![d(2024, 1, 1), d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 22)]
        );
        assert!(!buckets[0].is_complete);
        assert!(buckets[1..].iter().all(|b| b.is_complete));
        assert_eq!(buckets[1].sums.send_count, 0);
        assert_eq!(buckets[2].sums.emails_sent, 200);
    }

    #[test]
    fn test_monthly_buckets() {
        let range = DateRange::from_dates(d(2024, 1, 1), d(2024, 3, 15));
        let records = vec![send(2024, 2, 10, 100, 10.0)];
        let buckets = aggregate_periods(&records, &range, Granularity::Monthly);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[1].period_end, d(2024, 2, 29));
        assert!(buckets[1].is_complete);
        assert!(!buckets[2].is_complete);
        assert_eq!(complete_only(&buckets).len(), 2);
    }
}
