//! Send frequency: groups complete weeks by campaigns sent and compares
//! recency-weighted weekly revenue between cadences.

use std::collections::BTreeMap;

use chrono::Duration;
use sendlens_core::{DateRange, SendRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{aggregate_periods, Granularity, MetricRates, MetricSums, PeriodBucket};
use crate::context::AnalysisContext;
use crate::format::{currency, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::segment::SegmentAnalyzer;
use crate::stats::{iqr_fences, median, percentile, safe_div, weighted_mean_std};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBucket {
    pub campaigns_per_week: u32,
    pub label: String,
    /// Weeks kept after outlier trimming.
    pub weeks: usize,
    pub trimmed_weeks: usize,
    pub sums: MetricSums,
    pub rates: MetricRates,
    /// Recency-weighted mean weekly revenue.
    pub avg_weekly_revenue: f64,
    pub weekly_revenue_std_dev: f64,
    pub std_error: f64,
    pub avg_campaign_revenue: f64,
    pub avg_weekly_emails: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAnalysis {
    pub buckets: Vec<FrequencyBucket>,
    pub weeks_analyzed: usize,
    pub anomaly_weeks_excluded: usize,
    /// Trailing-year weekly campaign count percentile used as the cut-off.
    pub anomaly_threshold: Option<f64>,
    pub anomaly_filter_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDetails {
    pub analysis: FrequencyAnalysis,
    pub baseline_per_week: Option<u32>,
    pub target_per_week: Option<u32>,
    pub lower_confidence_bound: Option<f64>,
}

pub fn cadence_label(per_week: u32) -> String {
    format!("{}/week", plural(per_week, "campaign"))
}

/// Weekly campaign counts of complete, non-empty weeks.
fn weekly_counts(records: &[&SendRecord], range: &DateRange) -> Vec<PeriodBucket> {
    aggregate_periods(records.iter().copied(), range, Granularity::Weekly)
        .into_iter()
        .filter(|w| w.is_complete && w.sums.send_count > 0)
        .collect()
}

/// Seasonal-anomaly cut-off from the trailing window ending at `range.end`.
///
/// Returns `None` when the trailing window is too short, or when the current
/// window's median cadence already exceeds the trailing percentile.
fn anomaly_threshold(
    all_campaigns: &[SendRecord],
    range: &DateRange,
    current_counts: &[f64],
    ctx: &AnalysisContext<'_>,
) -> Option<f64> {
    let cfg = &ctx.config.frequency;
    let trailing = DateRange::from_dates(
        range.end_date() - Duration::days(cfg.trailing_window_days - 1),
        range.end_date(),
    );
    let refs: Vec<&SendRecord> = all_campaigns
        .iter()
        .filter(|c| trailing.contains(c.sent_date))
        .collect();
    let trailing_counts: Vec<f64> = weekly_counts(&refs, &trailing)
        .iter()
        .map(|w| w.sums.send_count as f64)
        .collect();
    if trailing_counts.len() < cfg.min_trailing_weeks {
        return None;
    }
    let threshold = percentile(&trailing_counts, cfg.anomaly_percentile);
    if median(current_counts) > threshold {
        return None;
    }
    Some(threshold)
}

pub fn analyze_send_frequency(ctx: &AnalysisContext<'_>) -> FrequencyAnalysis {
    let cfg = &ctx.config.frequency;
    let range = ctx.range;
    let weeks = weekly_counts(&ctx.campaigns(), &range);
    let counts: Vec<f64> = weeks.iter().map(|w| w.sums.send_count as f64).collect();

    let threshold = anomaly_threshold(ctx.dataset.campaigns(), &range, &counts, ctx);
    let (kept, excluded): (Vec<&PeriodBucket>, Vec<&PeriodBucket>) = weeks
        .iter()
        .partition(|w| threshold.map_or(true, |t| (w.sums.send_count as f64) <= t));

    let range_days = range.days() as f64;
    let mut groups: BTreeMap<u32, Vec<(&PeriodBucket, f64)>> = BTreeMap::new();
    for week in kept.iter().copied() {
        let offset = (week.period_start - range.start_date()).num_days().max(0) as f64;
        let weight = 1.0 + offset / range_days;
        groups
            .entry(week.sums.send_count as u32)
            .or_default()
            .push((week, weight));
    }

    let buckets: Vec<FrequencyBucket> = groups
        .into_iter()
        .filter_map(|(per_week, members)| {
            build_bucket(per_week, members, cfg.iqr_multiplier, cfg.iqr_min_weeks)
        })
        .collect();

    debug!(
        weeks = weeks.len(),
        anomalies = excluded.len(),
        buckets = buckets.len(),
        "Send frequency buckets computed"
    );

    FrequencyAnalysis {
        weeks_analyzed: buckets.iter().map(|b| b.weeks).sum(),
        buckets,
        anomaly_weeks_excluded: excluded.len(),
        anomaly_threshold: threshold,
        anomaly_filter_active: threshold.is_some(),
    }
}

fn build_bucket(
    per_week: u32,
    members: Vec<(&PeriodBucket, f64)>,
    iqr_multiplier: f64,
    iqr_min_weeks: usize,
) -> Option<FrequencyBucket> {
    let total = members.len();
    let members: Vec<(&PeriodBucket, f64)> = if total >= iqr_min_weeks {
        let revenues: Vec<f64> = members.iter().map(|(w, _)| w.sums.revenue).collect();
        match iqr_fences(&revenues, iqr_multiplier) {
            Some((lo, hi)) => members
                .into_iter()
                .filter(|(w, _)| w.sums.revenue >= lo && w.sums.revenue <= hi)
                .collect(),
            None => members,
        }
    } else {
        members
    };
    if members.is_empty() {
        return None;
    }

    let mut sums = MetricSums::default();
    for (week, _) in &members {
        sums.merge(&week.sums);
    }
    let revenues: Vec<f64> = members.iter().map(|(w, _)| w.sums.revenue).collect();
    let weights: Vec<f64> = members.iter().map(|(_, weight)| *weight).collect();
    let (avg, std) = weighted_mean_std(&revenues, &weights);
    let n = members.len();

    Some(FrequencyBucket {
        campaigns_per_week: per_week,
        label: cadence_label(per_week),
        weeks: n,
        trimmed_weeks: total - n,
        rates: sums.rates(),
        avg_weekly_revenue: avg,
        weekly_revenue_std_dev: std,
        std_error: std / (n as f64).sqrt(),
        avg_campaign_revenue: safe_div(sums.revenue, sums.send_count as f64),
        avg_weekly_emails: safe_div(sums.emails_sent as f64, n as f64),
        sums,
    })
}

pub fn send_frequency_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let cfg = &ctx.config.frequency;
    let limits = &ctx.config.deliverability;
    let analysis = analyze_send_frequency(ctx);
    let sample = analysis.weeks_analyzed;

    let details = |baseline: Option<u32>,
                   target: Option<u32>,
                   lcb: Option<f64>,
                   analysis: FrequencyAnalysis| {
        GuidanceDetails::Frequency(FrequencyDetails {
            analysis,
            baseline_per_week: baseline,
            target_per_week: target,
            lower_confidence_bound: lcb,
        })
    };

    if sample < cfg.min_total_weeks || analysis.buckets.is_empty() {
        return GuidanceResult::insufficient(
            ModuleKey::SendFrequency,
            format!(
                "Need at least {} of campaign sends in this range to compare cadences.",
                plural(cfg.min_total_weeks as u32, "complete week")
            ),
            sample,
            details(None, None, None, analysis),
        );
    }

    let buckets = &analysis.buckets;
    let dominant = buckets
        .iter()
        .max_by(|a, b| {
            a.weeks
                .cmp(&b.weeks)
                .then(b.campaigns_per_week.cmp(&a.campaigns_per_week))
        })
        .cloned();
    let Some(dominant) = dominant else {
        return GuidanceResult::insufficient(
            ModuleKey::SendFrequency,
            "No campaign weeks to compare.",
            sample,
            details(None, None, None, analysis),
        );
    };

    let is_safe = |b: &FrequencyBucket| {
        b.rates.spam_rate <= limits.spam_red_limit && b.rates.bounce_rate <= limits.bounce_red_limit
    };
    let best = buckets
        .iter()
        .filter(|b| is_safe(b))
        .max_by(|a, b| a.avg_weekly_revenue.total_cmp(&b.avg_weekly_revenue))
        .cloned();

    let base_key = Some(dominant.campaigns_per_week.to_string());
    let mut result = GuidanceResult {
        module: ModuleKey::SendFrequency,
        status: GuidanceStatus::NoChange,
        recommendation: RecommendationKind::Stay,
        cadence_label: Some(dominant.label.clone()),
        title: format!("Keep sending {}", dominant.label),
        message: String::new(),
        sample,
        baseline_key: base_key,
        target_key: None,
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details: details(
            Some(dominant.campaigns_per_week),
            None,
            None,
            analysis.clone(),
        ),
    };

    let Some(best) = best else {
        // Every cadence breaches a red limit: step down to the lightest one seen.
        let lightest = buckets
            .iter()
            .min_by_key(|b| b.campaigns_per_week)
            .cloned();
        if let Some(lightest) =
            lightest.filter(|l| l.campaigns_per_week < dominant.campaigns_per_week)
        {
            result.status = GuidanceStatus::Actionable;
            result.recommendation = RecommendationKind::ScaleDown;
            result.cadence_label = Some(lightest.label.clone());
            result.target_key = Some(lightest.campaigns_per_week.to_string());
            result.title = format!("Scale back to {}", lightest.label);
            result.message = "Every cadence in this range exceeds spam or bounce limits. \
                 Sending less often protects inbox placement while list quality is repaired."
                .to_string();
            result.details = details(
                Some(dominant.campaigns_per_week),
                Some(lightest.campaigns_per_week),
                None,
                analysis,
            );
        } else {
            result.message = format!(
                "{} exceeds spam or bounce limits and no lighter cadence has been tried. \
                 Clean the list before changing cadence.",
                dominant.label
            );
        }
        return result;
    };

    if best.campaigns_per_week == dominant.campaigns_per_week {
        result.message = format!(
            "{} is both your most common cadence and your best earner at {} per week.",
            dominant.label,
            currency(best.avg_weekly_revenue)
        );
        return result;
    }

    let delta = best.avg_weekly_revenue - dominant.avg_weekly_revenue;
    let lcb = best.avg_weekly_revenue - cfg.z_score * best.std_error;
    let going_up = best.campaigns_per_week > dominant.campaigns_per_week;
    result.target_key = Some(best.campaigns_per_week.to_string());
    result.details = details(
        Some(dominant.campaigns_per_week),
        Some(best.campaigns_per_week),
        Some(lcb),
        analysis,
    );

    if !is_safe(&dominant) && !going_up {
        result.status = GuidanceStatus::Actionable;
        result.recommendation = RecommendationKind::ScaleDown;
        result.cadence_label = Some(best.label.clone());
        result.title = format!("Scale back to {}", best.label);
        result.message = format!(
            "Your usual {} breaches spam or bounce limits; \
             {} stayed within them and averaged {} per week.",
            dominant.label,
            best.label,
            currency(best.avg_weekly_revenue)
        );
        return result.with_weekly_gain(delta, ctx.config.guidance.weeks_per_month);
    }

    if best.weeks < cfg.min_weeks_per_bucket {
        result.status = GuidanceStatus::Actionable;
        result.recommendation = if going_up {
            RecommendationKind::TestHigher
        } else {
            RecommendationKind::TestLower
        };
        result.cadence_label = Some(best.label.clone());
        result.title = format!("Test {}", best.label);
        result.message = format!(
            "Only {} at {} so far, averaging {} versus {} at {}. \
             Run a few more weeks at this cadence to confirm.",
            plural(best.weeks as u32, "week"),
            best.label,
            currency(best.avg_weekly_revenue),
            currency(dominant.avg_weekly_revenue),
            dominant.label
        );
        return result.with_weekly_gain(delta, ctx.config.guidance.weeks_per_month);
    }

    if lcb > dominant.avg_weekly_revenue {
        result.status = GuidanceStatus::Actionable;
        result.recommendation = if going_up {
            RecommendationKind::ScaleUp
        } else {
            RecommendationKind::ScaleDown
        };
        result.cadence_label = Some(best.label.clone());
        result.title = if going_up {
            format!("Send more often: {}", best.label)
        } else {
            format!("Send less often: {}", best.label)
        };
        result.message = format!(
            "Weeks with {} averaged {} in revenue versus {} at your usual {}, \
             across {} and within deliverability limits.",
            best.label,
            currency(best.avg_weekly_revenue),
            currency(dominant.avg_weekly_revenue),
            dominant.label,
            plural(best.weeks as u32, "week")
        );
        return result.with_weekly_gain(delta, ctx.config.guidance.weeks_per_month);
    }

    result.message = format!(
        "{} earned more on average ({} vs {}) \
         but the difference is within normal week-to-week variation.",
        best.label,
        currency(best.avg_weekly_revenue),
        currency(dominant.avg_weekly_revenue)
    );
    result
}

/// Send frequency as a [`SegmentAnalyzer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SendFrequencyAnalyzer;

impl SegmentAnalyzer for SendFrequencyAnalyzer {
    type Bucket = FrequencyBucket;

    fn module(&self) -> ModuleKey {
        ModuleKey::SendFrequency
    }

    fn buckets(&self, ctx: &AnalysisContext<'_>) -> Vec<FrequencyBucket> {
        analyze_send_frequency(ctx).buckets
    }

    fn guidance(&self, ctx: &AnalysisContext<'_>) -> GuidanceResult {
        send_frequency_guidance(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use sendlens_core::{AnalyticsConfig, Dataset};

    fn campaign(date: NaiveDate, revenue: f64) -> SendRecord {
        let mut r = SendRecord::campaign(
            "c",
            Utc.from_utc_datetime(&date.and_hms_opt(10, 0, 0).unwrap()),
        );
        r.emails_sent = 10_000;
        r.revenue = revenue;
        r
    }

    /// `weeks` weeks from Monday 2024-01-01, `per_week(i)` campaigns in week i.
    fn dataset(
        weeks: usize,
        per_week: impl Fn(usize) -> usize,
        revenue: impl Fn(usize) -> f64,
    ) -> Dataset {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut campaigns = Vec::new();
        for w in 0..weeks {
            for c in 0..per_week(w) {
                let date = monday + Duration::days((w * 7 + c) as i64);
                campaigns.push(campaign(date, revenue(w)));
            }
        }
        Dataset::new(campaigns, vec![], vec![])
    }

    fn range(weeks: usize) -> DateRange {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        DateRange::from_dates(monday, monday + Duration::days(weeks as i64 * 7 - 1))
    }

    #[test]
    fn test_only_observed_cadences_appear() {
        let data = dataset(8, |_| 2, |_| 100.0);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(8), &config);
        let analysis = analyze_send_frequency(&ctx);
        let keys: Vec<u32> = analysis
            .buckets
            .iter()
            .map(|b| b.campaigns_per_week)
            .collect();
        assert_eq!(keys, vec![2]);
        assert_eq!(analysis.buckets[0].weeks, 8);
    }

    #[test]
    fn test_iqr_trims_holiday_spike() {
        let data = dataset(
            8,
            |_| 1,
            |w| if w == 5 { 5_000.0 } else { 100.0 + w as f64 },
        );
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(8), &config);
        let bucket = &analyze_send_frequency(&ctx).buckets[0];
        assert_eq!(bucket.trimmed_weeks, 1);
        assert!(bucket.avg_weekly_revenue < 200.0);
    }

    #[test]
    fn test_recent_weeks_weigh_more() {
        let data = dataset(4, |_| 1, |w| 100.0 * (w + 1) as f64);
        let mut config = AnalyticsConfig::default();
        config.frequency.iqr_min_weeks = 100;
        let ctx = AnalysisContext::new(&data, range(4), &config);
        let bucket = &analyze_send_frequency(&ctx).buckets[0];
        assert!(bucket.avg_weekly_revenue > 250.0);
    }

    #[test]
    fn test_scale_up_when_higher_cadence_reliably_earns_more() {
        // Alternating 2 and 3 campaigns per week, with 3/week earning far more,
        // and 2/week more common.
        let data = dataset(
            20,
            |w| if w % 3 == 0 { 3 } else { 2 },
            |w| {
                let base = if w % 3 == 0 { 1_000.0 } else { 200.0 };
                base + (w % 2) as f64 * 10.0
            },
        );
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(20), &config);
        let result = send_frequency_guidance(&ctx);
        assert_eq!(result.status, GuidanceStatus::Actionable);
        assert_eq!(result.recommendation, RecommendationKind::ScaleUp);
        assert_eq!(result.baseline_key.as_deref(), Some("2"));
        assert_eq!(result.target_key.as_deref(), Some("3"));
        assert!(result.estimated_weekly_gain.unwrap() > 0.0);
    }

    #[test]
    fn test_small_bucket_is_downgraded_to_test() {
        let data = dataset(
            10,
            |w| if w == 9 { 3 } else { 1 },
            |w| if w == 9 { 900.0 } else { 100.0 },
        );
        let mut config = AnalyticsConfig::default();
        config.frequency.min_trailing_weeks = 1000;
        let ctx = AnalysisContext::new(&data, range(10), &config);
        let result = send_frequency_guidance(&ctx);
        assert_eq!(result.recommendation, RecommendationKind::TestHigher);
    }

    #[test]
    fn test_too_few_weeks_is_insufficient() {
        let data = dataset(2, |_| 1, |_| 100.0);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(2), &config);
        let result = send_frequency_guidance(&ctx);
        assert!(result.is_insufficient());
    }

    #[test]
    fn test_anomaly_filter_drops_unusually_busy_weeks() {
        // A year of 1/week, then a current range containing one 6/week week.
        let data = dataset(52, |w| if w == 50 { 6 } else { 1 }, |_| 100.0);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(52), &config);
        let analysis = analyze_send_frequency(&ctx);
        assert!(analysis.anomaly_filter_active);
        assert_eq!(analysis.anomaly_weeks_excluded, 1);
        assert!(analysis.buckets.iter().all(|b| b.campaigns_per_week == 1));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let data = dataset(12, |w| 1 + w % 2, |w| 100.0 + w as f64);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(12), &config);
        assert_eq!(send_frequency_guidance(&ctx), send_frequency_guidance(&ctx));
    }
}
