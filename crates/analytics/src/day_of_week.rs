//! Campaign send day: revenue per campaign by UTC weekday.

use chrono::{Datelike, Weekday};
use sendlens_core::SendRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{MetricRates, MetricSums};
use crate::context::AnalysisContext;
use crate::format::{currency, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::segment::SegmentAnalyzer;
use crate::stats::safe_div;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOfWeekBucket {
    pub weekday: Weekday,
    pub label: String,
    pub campaigns: usize,
    pub sums: MetricSums,
    pub rates: MetricRates,
    pub avg_campaign_revenue: f64,
    pub campaigns_per_week: f64,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOfWeekDetails {
    pub buckets: Vec<DayOfWeekBucket>,
    pub best_day: Option<Weekday>,
    pub most_used_day: Option<Weekday>,
}

pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Monday-first buckets of the campaigns in range; days with no campaigns are omitted.
pub fn analyze_day_of_week(ctx: &AnalysisContext<'_>) -> Vec<DayOfWeekBucket> {
    let cfg = &ctx.config.day_of_week;
    let weeks = ctx.weeks_in_range();

    let mut groups: [Vec<&SendRecord>; 7] = Default::default();
    for campaign in ctx.campaigns() {
        // Sunday is index 6, not 0.
        let idx = campaign.sent_date.weekday().num_days_from_monday() as usize;
        groups[idx].push(campaign);
    }

    let buckets: Vec<DayOfWeekBucket> = groups
        .iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(idx, members)| {
            let weekday = members[0].sent_date.weekday();
            let sums = MetricSums::from_records(members.iter().copied());
            let per_week = safe_div(members.len() as f64, weeks);
            debug_assert_eq!(weekday.num_days_from_monday() as usize, idx);
            DayOfWeekBucket {
                weekday,
                label: weekday_label(weekday).to_string(),
                campaigns: members.len(),
                rates: sums.rates(),
                avg_campaign_revenue: safe_div(sums.revenue, members.len() as f64),
                campaigns_per_week: per_week,
                eligible: members.len() >= cfg.min_campaigns_per_day
                    && per_week >= cfg.min_campaigns_per_week,
                sums,
            }
        })
        .collect();

    debug!(days = buckets.len(), "Day-of-week buckets computed");
    buckets
}

pub fn day_of_week_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let cfg = &ctx.config.day_of_week;
    let buckets = analyze_day_of_week(ctx);
    let sample: usize = buckets.iter().map(|b| b.campaigns).sum();

    let eligible: Vec<&DayOfWeekBucket> = buckets.iter().filter(|b| b.eligible).collect();
    let best = eligible
        .iter()
        .max_by(|a, b| a.avg_campaign_revenue.total_cmp(&b.avg_campaign_revenue))
        .map(|b| (*b).clone());
    let most_used = eligible
        .iter()
        .max_by(|a, b| {
            a.campaigns
                .cmp(&b.campaigns)
                .then(b.weekday.num_days_from_monday().cmp(&a.weekday.num_days_from_monday()))
        })
        .map(|b| (*b).clone());
    let eligible_count = eligible.len();

    let (best, most_used) = match (best, most_used) {
        (Some(best), Some(most_used))
            if sample >= cfg.min_total_campaigns && eligible_count >= 2 =>
        {
            (best, most_used)
        }
        _ => {
            return GuidanceResult::insufficient(
                ModuleKey::CampaignDayOfWeek,
                format!(
                    "Need campaigns on at least two weekdays, \
                     each with {} and a regular weekly presence.",
                    plural(cfg.min_campaigns_per_day as u32, "campaign")
                ),
                sample,
                GuidanceDetails::DayOfWeek(DayOfWeekDetails {
                    buckets,
                    best_day: None,
                    most_used_day: None,
                }),
            );
        }
    };

    let details = GuidanceDetails::DayOfWeek(DayOfWeekDetails {
        best_day: Some(best.weekday),
        most_used_day: Some(most_used.weekday),
        buckets,
    });

    if best.weekday == most_used.weekday {
        return GuidanceResult {
            module: ModuleKey::CampaignDayOfWeek,
            status: GuidanceStatus::NoChange,
            recommendation: RecommendationKind::KeepSendDay,
            cadence_label: Some(best.label.clone()),
            title: format!("{} remains your best send day", best.label),
            message: format!(
                "{} campaigns average {} each, the highest of any regular send day.",
                best.label,
                currency(best.avg_campaign_revenue)
            ),
            sample,
            baseline_key: Some(best.label.to_lowercase()),
            target_key: Some(best.label.to_lowercase()),
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details,
        };
    }

    // Moving up to one campaign a week off the busiest day.
    let moved_per_week = most_used.campaigns_per_week.min(1.0);
    let weekly_gain = (best.avg_campaign_revenue - most_used.avg_campaign_revenue) * moved_per_week;

    GuidanceResult {
        module: ModuleKey::CampaignDayOfWeek,
        status: GuidanceStatus::Actionable,
        recommendation: RecommendationKind::ShiftSendDay,
        cadence_label: Some(best.label.clone()),
        title: format!("Move a weekly campaign to {}", best.label),
        message: format!(
            "{} campaigns average {} each versus {} on {}, your busiest send day.",
            best.label,
            currency(best.avg_campaign_revenue),
            currency(most_used.avg_campaign_revenue),
            most_used.label
        ),
        sample,
        baseline_key: Some(most_used.label.to_lowercase()),
        target_key: Some(best.label.to_lowercase()),
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details,
    }
    .with_weekly_gain(weekly_gain, ctx.config.guidance.weeks_per_month)
}

/// Campaign send day as a [`SegmentAnalyzer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DayOfWeekAnalyzer;

impl SegmentAnalyzer for DayOfWeekAnalyzer {
    type Bucket = DayOfWeekBucket;

    fn module(&self) -> ModuleKey {
        ModuleKey::CampaignDayOfWeek
    }

    fn buckets(&self, ctx: &AnalysisContext<'_>) -> Vec<DayOfWeekBucket> {
        analyze_day_of_week(ctx)
    }

    fn guidance(&self, ctx: &AnalysisContext<'_>) -> GuidanceResult {
        day_of_week_guidance(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use sendlens_core::{AnalyticsConfig, Dataset, DateRange};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn campaign(week: i64, day_offset: i64, revenue: f64) -> SendRecord {
        let date = monday() + Duration::days(week * 7 + day_offset);
        let mut r = SendRecord::campaign(
            "c",
            Utc.from_utc_datetime(&date.and_hms_opt(23, 30, 0).unwrap()),
        );
        r.emails_sent = 5_000;
        r.revenue = revenue;
        r
    }

    fn range(weeks: i64) -> DateRange {
        DateRange::from_dates(monday(), monday() + Duration::days(weeks * 7 - 1))
    }

    #[test]
    fn test_sunday_sorts_last() {
        let data = Dataset::new(
            vec![campaign(0, 6, 10.0), campaign(0, 0, 10.0), campaign(1, 2, 10.0)],
            vec![],
            vec![],
        );
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(2), &config);
        let days: Vec<Weekday> = analyze_day_of_week(&ctx)
            .iter()
            .map(|b| b.weekday)
            .collect();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Sun]);
    }

    #[test]
    fn test_shift_toward_best_day() {
        let mut campaigns = Vec::new();
        for w in 0..8 {
            campaigns.push(campaign(w, 1, 300.0)); // Tuesday, busiest
            campaigns.push(campaign(w, 3, 300.0)); // Thursday
            if w % 2 == 0 {
                campaigns.push(campaign(w, 3, 300.0));
            }
            if w % 2 == 1 {
                campaigns.push(campaign(w, 1, 300.0));
            }
            campaigns.push(campaign(w, 5, 900.0)); // Saturday
        }
        // Tuesday: 12 campaigns, Thursday: 12, Saturday: 8. Tie broken toward Tuesday.
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(8), &config);
        let result = day_of_week_guidance(&ctx);
        assert_eq!(result.recommendation, RecommendationKind::ShiftSendDay);
        assert_eq!(result.target_key.as_deref(), Some("saturday"));
        assert_eq!(result.baseline_key.as_deref(), Some("tuesday"));
        assert!((result.estimated_weekly_gain.unwrap() - 600.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_day_is_insufficient() {
        let campaigns: Vec<SendRecord> = (0..8).map(|w| campaign(w, 2, 100.0)).collect();
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(8), &config);
        assert!(day_of_week_guidance(&ctx).is_insufficient());
    }
}
