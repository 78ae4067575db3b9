//! Audience size: quartile bands of emails sent per campaign and their
//! revenue per campaign.

use sendlens_core::SendRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{MetricRates, MetricSums};
use crate::context::AnalysisContext;
use crate::format::{compact, currency, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::segment::SegmentAnalyzer;
use crate::stats::{percentile, safe_div};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceSizeBucket {
    /// 1 (smallest sends) to 4 (largest).
    pub quartile: u8,
    pub label: String,
    pub min_emails: u64,
    pub max_emails: u64,
    pub campaigns: usize,
    pub sums: MetricSums,
    pub rates: MetricRates,
    pub avg_campaign_revenue: f64,
    pub avg_emails_per_campaign: f64,
    /// Enough campaigns and emails to be compared.
    pub qualified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceSizeAnalysis {
    pub buckets: Vec<AudienceSizeBucket>,
    pub campaigns_analyzed: usize,
    /// Minimum emails per campaign applied to drop test sends.
    pub small_send_floor: Option<f64>,
    pub small_sends_excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceSizeDetails {
    pub analysis: AudienceSizeAnalysis,
    pub baseline_quartile: Option<u8>,
    pub target_quartile: Option<u8>,
    pub safe_alternative_quartile: Option<u8>,
}

pub fn analyze_audience_size(ctx: &AnalysisContext<'_>) -> AudienceSizeAnalysis {
    let cfg = &ctx.config.audience_size;
    let sends: Vec<&SendRecord> = ctx
        .campaigns()
        .into_iter()
        .filter(|c| c.emails_sent > 0)
        .collect();

    let small_send_floor = (sends.len() >= cfg.floor_min_campaigns).then(|| {
        let emails: Vec<f64> = sends.iter().map(|c| c.emails_sent as f64).collect();
        percentile(&emails, cfg.floor_percentile).clamp(cfg.floor_min, cfg.floor_max)
    });
    let before = sends.len();
    let sends: Vec<&SendRecord> = match small_send_floor {
        Some(floor) => sends
            .into_iter()
            .filter(|c| c.emails_sent as f64 >= floor)
            .collect(),
        None => sends,
    };
    let small_sends_excluded = before - sends.len();

    let emails: Vec<f64> = sends.iter().map(|c| c.emails_sent as f64).collect();
    let q1 = percentile(&emails, 25.0);
    let q2 = percentile(&emails, 50.0);
    let q3 = percentile(&emails, 75.0);

    let mut groups: [Vec<&SendRecord>; 4] = Default::default();
    for send in sends.iter().copied() {
        let e = send.emails_sent as f64;
        let idx = if e < q1 {
            0
        } else if e < q2 {
            1
        } else if e < q3 {
            2
        } else {
            3
        };
        groups[idx].push(send);
    }

    let buckets: Vec<AudienceSizeBucket> = groups
        .iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(idx, members)| {
            let sums = MetricSums::from_records(members.iter().copied());
            let min_emails = members.iter().map(|c| c.emails_sent).min().unwrap_or(0);
            let max_emails = members.iter().map(|c| c.emails_sent).max().unwrap_or(0);
            AudienceSizeBucket {
                quartile: idx as u8 + 1,
                label: format!(
                    "{}-{} recipients",
                    compact(min_emails as f64),
                    compact(max_emails as f64)
                ),
                min_emails,
                max_emails,
                campaigns: members.len(),
                rates: sums.rates(),
                avg_campaign_revenue: safe_div(sums.revenue, members.len() as f64),
                avg_emails_per_campaign: safe_div(sums.emails_sent as f64, members.len() as f64),
                qualified: members.len() >= cfg.min_campaigns_per_bucket
                    && sums.emails_sent >= cfg.min_emails_per_bucket,
                sums,
            }
        })
        .collect();

    debug!(
        campaigns = sends.len(),
        excluded = small_sends_excluded,
        buckets = buckets.len(),
        "Audience size buckets computed"
    );

    AudienceSizeAnalysis {
        buckets,
        campaigns_analyzed: sends.len(),
        small_send_floor,
        small_sends_excluded,
    }
}

pub fn audience_size_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let limits = &ctx.config.deliverability;
    let cfg = &ctx.config.audience_size;
    let analysis = analyze_audience_size(ctx);
    let sample = analysis.campaigns_analyzed;

    let mut eligible: Vec<&AudienceSizeBucket> = analysis
        .buckets
        .iter()
        .filter(|b| {
            b.qualified
                && b.rates.spam_rate <= limits.spam_red_limit
                && b.rates.bounce_rate <= limits.bounce_red_limit
        })
        .collect();
    eligible.sort_by(|a, b| b.avg_campaign_revenue.total_cmp(&a.avg_campaign_revenue));

    let eligible_count = eligible.len();
    let best = eligible.first().map(|b| (*b).clone());
    let runner_up = eligible.get(1).map(|b| (*b).clone());
    let dominant = analysis
        .buckets
        .iter()
        .max_by(|a, b| a.campaigns.cmp(&b.campaigns).then(b.quartile.cmp(&a.quartile)))
        .cloned();

    let (best, dominant) = match (best, dominant) {
        (Some(best), Some(dominant)) if eligible_count >= 2 => (best, dominant),
        _ => {
            let message = format!(
                "Need at least two audience-size bands with {} and {} emails each.",
                plural(cfg.min_campaigns_per_bucket as u32, "campaign"),
                compact(cfg.min_emails_per_bucket as f64)
            );
            return GuidanceResult::insufficient(
                ModuleKey::AudienceSize,
                message,
                sample,
                GuidanceDetails::AudienceSize(AudienceSizeDetails {
                    analysis,
                    baseline_quartile: None,
                    target_quartile: None,
                    safe_alternative_quartile: None,
                }),
            );
        }
    };

    if best.quartile == dominant.quartile {
        let alt = runner_up.as_ref().map(|b| b.quartile);
        let message = match &runner_up {
            Some(second) => format!(
                "Most campaigns already go to {} and that band earns the most per campaign ({}). \
                 {} is the next-best option at {} per campaign.",
                best.label,
                currency(best.avg_campaign_revenue),
                second.label,
                currency(second.avg_campaign_revenue)
            ),
            None => format!(
                "Most campaigns already go to {}, the best-earning band.",
                best.label
            ),
        };
        return GuidanceResult {
            module: ModuleKey::AudienceSize,
            status: GuidanceStatus::NoChange,
            recommendation: RecommendationKind::KeepAudienceSize,
            cadence_label: Some(best.label.clone()),
            title: format!("Keep targeting {}", best.label),
            message,
            sample,
            baseline_key: Some(format!("q{}", dominant.quartile)),
            target_key: alt.map(|q| format!("q{q}")),
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details: GuidanceDetails::AudienceSize(AudienceSizeDetails {
                analysis,
                baseline_quartile: Some(dominant.quartile),
                target_quartile: Some(best.quartile),
                safe_alternative_quartile: alt,
            }),
        };
    }

    let delta_per_campaign = best.avg_campaign_revenue - dominant.avg_campaign_revenue;
    let dominant_per_week = safe_div(dominant.campaigns as f64, ctx.weeks_in_range());
    let weekly_gain = delta_per_campaign * dominant_per_week;

    GuidanceResult {
        module: ModuleKey::AudienceSize,
        status: GuidanceStatus::Actionable,
        recommendation: RecommendationKind::TargetAudienceSize,
        cadence_label: Some(best.label.clone()),
        title: format!("Send more campaigns to {}", best.label),
        message: format!(
            "Campaigns sent to {} averaged {} each, versus {} for your most common size ({}).",
            best.label,
            currency(best.avg_campaign_revenue),
            currency(dominant.avg_campaign_revenue),
            dominant.label
        ),
        sample,
        baseline_key: Some(format!("q{}", dominant.quartile)),
        target_key: Some(format!("q{}", best.quartile)),
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details: GuidanceDetails::AudienceSize(AudienceSizeDetails {
            baseline_quartile: Some(dominant.quartile),
            target_quartile: Some(best.quartile),
            safe_alternative_quartile: runner_up.map(|b| b.quartile),
            analysis,
        }),
    }
    .with_weekly_gain(weekly_gain, ctx.config.guidance.weeks_per_month)
}

/// Audience size as a [`SegmentAnalyzer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AudienceSizeAnalyzer;

impl SegmentAnalyzer for AudienceSizeAnalyzer {
    type Bucket = AudienceSizeBucket;

    fn module(&self) -> ModuleKey {
        ModuleKey::AudienceSize
    }

    fn buckets(&self, ctx: &AnalysisContext<'_>) -> Vec<AudienceSizeBucket> {
        analyze_audience_size(ctx).buckets
    }

    fn guidance(&self, ctx: &AnalysisContext<'_>) -> GuidanceResult {
        audience_size_guidance(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use sendlens_core::{AnalyticsConfig, Dataset, DateRange};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn campaign(day: i64, emails: u64, revenue: f64) -> SendRecord {
        let date = start() + Duration::days(day);
        let mut r = SendRecord::campaign(
            "c",
            Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap()),
        );
        r.emails_sent = emails;
        r.revenue = revenue;
        r
    }

    fn range() -> DateRange {
        DateRange::from_dates(start(), start() + Duration::days(83))
    }

    #[test]
    fn test_small_test_sends_are_floored() {
        let mut campaigns: Vec<SendRecord> =
            (0..16).map(|i| campaign(i * 5, 20_000, 500.0)).collect();
        campaigns.push(campaign(1, 50, 0.0));
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(), &config);
        let analysis = analyze_audience_size(&ctx);
        assert_eq!(analysis.small_send_floor, Some(1000.0));
        assert_eq!(analysis.small_sends_excluded, 1);
        assert_eq!(analysis.campaigns_analyzed, 16);
    }

    #[test]
    fn test_identical_sizes_collapse_into_one_bucket() {
        let campaigns: Vec<SendRecord> =
            (0..8).map(|i| campaign(i * 7, 20_000, 500.0)).collect();
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(), &config);
        let analysis = analyze_audience_size(&ctx);
        assert_eq!(analysis.buckets.len(), 1);
        assert_eq!(analysis.buckets[0].campaigns, 8);
        assert_eq!(analysis.buckets[0].label, "20.0k-20.0k recipients");
        assert!(audience_size_guidance(&ctx).is_insufficient());
    }

    #[test]
    fn test_recommends_better_earning_band() {
        // Most campaigns are small; the few large ones earn much more each.
        let mut campaigns = Vec::new();
        for i in 0..12 {
            campaigns.push(campaign(i * 3, 5_000 + i as u64 * 10, 100.0));
        }
        for i in 0..4 {
            campaigns.push(campaign(i * 7 + 1, 50_000 + i as u64 * 100, 2_000.0));
        }
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(), &config);
        let result = audience_size_guidance(&ctx);
        assert_eq!(
            result.recommendation,
            RecommendationKind::TargetAudienceSize
        );
        assert_eq!(result.target_key.as_deref(), Some("q4"));
        assert!(result.estimated_weekly_gain.unwrap() > 0.0);
    }
}
