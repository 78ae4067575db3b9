//! Campaign gaps: weeks without any campaign send, and an estimate of the
//! revenue those weeks would have produced.

use chrono::NaiveDate;
use sendlens_core::config::GapConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{aggregate_periods, Granularity, PeriodBucket};
use crate::context::AnalysisContext;
use crate::format::{currency, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::stats::{iqr_filter, median, percentile, safe_div, winsorize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapEstimateMethod {
    /// Median of trimmed neighbouring weeks (short runs).
    NeighbourMedian,
    /// Per-week median of a local window (long runs).
    LocalWindow,
    /// Median of every non-zero week in range.
    GlobalMedian,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRun {
    pub start_week: NaiveDate,
    pub end_week: NaiveDate,
    pub weeks: usize,
    pub estimated_lost_revenue: f64,
    pub method: GapEstimateMethod,
    pub reference_weeks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub weeks_in_range: usize,
    pub weeks_with_campaigns: usize,
    pub zero_campaign_send_weeks: usize,
    pub longest_zero_send_gap: usize,
    /// Weeks where campaigns went out but earned nothing.
    pub zero_revenue_weeks: usize,
    pub zero_send_week_starts: Vec<NaiveDate>,
    pub zero_revenue_week_starts: Vec<NaiveDate>,
    pub runs: Vec<GapRun>,
    pub estimated_lost_revenue: f64,
    pub reference_median: f64,
    pub reference_p75: f64,
    pub flow_revenue_during_gaps: f64,
    /// A gap long enough that missing export data is more likely than a pause.
    pub suspected_csv_coverage_gap: bool,
    pub all_weeks_sent: bool,
}

fn is_reference(week: &PeriodBucket) -> bool {
    week.is_complete && week.sums.send_count > 0 && week.sums.revenue > 0.0
}

/// Partial boundary weeks never count as gaps.
fn is_gap(week: &PeriodBucket) -> bool {
    week.is_complete && week.sums.send_count == 0
}

pub fn analyze_campaign_gaps(ctx: &AnalysisContext<'_>) -> GapAnalysis {
    let cfg = &ctx.config.gaps;
    let weeks = aggregate_periods(ctx.campaigns(), &ctx.range, Granularity::Weekly);
    let flow_weeks = aggregate_periods(ctx.flow_emails(), &ctx.range, Granularity::Weekly);

    let references: Vec<f64> = weeks
        .iter()
        .filter(|w| is_reference(w))
        .map(|w| w.sums.revenue)
        .collect();
    let reference_median = median(&references);
    let reference_p75 = percentile(&references, cfg.cap_percentile);

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut run_start: Option<usize> = None;
    for (idx, week) in weeks.iter().enumerate() {
        match (is_gap(week), run_start) {
            (true, None) => run_start = Some(idx),
            (false, Some(start)) => {
                runs.push((start, idx - start));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start, weeks.len() - start));
    }

    let gap_runs: Vec<GapRun> = if references.is_empty() {
        Vec::new()
    } else {
        runs.iter()
            .map(|&(start, len)| {
                estimate_run(&weeks, start, len, reference_median, reference_p75, cfg)
            })
            .collect()
    };

    let zero_send_week_starts: Vec<NaiveDate> = weeks
        .iter()
        .filter(|w| is_gap(w))
        .map(|w| w.period_start)
        .collect();
    let weeks_with_campaigns = weeks.iter().filter(|w| w.sums.send_count > 0).count();
    let zero_revenue_week_starts: Vec<NaiveDate> = weeks
        .iter()
        .filter(|w| w.sums.send_count > 0 && w.sums.revenue <= 0.0)
        .map(|w| w.period_start)
        .collect();
    let flow_revenue_during_gaps = flow_weeks
        .iter()
        .filter(|fw| zero_send_week_starts.contains(&fw.period_start))
        .fold(0.0, |acc, fw| acc + fw.sums.revenue);

    let longest = runs.iter().map(|&(_, len)| len).max().unwrap_or(0);
    let estimated_lost_revenue = gap_runs
        .iter()
        .fold(0.0, |acc, r| acc + r.estimated_lost_revenue);

    debug!(
        weeks = weeks.len(),
        zero_weeks = zero_send_week_starts.len(),
        longest,
        lost = estimated_lost_revenue,
        "Campaign gaps analyzed"
    );

    GapAnalysis {
        weeks_in_range: weeks.len(),
        weeks_with_campaigns,
        zero_campaign_send_weeks: zero_send_week_starts.len(),
        longest_zero_send_gap: longest,
        zero_revenue_weeks: zero_revenue_week_starts.len(),
        all_weeks_sent: zero_send_week_starts.is_empty(),
        zero_send_week_starts,
        zero_revenue_week_starts,
        runs: gap_runs,
        estimated_lost_revenue,
        reference_median,
        reference_p75,
        flow_revenue_during_gaps,
        suspected_csv_coverage_gap: longest >= cfg.coverage_gap_weeks,
    }
}

fn estimate_run(
    weeks: &[PeriodBucket],
    start: usize,
    len: usize,
    global_median: f64,
    cap: f64,
    cfg: &GapConfig,
) -> GapRun {
    let (lost, method, reference_weeks) = if len <= cfg.short_run_max_weeks {
        let refs = neighbour_references(weeks, start, len, cfg.neighbour_weeks);
        if refs.is_empty() {
            (
                global_median.min(cap) * len as f64,
                GapEstimateMethod::GlobalMedian,
                0,
            )
        } else {
            let trimmed = if refs.len() >= cfg.iqr_min_refs {
                iqr_filter(&refs, cfg.iqr_multiplier)
            } else {
                winsorize(&refs, cfg.winsor_low_percentile, cfg.winsor_high_percentile)
            };
            let per_week = median(&trimmed).min(cap);
            (per_week * len as f64, GapEstimateMethod::NeighbourMedian, refs.len())
        }
    } else {
        let mut total = 0.0;
        let mut local_hits = 0;
        for offset in 0..len {
            let idx = start + offset;
            let lo = idx.saturating_sub(cfg.local_window_weeks);
            let hi = (idx + cfg.local_window_weeks).min(weeks.len() - 1);
            let local: Vec<f64> = weeks[lo..=hi]
                .iter()
                .filter(|w| is_reference(w))
                .map(|w| w.sums.revenue)
                .collect();
            let base = if local.len() >= cfg.min_local_refs {
                local_hits += 1;
                median(&local)
            } else {
                global_median
            };
            let mut estimate = base.min(cap);
            if offset >= cfg.decay_after_weeks {
                let exponent = (offset - cfg.decay_after_weeks + 1) as i32;
                estimate *= cfg.decay_rate.powi(exponent);
            }
            total += estimate;
        }
        let method = if local_hits * 2 >= len {
            GapEstimateMethod::LocalWindow
        } else {
            GapEstimateMethod::GlobalMedian
        };
        (total, method, local_hits)
    };

    GapRun {
        start_week: weeks[start].period_start,
        end_week: weeks[start + len - 1].period_start,
        weeks: len,
        estimated_lost_revenue: lost,
        method,
        reference_weeks,
    }
}

/// Up to `per_side` reference weeks on each side of the run, nearest first.
fn neighbour_references(
    weeks: &[PeriodBucket],
    start: usize,
    len: usize,
    per_side: usize,
) -> Vec<f64> {
    let before = weeks[..start]
        .iter()
        .rev()
        .filter(|w| is_reference(w))
        .take(per_side)
        .map(|w| w.sums.revenue);
    let after = weeks[start + len..]
        .iter()
        .filter(|w| is_reference(w))
        .take(per_side)
        .map(|w| w.sums.revenue);
    before.chain(after).collect()
}

pub fn gap_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let analysis = analyze_campaign_gaps(ctx);
    let sample = analysis.weeks_in_range;

    if analysis.weeks_with_campaigns == 0 || analysis.reference_median <= 0.0 {
        return GuidanceResult::insufficient(
            ModuleKey::CampaignGaps,
            "No complete weeks with campaign revenue to compare gaps against.",
            sample,
            GuidanceDetails::Gaps(analysis),
        );
    }

    if analysis.all_weeks_sent {
        return GuidanceResult {
            module: ModuleKey::CampaignGaps,
            status: GuidanceStatus::NoChange,
            recommendation: RecommendationKind::KeepConsistency,
            cadence_label: None,
            title: "Campaigns went out every week".to_string(),
            message: format!(
                "All {} in this range had at least one campaign.",
                plural(sample as u32, "week")
            ),
            sample,
            baseline_key: None,
            target_key: None,
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details: GuidanceDetails::Gaps(analysis),
        };
    }

    let mut message = format!(
        "{} without a campaign (longest run {}). Based on nearby weeks, those gaps cost about {}.",
        plural(analysis.zero_campaign_send_weeks as u32, "week"),
        plural(analysis.longest_zero_send_gap as u32, "week"),
        currency(analysis.estimated_lost_revenue)
    );
    if analysis.suspected_csv_coverage_gap {
        message.push_str(
            " A gap this long may mean the export is missing data rather than a real pause; \
             check the campaign CSV covers the full range.",
        );
    }

    let weekly_gain = safe_div(analysis.estimated_lost_revenue, sample as f64);
    GuidanceResult {
        module: ModuleKey::CampaignGaps,
        status: GuidanceStatus::Actionable,
        recommendation: RecommendationKind::FillGaps,
        cadence_label: None,
        title: "Avoid weeks without campaigns".to_string(),
        message,
        sample,
        baseline_key: None,
        target_key: None,
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details: GuidanceDetails::Gaps(analysis),
    }
    .with_weekly_gain(weekly_gain, ctx.config.guidance.weeks_per_month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use sendlens_core::{AnalyticsConfig, Dataset, DateRange, SendRecord};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn campaign(week: usize, revenue: f64) -> SendRecord {
        let date = monday() + Duration::days(week as i64 * 7 + 2);
        let mut r = SendRecord::campaign(
            "c",
            Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap()),
        );
        r.emails_sent = 10_000;
        r.revenue = revenue;
        r
    }

    fn range(weeks: usize) -> DateRange {
        DateRange::from_dates(monday(), monday() + Duration::days(weeks as i64 * 7 - 1))
    }

    fn analyze(campaigns: Vec<SendRecord>, weeks: usize) -> GapAnalysis {
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(weeks), &config);
        analyze_campaign_gaps(&ctx)
    }

    #[test]
    fn test_three_week_gap_in_ten_weeks() {
        // Weeks 5-7 (1-based) are empty.
        let campaigns: Vec<SendRecord> = (0..10)
            .filter(|w| !(4..=6).contains(w))
            .map(|w| campaign(w, 1_000.0 + w as f64 * 10.0))
            .collect();
        let analysis = analyze(campaigns, 10);
        assert_eq!(analysis.zero_campaign_send_weeks, 3);
        assert_eq!(analysis.longest_zero_send_gap, 3);
        assert_eq!(analysis.runs.len(), 1);
        assert_eq!(analysis.runs[0].method, GapEstimateMethod::NeighbourMedian);
        assert_eq!(analysis.runs[0].reference_weeks, 7);
        // Refs 1000..1090 minus the gap: median 1030, below the P75 of 1075.
        assert!((analysis.estimated_lost_revenue - 3_090.0).abs() < 1e-6);
        // Capped at the P75 week, so never more than 3x it.
        assert!(
            analysis.estimated_lost_revenue <= analysis.reference_p75 * 3.0 + 1e-9
        );
        assert_eq!(
            analysis.zero_send_week_starts[0],
            monday() + Duration::days(28)
        );
    }

    #[test]
    fn test_spike_neighbour_is_capped() {
        let mut campaigns: Vec<SendRecord> = vec![campaign(0, 100.0), campaign(2, 100.0)];
        campaigns.push(campaign(3, 100.0));
        campaigns.push(campaign(4, 10_000.0));
        let analysis = analyze(campaigns, 5);
        // Week 2 is the gap; refs are 100 before and 100, 100, 10000 after: winsorized.
        assert_eq!(analysis.zero_campaign_send_weeks, 1);
        let run = &analysis.runs[0];
        assert!(run.estimated_lost_revenue <= analysis.reference_p75);
        assert!(run.estimated_lost_revenue >= 100.0);
    }

    #[test]
    fn test_long_gap_decays_and_flags_coverage() {
        let mut campaigns: Vec<SendRecord> = (0..10).map(|w| campaign(w, 500.0)).collect();
        campaigns.extend((30..40).map(|w| campaign(w, 500.0)));
        let analysis = analyze(campaigns, 40);
        assert_eq!(analysis.longest_zero_send_gap, 20);
        assert!(analysis.suspected_csv_coverage_gap);
        let run = &analysis.runs[0];
        assert_eq!(run.weeks, 20);
        // Undecayed would be 20 * 500.
        assert!(run.estimated_lost_revenue < 10_000.0);
        assert!(run.estimated_lost_revenue > 0.0);
    }

    #[test]
    fn test_zero_revenue_weeks_are_not_gaps() {
        let campaigns: Vec<SendRecord> = (0..6)
            .map(|w| campaign(w, if w == 2 { 0.0 } else { 300.0 }))
            .collect();
        let analysis = analyze(campaigns, 6);
        assert_eq!(analysis.zero_campaign_send_weeks, 0);
        assert_eq!(analysis.zero_revenue_weeks, 1);
        assert!(analysis.all_weeks_sent);
        assert_eq!(analysis.estimated_lost_revenue, 0.0);
    }

    #[test]
    fn test_no_campaigns_is_insufficient() {
        let data = Dataset::new(vec![], vec![], vec![]);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(4), &config);
        assert!(gap_guidance(&ctx).is_insufficient());
    }

    #[test]
    fn test_partial_boundary_week_is_not_a_gap() {
        // Range opens on a Thursday, after week 0's Wednesday send.
        let campaigns: Vec<SendRecord> = (0..6).map(|w| campaign(w, 400.0)).collect();
        let data = Dataset::new(campaigns, vec![], vec![]);
        let config = AnalyticsConfig::default();
        let range = DateRange::from_dates(
            monday() + Duration::days(3),
            monday() + Duration::days(6 * 7 - 1),
        );
        let ctx = AnalysisContext::new(&data, range, &config);
        let analysis = analyze_campaign_gaps(&ctx);

        assert_eq!(analysis.weeks_in_range, 6);
        assert_eq!(analysis.weeks_with_campaigns, 5);
        assert_eq!(analysis.zero_campaign_send_weeks, 0);
        assert!(analysis.runs.is_empty());
        assert_eq!(analysis.estimated_lost_revenue, 0.0);
        assert!(analysis.all_weeks_sent);
        assert_eq!(
            gap_guidance(&ctx).recommendation,
            RecommendationKind::KeepConsistency
        );
    }
}
