//! End-to-end properties of the analyzers over synthetic datasets.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sendlens_analytics::action_notes::{build_action_notes, estimate_impact, ModuleActionNote};
use sendlens_analytics::audience_size::analyze_audience_size;
use sendlens_analytics::bucketing::{aggregate_periods, Granularity, MetricSums};
use sendlens_analytics::day_of_week::analyze_day_of_week;
use sendlens_analytics::frequency::analyze_send_frequency;
use sendlens_analytics::gaps::gap_guidance;
use sendlens_analytics::guidance::{GuidanceDetails, ImpactType, RecommendationKind};
use sendlens_analytics::opportunities::summarize_notes;
use sendlens_analytics::send_volume::{send_volume_guidance, VolumeDecision};
use sendlens_analytics::{
    build_export, risk_zone, AnalysisContext, GuidanceStatus, ModuleKey, RiskZone,
};
use sendlens_core::{AnalyticsConfig, Dataset, DateRange, SendRecord};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn campaign(week: i64, weekday: i64, emails: u64, revenue: f64) -> SendRecord {
    let date = monday() + Duration::days(week * 7 + weekday);
    let mut r = SendRecord::campaign(
        format!("w{week}d{weekday}"),
        Utc.from_utc_datetime(&date.and_hms_opt(15, 0, 0).unwrap()),
    );
    r.emails_sent = emails;
    r.revenue = revenue;
    r.unique_opens = emails / 4;
    r.unique_clicks = emails / 50;
    r.total_orders = emails / 1000;
    r.bounces_count = emails / 200;
    r
}

fn weeks(n: i64) -> DateRange {
    DateRange::from_dates(monday(), monday() + Duration::days(n * 7 - 1))
}

#[test]
fn test_complete_weekly_buckets_cover_whole_weeks_once() {
    // Wednesday to Tuesday: partial first and last week.
    let start = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
    let range = DateRange::from_dates(start, end);
    let records: Vec<SendRecord> = (0..9).map(|w| campaign(w, 2, 1_000, 10.0)).collect();
    let buckets = aggregate_periods(&records, &range, Granularity::Weekly);

    let starts: HashSet<NaiveDate> = buckets.iter().map(|b| b.period_start).collect();
    assert_eq!(starts.len(), buckets.len());

    let complete: Vec<NaiveDate> = buckets
        .iter()
        .filter(|b| b.is_complete)
        .map(|b| b.period_start)
        .collect();
    let expected: Vec<NaiveDate> = (1..8).map(|w| monday() + Duration::days(w * 7)).collect();
    assert_eq!(complete, expected);
    assert!(buckets
        .iter()
        .filter(|b| b.is_complete)
        .all(|b| b.period_start >= start && b.period_end <= end));
}

#[test]
fn test_zero_email_rates_are_zero() {
    let rates = MetricSums::default().rates();
    assert_eq!(rates.open_rate, 0.0);
    assert_eq!(rates.spam_rate, 0.0);
    assert_eq!(rates.revenue_per_email, 0.0);
    assert!(!rates.bounce_rate.is_nan());
}

#[test]
fn test_risk_zone_classification() {
    let limits = AnalyticsConfig::default().deliverability;
    assert_eq!(risk_zone(0.05, 1.0, &limits), RiskZone::Green);
    assert_eq!(risk_zone(0.15, 1.0, &limits), RiskZone::Yellow);
    assert_eq!(risk_zone(0.25, 1.0, &limits), RiskZone::Red);
    assert_eq!(risk_zone(0.05, 3.5, &limits), RiskZone::Red);
}

#[test]
fn test_only_observed_buckets_are_returned() {
    let records: Vec<SendRecord> = (0..10)
        .flat_map(|w| {
            [
                campaign(w, 1, 20_000, 400.0),
                campaign(w, 4, 20_000, 500.0),
            ]
        })
        .collect();
    let data = Dataset::new(records, vec![], vec![]);
    let config = AnalyticsConfig::default();
    let ctx = AnalysisContext::new(&data, weeks(10), &config);

    let frequency = analyze_send_frequency(&ctx);
    let per_week: Vec<u32> = frequency
        .buckets
        .iter()
        .map(|b| b.campaigns_per_week)
        .collect();
    assert_eq!(per_week, vec![2]);

    let days = analyze_day_of_week(&ctx);
    assert_eq!(days.len(), 2);
    assert!(days.iter().all(|d| d.campaigns == 10));

    let audience = analyze_audience_size(&ctx);
    assert!(audience.buckets.iter().all(|b| b.campaigns > 0));
}

#[test]
fn test_gap_weeks_five_to_seven() {
    let records: Vec<SendRecord> = (0..10)
        .filter(|w| !(4..=6).contains(w))
        .map(|w| campaign(w, 1, 10_000, 800.0 + w as f64 * 25.0))
        .collect();
    let data = Dataset::new(records, vec![], vec![]);
    let config = AnalyticsConfig::default();
    let ctx = AnalysisContext::new(&data, weeks(10), &config);

    let result = gap_guidance(&ctx);
    assert_eq!(result.recommendation, RecommendationKind::FillGaps);
    let GuidanceDetails::Gaps(gaps) = &result.details else {
        panic!("expected gap details");
    };
    assert_eq!(gaps.zero_campaign_send_weeks, 3);
    assert_eq!(gaps.longest_zero_send_gap, 3);
    // Reference weeks 0-3 and 7-9 earn 800, 825, 850, 875, 975, 1000, 1025.
    // Nothing falls outside 3x IQR; the median 875 sits under the P75 of 987.5.
    assert_eq!(gaps.runs.len(), 1);
    assert_eq!(gaps.runs[0].reference_weeks, 7);
    assert!((gaps.reference_p75 - 987.5).abs() < 1e-9);
    assert!((gaps.estimated_lost_revenue - 875.0 * 3.0).abs() < 1e-6);
    assert!(!gaps.suspected_csv_coverage_gap);
}

fn volume_series(spam_per_mille: impl Fn(i64) -> f64) -> Vec<SendRecord> {
    (0..12)
        .map(|w| {
            let emails = 20_000 + w as u64 * 2_000;
            let mut r = campaign(w, 2, emails, emails as f64 * 0.08);
            r.spam_complaints_count = (emails as f64 * spam_per_mille(w) / 1000.0).round() as u64;
            r
        })
        .collect()
}

fn volume_decision(records: Vec<SendRecord>) -> VolumeDecision {
    let data = Dataset::new(records, vec![], vec![]);
    let config = AnalyticsConfig::default();
    let ctx = AnalysisContext::new(&data, weeks(12), &config);
    match send_volume_guidance(&ctx).details {
        GuidanceDetails::SendVolume(details) => details.decision,
        other => panic!("unexpected details {other:?}"),
    }
}

#[test]
fn test_send_volume_follows_revenue_when_risk_is_flat() {
    assert_eq!(
        volume_decision(volume_series(|_| 0.4)),
        VolumeDecision::SendMore
    );
}

#[test]
fn test_send_volume_kill_switch_dominates_revenue() {
    assert_eq!(
        volume_decision(volume_series(|w| 1.5 + w as f64 * 0.3)),
        VolumeDecision::SendLess
    );
}

#[test]
fn test_small_estimate_is_suppressed_from_breakdown() {
    let config = AnalyticsConfig::default();
    let note = ModuleActionNote {
        module: ModuleKey::CampaignDayOfWeek,
        status: GuidanceStatus::Actionable,
        recommendation: RecommendationKind::ShiftSendDay,
        title: "Move a weekly campaign to Saturday".to_string(),
        message: String::new(),
        sample: 40,
        // $25 a week theoretical is $50 a month once scaled.
        estimated_impact: estimate_impact(Some(25.0), ImpactType::Lift, &config.guidance),
    };
    assert!(note.estimated_impact.is_none());
    let summary = summarize_notes(&[note], 100_000.0);
    assert!(summary.breakdown.is_empty());
    assert_eq!(summary.total_annual, 0.0);
}

#[test]
fn test_empty_dataset_reports_insufficient_everywhere() {
    let data = Dataset::new(vec![], vec![], vec![]);
    let config = AnalyticsConfig::default();
    let ctx = AnalysisContext::new(&data, weeks(8), &config);
    let notes = build_action_notes(&ctx);
    assert_eq!(notes.len(), ModuleKey::ALL.len());
    assert!(notes
        .iter()
        .all(|n| n.status == GuidanceStatus::Insufficient));
    assert!(notes.iter().all(|n| n.estimated_impact.is_none()));
}

#[test]
fn test_export_is_idempotent() {
    let records: Vec<SendRecord> = (0..16)
        .map(|w| {
            let emails = 15_000 + (w as u64 % 4) * 5_000;
            campaign(w, w % 5, emails, 300.0 + w as f64 * 40.0)
        })
        .collect();
    let data = Dataset::new(records, vec![], vec![]);
    let config = AnalyticsConfig::default();
    let ctx = AnalysisContext::new(&data, weeks(16), &config);

    let first = build_export(&ctx);
    let second = build_export(&ctx);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
