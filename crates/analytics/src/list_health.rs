//! List health: how much of the subscriber list is still engaged, and what
//! the inactive part costs to keep.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::AnalysisContext;
use crate::format::{currency, percent, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::stats::safe_div;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListHealthAnalysis {
    /// Profiles created on or before the end of the range.
    pub subscribers: usize,
    pub engaged: usize,
    pub inactive: usize,
    pub never_engaged: usize,
    pub consented: usize,
    pub engaged_percent: f64,
    pub inactive_percent: f64,
    pub consent_percent: f64,
    pub monthly_inactive_cost: f64,
}

pub fn analyze_list_health(ctx: &AnalysisContext<'_>) -> ListHealthAnalysis {
    let cfg = &ctx.config.list_health;
    let end = ctx.range.end;
    let engaged_since = end - Duration::days(cfg.engaged_days);
    let inactive_before = end - Duration::days(cfg.inactive_days);

    let mut analysis = ListHealthAnalysis {
        subscribers: 0,
        engaged: 0,
        inactive: 0,
        never_engaged: 0,
        consented: 0,
        engaged_percent: 0.0,
        inactive_percent: 0.0,
        consent_percent: 0.0,
        monthly_inactive_cost: 0.0,
    };

    for sub in ctx.dataset.subscribers() {
        if sub.created_at.is_some_and(|c| c > end) {
            continue;
        }
        analysis.subscribers += 1;
        if sub.email_consent {
            analysis.consented += 1;
        }
        let last = sub.last_engaged().filter(|d| *d <= end);
        if last.is_none() {
            analysis.never_engaged += 1;
        }
        match last {
            Some(d) if d >= engaged_since => analysis.engaged += 1,
            // New profiles get the full inactivity window before they count.
            _ if sub.created_at.is_some_and(|c| c > inactive_before) => {}
            Some(d) if d < inactive_before => analysis.inactive += 1,
            None => analysis.inactive += 1,
            Some(_) => {}
        }
    }

    let total = analysis.subscribers as f64;
    analysis.engaged_percent = safe_div(analysis.engaged as f64, total) * 100.0;
    analysis.inactive_percent = safe_div(analysis.inactive as f64, total) * 100.0;
    analysis.consent_percent = safe_div(analysis.consented as f64, total) * 100.0;
    analysis.monthly_inactive_cost = analysis.inactive as f64 * cfg.cost_per_profile_monthly;

    debug!(
        subscribers = analysis.subscribers,
        engaged = analysis.engaged,
        inactive = analysis.inactive,
        "List health analyzed"
    );
    analysis
}

pub fn list_health_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let cfg = &ctx.config.list_health;
    let analysis = analyze_list_health(ctx);
    let sample = analysis.subscribers;

    if sample < cfg.min_subscribers {
        return GuidanceResult::insufficient(
            ModuleKey::ListHealth,
            format!(
                "Need at least {} to judge list health.",
                plural(cfg.min_subscribers as u32, "subscriber")
            ),
            sample,
            GuidanceDetails::ListHealth(analysis),
        );
    }

    if analysis.inactive == 0 {
        return GuidanceResult {
            module: ModuleKey::ListHealth,
            status: GuidanceStatus::NoChange,
            recommendation: RecommendationKind::KeepList,
            cadence_label: None,
            title: "Your list is clean".to_string(),
            message: format!(
                "{} of {} engaged in the last {} days.",
                percent(analysis.engaged_percent, 0),
                plural(sample as u32, "profile"),
                cfg.engaged_days
            ),
            sample,
            baseline_key: None,
            target_key: None,
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Savings,
            details: GuidanceDetails::ListHealth(analysis),
        };
    }

    let weeks_per_month = ctx.config.guidance.weeks_per_month;
    let weekly_savings = safe_div(analysis.monthly_inactive_cost, weeks_per_month);
    GuidanceResult {
        module: ModuleKey::ListHealth,
        status: GuidanceStatus::Actionable,
        recommendation: RecommendationKind::SuppressInactive,
        cadence_label: None,
        title: "Suppress inactive profiles".to_string(),
        message: format!(
            "{} ({}) have not opened or clicked in {} days. \
             Suppressing them saves about {} a month and protects inbox placement.",
            plural(analysis.inactive as u32, "profile"),
            percent(analysis.inactive_percent, 0),
            cfg.inactive_days,
            currency(analysis.monthly_inactive_cost)
        ),
        sample,
        baseline_key: None,
        target_key: None,
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Savings,
        details: GuidanceDetails::ListHealth(analysis),
    }
    .with_weekly_gain(weekly_savings, weeks_per_month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use sendlens_core::{AnalyticsConfig, Dataset, DateRange, Subscriber};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn subscriber(
        id: usize,
        created: DateTime<Utc>,
        last_open: Option<DateTime<Utc>>,
    ) -> Subscriber {
        Subscriber {
            id: id.to_string(),
            email: None,
            created_at: Some(created),
            last_open,
            last_click: None,
            email_consent: id % 2 == 0,
            lifetime_revenue: 0.0,
        }
    }

    fn range() -> DateRange {
        DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    fn run(subscribers: Vec<Subscriber>, config: &AnalyticsConfig) -> GuidanceResult {
        let data = Dataset::new(vec![], vec![], subscribers);
        let ctx = AnalysisContext::new(&data, range(), config);
        list_health_guidance(&ctx)
    }

    #[test]
    fn test_counts_engaged_and_inactive() {
        let mut subs = Vec::new();
        for i in 0..60 {
            subs.push(subscriber(i, at(2023, 1, 1), Some(at(2024, 6, 1))));
        }
        for i in 60..100 {
            subs.push(subscriber(i, at(2023, 1, 1), Some(at(2023, 6, 1))));
        }
        for i in 100..110 {
            subs.push(subscriber(i, at(2023, 1, 1), None));
        }
        // Too new to judge.
        for i in 110..120 {
            subs.push(subscriber(i, at(2024, 6, 20), None));
        }
        // Created after the range.
        subs.push(subscriber(999, at(2024, 8, 1), None));

        let data = Dataset::new(vec![], vec![], subs);
        let config = AnalyticsConfig::default();
        let ctx = AnalysisContext::new(&data, range(), &config);
        let analysis = analyze_list_health(&ctx);
        assert_eq!(analysis.subscribers, 120);
        assert_eq!(analysis.engaged, 60);
        assert_eq!(analysis.inactive, 50);
        assert_eq!(analysis.never_engaged, 20);
        assert!((analysis.engaged_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_inactive_segment_is_savings() {
        let subs: Vec<Subscriber> = (0..50_000)
            .map(|i| {
                let last_open = (i < 10_000).then(|| at(2024, 6, 1));
                subscriber(i, at(2022, 1, 1), last_open)
            })
            .collect();
        let config = AnalyticsConfig::default();
        let result = run(subs, &config);
        assert_eq!(result.recommendation, RecommendationKind::SuppressInactive);
        assert_eq!(result.impact_type, ImpactType::Savings);
        // 40,000 * $0.015 = $600 a month.
        assert!(
            (result.estimated_monthly_gain.unwrap() - 600.0).abs() < 1e-6
        );
    }

    #[test]
    fn test_small_list_is_insufficient() {
        let subs: Vec<Subscriber> = (0..20)
            .map(|i| subscriber(i, at(2023, 1, 1), None))
            .collect();
        let config = AnalyticsConfig::default();
        assert!(run(subs, &config).is_insufficient());
    }
}
