//! Send volume: does sending more campaign email pay off, and at what
//! deliverability cost?
//!
//! Two models are available behind [`SendVolumeModel`]. `Correlation` scores
//! Pearson correlations of volume against revenue and each risk rate.
//! `LogRegression` fits `revenue = a + b * ln(volume)` behind a red-zone kill
//! switch.

use chrono::NaiveDate;
use sendlens_core::config::{DeliverabilityConfig, SendVolumeConfig, SendVolumeModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{aggregate_periods, pct, Granularity, MetricSums, PeriodBucket};
use crate::context::AnalysisContext;
use crate::format::{compact, currency, percent, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::stats::{linear_regression, log_regression, mean, pearson, safe_div};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeDecision {
    SendMore,
    SendLess,
    KeepAsIs,
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub period_start: NaiveDate,
    pub emails: f64,
    pub revenue: f64,
    pub unsubscribe_rate: f64,
    pub spam_rate: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationScores {
    pub revenue_r: Option<f64>,
    pub unsubscribe_r: Option<f64>,
    pub spam_r: Option<f64>,
    pub bounce_r: Option<f64>,
    /// -2..=2
    pub revenue_score: i8,
    /// 0..=2
    pub risk_score: i8,
    pub max_severity_ratio: f64,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogFitSummary {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendVolumeDetails {
    pub model: SendVolumeModel,
    pub decision: VolumeDecision,
    pub granularity: Option<Granularity>,
    pub points: Vec<VolumePoint>,
    pub avg_emails: f64,
    pub avg_revenue: f64,
    pub avg_spam_rate: f64,
    pub avg_bounce_rate: f64,
    /// Average spam or bounce rate is past its red limit.
    pub deliverability_breached: bool,
    pub correlation: Option<CorrelationScores>,
    pub log_fit: Option<LogFitSummary>,
}

impl SendVolumeDetails {
    fn empty(model: SendVolumeModel) -> Self {
        Self {
            model,
            decision: VolumeDecision::Insufficient,
            granularity: None,
            points: Vec::new(),
            avg_emails: 0.0,
            avg_revenue: 0.0,
            avg_spam_rate: 0.0,
            avg_bounce_rate: 0.0,
            deliverability_breached: false,
            correlation: None,
            log_fit: None,
        }
    }
}

fn points_from(buckets: &[PeriodBucket]) -> Vec<VolumePoint> {
    buckets
        .iter()
        .filter(|b| b.is_complete && b.sums.emails_sent > 0)
        .map(|b| VolumePoint {
            period_start: b.period_start,
            emails: b.sums.emails_sent as f64,
            revenue: b.sums.revenue,
            unsubscribe_rate: b.rates.unsubscribe_rate,
            spam_rate: b.rates.spam_rate,
            bounce_rate: b.rates.bounce_rate,
        })
        .collect()
}

/// Weekly points when there are enough of them, else monthly.
pub fn volume_series(
    ctx: &AnalysisContext<'_>,
) -> Option<(Granularity, Vec<VolumePoint>, MetricSums)> {
    let cfg = &ctx.config.send_volume;
    let campaigns = ctx.campaigns();

    let weekly = points_from(&aggregate_periods(
        campaigns.iter().copied(),
        &ctx.range,
        Granularity::Weekly,
    ));
    let (granularity, points) = if weekly.len() >= cfg.min_weekly_points {
        (Granularity::Weekly, weekly)
    } else {
        let monthly = points_from(&aggregate_periods(
            campaigns.iter().copied(),
            &ctx.range,
            Granularity::Monthly,
        ));
        if monthly.len() < cfg.min_monthly_points {
            return None;
        }
        (Granularity::Monthly, monthly)
    };
    Some((granularity, points, MetricSums::from_records(campaigns)))
}

/// Map a correlation coefficient onto -2..=2.
pub fn correlation_score(r: Option<f64>, cfg: &SendVolumeConfig) -> i8 {
    match r {
        Some(r) if r >= cfg.strong_correlation => 2,
        Some(r) if r >= cfg.weak_correlation => 1,
        Some(r) if r <= -cfg.strong_correlation => -2,
        Some(r) if r <= -cfg.weak_correlation => -1,
        _ => 0,
    }
}

/// Pearson scores for a point series.
pub fn score_correlations(
    points: &[VolumePoint],
    cfg: &SendVolumeConfig,
    limits: &DeliverabilityConfig,
) -> CorrelationScores {
    let emails: Vec<f64> = points.iter().map(|p| p.emails).collect();
    let column = |f: fn(&VolumePoint) -> f64| -> Vec<f64> {
        points.iter().map(f).collect()
    };

    let revenue_r = pearson(&emails, &column(|p| p.revenue));
    let unsubscribe_r = pearson(&emails, &column(|p| p.unsubscribe_rate));
    let spam_r = pearson(&emails, &column(|p| p.spam_rate));
    let bounce_r = pearson(&emails, &column(|p| p.bounce_rate));
    let revenue_score = correlation_score(revenue_r, cfg);

    let max_of = |f: fn(&VolumePoint) -> f64| {
        points.iter().map(f).fold(0.0_f64, f64::max)
    };
    let max_severity_ratio = [
        safe_div(max_of(|p| p.unsubscribe_rate), limits.unsubscribe_limit),
        safe_div(max_of(|p| p.spam_rate), limits.spam_red_limit),
        safe_div(max_of(|p| p.bounce_rate), limits.bounce_red_limit),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max);

    let tolerance = 1.0 + cfg.revenue_tolerance_step * f64::from(revenue_score.max(0));
    let risk_score = if max_severity_ratio >= 1.5 * tolerance {
        2
    } else if max_severity_ratio >= tolerance {
        1
    } else {
        0
    };

    CorrelationScores {
        revenue_r,
        unsubscribe_r,
        spam_r,
        bounce_r,
        revenue_score,
        risk_score,
        max_severity_ratio,
        tolerance,
    }
}

pub fn correlation_decision(scores: &CorrelationScores, breached: bool) -> VolumeDecision {
    if breached || scores.risk_score >= 2 || scores.revenue_score <= -1 {
        VolumeDecision::SendLess
    } else if (scores.revenue_score >= 2 && scores.risk_score <= 1)
        || (scores.revenue_score >= 1 && scores.risk_score == 0)
    {
        VolumeDecision::SendMore
    } else {
        VolumeDecision::KeepAsIs
    }
}

pub fn send_volume_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let cfg = &ctx.config.send_volume;
    let limits = &ctx.config.deliverability;

    let Some((granularity, points, totals)) = volume_series(ctx) else {
        return GuidanceResult::insufficient(
            ModuleKey::SendVolume,
            format!(
                "Need at least {} or {} with campaign sends.",
                plural(cfg.min_weekly_points as u32, "complete week"),
                plural(cfg.min_monthly_points as u32, "complete month")
            ),
            0,
            GuidanceDetails::SendVolume(SendVolumeDetails::empty(cfg.model)),
        );
    };

    let emails: Vec<f64> = points.iter().map(|p| p.emails).collect();
    let revenues: Vec<f64> = points.iter().map(|p| p.revenue).collect();
    let avg_spam_rate = pct(totals.spam_complaints as f64, totals.emails_sent as f64);
    let avg_bounce_rate = pct(totals.bounces as f64, totals.emails_sent as f64);
    let mut details = SendVolumeDetails {
        model: cfg.model,
        decision: VolumeDecision::Insufficient,
        granularity: Some(granularity),
        avg_emails: mean(&emails),
        avg_revenue: mean(&revenues),
        avg_spam_rate,
        avg_bounce_rate,
        deliverability_breached: avg_spam_rate > limits.spam_red_limit
            || avg_bounce_rate > limits.bounce_red_limit,
        points,
        correlation: None,
        log_fit: None,
    };
    let sample = details.points.len();
    // Monthly gains are brought back to a weekly figure.
    let periods_per_week = match granularity {
        Granularity::Weekly => 1.0,
        Granularity::Monthly => safe_div(1.0, ctx.config.guidance.weeks_per_month),
    };

    let (decision, period_gain) = match cfg.model {
        SendVolumeModel::Correlation => {
            let scores = score_correlations(&details.points, cfg, limits);
            let decision = correlation_decision(&scores, details.deliverability_breached);
            details.correlation = Some(scores);
            let gain = if decision == VolumeDecision::SendMore {
                linear_regression(&emails, &revenues)
                    .map(|fit| fit.slope * details.avg_emails * cfg.volume_step)
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            (decision, gain)
        }
        SendVolumeModel::LogRegression => {
            let fit = log_regression(&emails, &revenues);
            details.log_fit = fit.map(|f| LogFitSummary {
                intercept: f.intercept,
                slope: f.slope,
                r_squared: f.r_squared,
                trusted: f.r_squared > cfg.min_r_squared,
            });
            if details.deliverability_breached {
                (VolumeDecision::SendLess, 0.0)
            } else {
                match details.log_fit {
                    Some(fit) if fit.trusted && fit.slope > cfg.slope_threshold => {
                        (VolumeDecision::SendMore, fit.slope * (1.0 + cfg.volume_step).ln())
                    }
                    Some(fit) if fit.trusted && fit.slope < -cfg.slope_threshold => {
                        (VolumeDecision::SendLess, 0.0)
                    }
                    Some(fit) if fit.trusted => (VolumeDecision::KeepAsIs, 0.0),
                    _ => (VolumeDecision::Insufficient, 0.0),
                }
            }
        }
    };
    details.decision = decision;

    debug!(
        model = ?cfg.model,
        points = sample,
        decision = ?decision,
        breached = details.deliverability_breached,
        "Send volume guidance computed"
    );

    let unit = match granularity {
        Granularity::Weekly => "week",
        Granularity::Monthly => "month",
    };
    let avg_emails = details.avg_emails;
    let (status, recommendation, title, message) = match decision {
        VolumeDecision::Insufficient => {
            return GuidanceResult::insufficient(
                ModuleKey::SendVolume,
                "The relationship between volume and revenue is too weak to trust.",
                sample,
                GuidanceDetails::SendVolume(details),
            );
        }
        VolumeDecision::SendMore => (
            GuidanceStatus::Actionable,
            RecommendationKind::SendMore,
            "Send more campaign email".to_string(),
            format!(
                "Revenue has risen with volume across {} while complaint and bounce rates held. \
                 Try about {} more than your usual {} emails a {unit}.",
                plural(sample as u32, unit),
                percent(cfg.volume_step * 100.0, 0),
                compact(avg_emails)
            ),
        ),
        VolumeDecision::SendLess => {
            let message = if details.deliverability_breached {
                format!(
                    "Average spam rate is {} and bounce rate {}, past safe limits. \
                     Cut volume to your most engaged segments until they recover.",
                    percent(details.avg_spam_rate, 2),
                    percent(details.avg_bounce_rate, 2)
                )
            } else {
                "Heavier send periods bring more risk than revenue. \
                 Scale volume back toward your lighter periods."
                    .to_string()
            };
            (
                GuidanceStatus::Actionable,
                RecommendationKind::SendLess,
                "Send less campaign email".to_string(),
                message,
            )
        }
        VolumeDecision::KeepAsIs => (
            GuidanceStatus::NoChange,
            RecommendationKind::KeepAsIs,
            "Keep your current send volume".to_string(),
            format!(
                "Across {}, more volume has not clearly moved revenue or risk. \
                 Average revenue is {} a {unit}.",
                plural(sample as u32, unit),
                currency(details.avg_revenue)
            ),
        ),
    };

    GuidanceResult {
        module: ModuleKey::SendVolume,
        status,
        recommendation,
        cadence_label: None,
        title,
        message,
        sample,
        baseline_key: None,
        target_key: None,
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details: GuidanceDetails::SendVolume(details),
    }
    .with_weekly_gain(
        period_gain * periods_per_week,
        ctx.config.guidance.weeks_per_month,
    )
}
