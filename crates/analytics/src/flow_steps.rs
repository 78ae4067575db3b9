//! Flow steps: scores every step of every flow on money, deliverability and
//! confidence, decides an action per step, and checks whether a flow has room
//! for one more step.

use std::collections::BTreeMap;

use sendlens_core::config::FlowStepConfig;
use sendlens_core::SendRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucketing::{MetricRates, MetricSums};
use crate::context::AnalysisContext;
use crate::deliverability::{assess, AccountContext, RiskZone, SegmentVolume};
use crate::format::{currency, plural};
use crate::guidance::{
    GuidanceDetails, GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind,
};
use crate::stats::{coefficient_of_variation, median, percentile, safe_div};

const MAX_REVENUE_INDEX: f64 = 2.0;
const REVENUE_INDEX_POINTS: f64 = 17.5;
const MAX_CONFIDENCE_POINTS: f64 = 10.0;

/// Store revenue share (fraction) to money points.
const STORE_SHARE_POINTS: [(f64, f64); 6] = [
    (0.10, 35.0),
    (0.05, 28.0),
    (0.02, 20.0),
    (0.01, 14.0),
    (0.005, 8.0),
    (0.001, 4.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Scale,
    Keep,
    Improve,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepScore {
    pub revenue_index: f64,
    pub store_share: f64,
    pub money_points: f64,
    pub deliverability_points: f64,
    pub confidence_points: f64,
    pub total: f64,
    pub zone: RiskZone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStepAnalysis {
    pub position: u32,
    pub message_id: String,
    pub label: String,
    pub sums: MetricSums,
    pub rates: MetricRates,
    pub revenue_per_email: f64,
    pub score: StepScore,
    pub action: StepAction,
    /// Revenue high enough that the step is never paused.
    pub guardrail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStepProjection {
    pub decay_factor: f64,
    /// Conservative (P25) revenue per email across existing steps.
    pub base_revenue_per_email: f64,
    pub projected_emails: f64,
    pub projected_revenue: f64,
    pub projected_revenue_low: f64,
    pub projected_revenue_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAnalysis {
    pub flow_name: String,
    pub total_sends: u64,
    pub total_revenue: f64,
    pub median_revenue_per_email: f64,
    pub steps: Vec<FlowStepAnalysis>,
    pub add_step_eligible: bool,
    /// Gates an add-step suggestion failed.
    pub add_step_blockers: Vec<String>,
    pub projection: Option<NewStepProjection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStepDetails {
    pub flows: Vec<FlowAnalysis>,
    pub store_revenue: f64,
}

/// Inputs to [`score_step`] beyond the step's own totals.
#[derive(Debug, Clone, Copy)]
pub struct StepScoreInputs<'a> {
    pub flow_median_rpe: f64,
    pub store_revenue: f64,
    pub account: &'a AccountContext,
}

fn store_share_points(share: f64) -> f64 {
    STORE_SHARE_POINTS
        .iter()
        .find(|(floor, _)| share >= *floor)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// 0-100 score from money (0-70), deliverability (0-20) and confidence (0-10).
pub fn score_step(
    sums: &MetricSums,
    inputs: StepScoreInputs<'_>,
    ctx: &AnalysisContext<'_>,
) -> StepScore {
    let cfg = &ctx.config.flow_steps;
    let rpe = safe_div(sums.revenue, sums.emails_sent as f64);
    let revenue_index = safe_div(rpe, inputs.flow_median_rpe).clamp(0.0, MAX_REVENUE_INDEX);
    let store_share = safe_div(sums.revenue, inputs.store_revenue);
    let money_points = revenue_index * REVENUE_INDEX_POINTS + store_share_points(store_share);

    let assessment = assess(
        SegmentVolume::from(sums),
        Some(inputs.account),
        &ctx.config.deliverability,
    );

    let confidence_points = if sums.emails_sent < cfg.min_confidence_sends {
        0.0
    } else {
        ((sums.emails_sent / 100) as f64).min(MAX_CONFIDENCE_POINTS)
    };

    StepScore {
        revenue_index,
        store_share,
        money_points,
        deliverability_points: assessment.points,
        confidence_points,
        total: money_points + assessment.points + confidence_points,
        zone: assessment.zone,
    }
}

/// Action for one step. The guardrail keeps meaningful earners out of `Pause`.
pub fn decide_action(score: &StepScore, guardrail: bool, cfg: &FlowStepConfig) -> StepAction {
    let money_high = score.money_points >= cfg.money_high_points;
    if score.zone == RiskZone::Red {
        return if money_high || guardrail {
            StepAction::Keep
        } else {
            StepAction::Pause
        };
    }
    match score.total {
        t if t >= 75.0 => StepAction::Scale,
        t if t >= 60.0 => StepAction::Keep,
        t if t >= 40.0 => StepAction::Improve,
        _ if guardrail => StepAction::Improve,
        _ => StepAction::Pause,
    }
}

/// How much of the last step's audience a new step is expected to keep,
/// by flow type.
pub fn decay_factor_for(flow_name: &str) -> f64 {
    let name = flow_name.to_lowercase();
    if name.contains("welcome") {
        0.40
    } else if name.contains("post-purchase")
        || name.contains("post purchase")
        || name.contains("thank")
    {
        0.60
    } else if name.contains("sunset") {
        0.35
    } else if name.contains("abandon") {
        0.45
    } else {
        0.50
    }
}

/// Revenue a hypothetical next step would earn over the same window.
pub fn project_new_step(
    flow_name: &str,
    step_rpes: &[f64],
    last_step_sends: u64,
) -> Option<NewStepProjection> {
    if step_rpes.is_empty() || last_step_sends == 0 {
        return None;
    }
    let decay_factor = decay_factor_for(flow_name);
    let base_revenue_per_email = percentile(step_rpes, 25.0);
    let projected_emails = last_step_sends as f64 * decay_factor;
    let projected_revenue = base_revenue_per_email * projected_emails;
    let spread = coefficient_of_variation(step_rpes);
    Some(NewStepProjection {
        decay_factor,
        base_revenue_per_email,
        projected_emails,
        projected_revenue,
        projected_revenue_low: projected_revenue * (1.0 - spread).max(0.0),
        projected_revenue_high: projected_revenue * (1.0 + spread),
    })
}

pub fn analyze_flow_steps(ctx: &AnalysisContext<'_>) -> FlowStepDetails {
    let cfg = &ctx.config.flow_steps;
    let flow_emails = ctx.flow_emails();
    let account = AccountContext::from_records(ctx.all_sends());
    let store_revenue: f64 = ctx.all_sends().iter().map(|r| r.revenue).sum();

    let mut by_flow: BTreeMap<&str, BTreeMap<String, Vec<&SendRecord>>> = BTreeMap::new();
    for record in flow_emails.iter().copied() {
        let Some(flow) = record.flow_name.as_deref() else {
            continue;
        };
        let message = record
            .flow_message_id
            .clone()
            .unwrap_or_else(|| record.name.clone());
        by_flow
            .entry(flow)
            .or_default()
            .entry(message)
            .or_default()
            .push(record);
    }

    let flows = by_flow
        .into_iter()
        .filter_map(|(flow_name, mut messages)| {
            let sequence = ctx.dataset.flow_sequence_info(flow_name)?;
            let ordered: Vec<(u32, String, String, MetricSums)> = sequence
                .steps
                .into_iter()
                .filter_map(|step| {
                    let records = messages.remove(&step.message_id)?;
                    let sums = MetricSums::from_records(records);
                    Some((step.position, step.message_id, step.label, sums))
                })
                .collect();
            if ordered.is_empty() {
                return None;
            }
            Some(analyze_flow(flow_name, ordered, store_revenue, &account, ctx, cfg))
        })
        .collect::<Vec<_>>();

    debug!(
        flows = flows.len(),
        eligible = flows.iter().filter(|f| f.add_step_eligible).count(),
        "Flow steps analyzed"
    );

    FlowStepDetails {
        flows,
        store_revenue,
    }
}

fn analyze_flow(
    flow_name: &str,
    ordered: Vec<(u32, String, String, MetricSums)>,
    store_revenue: f64,
    account: &AccountContext,
    ctx: &AnalysisContext<'_>,
    cfg: &FlowStepConfig,
) -> FlowAnalysis {
    let rpes: Vec<f64> = ordered
        .iter()
        .map(|(_, _, _, s)| safe_div(s.revenue, s.emails_sent as f64))
        .collect();
    let median_rpe = median(&rpes);
    let total_sends: u64 = ordered.iter().map(|(_, _, _, s)| s.emails_sent).sum();
    let total_revenue: f64 = ordered.iter().map(|(_, _, _, s)| s.revenue).sum();

    let inputs = StepScoreInputs {
        flow_median_rpe: median_rpe,
        store_revenue,
        account,
    };
    let steps: Vec<FlowStepAnalysis> = ordered
        .into_iter()
        .zip(&rpes)
        .map(|((position, message_id, label, sums), rpe)| {
            let score = score_step(&sums, inputs, ctx);
            let guardrail = sums.revenue >= cfg.guardrail_revenue
                || safe_div(sums.revenue, total_revenue) >= cfg.guardrail_share;
            FlowStepAnalysis {
                position,
                message_id,
                label,
                rates: sums.rates(),
                sums,
                revenue_per_email: *rpe,
                action: decide_action(&score, guardrail, cfg),
                score,
                guardrail,
            }
        })
        .collect();

    let mut blockers = Vec::new();
    let last = steps.last();
    if total_sends < cfg.min_flow_sends_for_new_step {
        blockers.push(format!(
            "flow has {} sends, needs {}",
            total_sends, cfg.min_flow_sends_for_new_step
        ));
    }
    if let Some(last) = last {
        if last.score.total < cfg.min_last_step_score {
            blockers.push(format!("last step scores {:.0}", last.score.total));
        }
        if last.revenue_per_email < median_rpe {
            blockers.push("last step earns less per email than the flow median".to_string());
        }
        if steps.len() >= 2 && last.revenue_per_email < steps[steps.len() - 2].revenue_per_email {
            blockers.push("revenue per email falls into the last step".to_string());
        }
        if last.sums.revenue < cfg.min_step_revenue
            || safe_div(last.sums.revenue, total_revenue) < cfg.min_step_revenue_share
        {
            blockers.push(format!("last step earned only {}", currency(last.sums.revenue)));
        }
    }
    if cfg.require_recent_window && !ctx.ends_at_latest_data() {
        blockers.push("date range does not end at the latest data".to_string());
    }

    let add_step_eligible = blockers.is_empty();
    let projection = if add_step_eligible {
        last.and_then(|l| project_new_step(flow_name, &rpes, l.sums.emails_sent))
    } else {
        None
    };

    FlowAnalysis {
        flow_name: flow_name.to_string(),
        total_sends,
        total_revenue,
        median_revenue_per_email: median_rpe,
        steps,
        add_step_eligible,
        add_step_blockers: blockers,
        projection,
    }
}

pub fn flow_steps_guidance(ctx: &AnalysisContext<'_>) -> GuidanceResult {
    let details = analyze_flow_steps(ctx);
    let sample: usize = details.flows.iter().map(|f| f.steps.len()).sum();
    let confident = details
        .flows
        .iter()
        .flat_map(|f| &f.steps)
        .any(|s| s.score.confidence_points > 0.0);

    if !confident {
        return GuidanceResult::insufficient(
            ModuleKey::FlowSteps,
            format!(
                "No flow step sent at least {} emails in this range.",
                ctx.config.flow_steps.min_confidence_sends
            ),
            sample,
            GuidanceDetails::FlowSteps(details),
        );
    }

    let weeks = ctx.weeks_in_range();
    let candidates: Vec<(&str, f64)> = details
        .flows
        .iter()
        .filter_map(|f| {
            f.projection
                .as_ref()
                .map(|p| (f.flow_name.as_str(), p.projected_revenue))
        })
        .collect();

    if let Some((top_flow, _)) = candidates
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .copied()
    {
        let projected: f64 = candidates.iter().map(|(_, r)| r).sum();
        let title = format!("Add a step to {top_flow}");
        let message = format!(
            "{} {} strong final steps. A new step could add about {} over a range like this one.",
            plural(candidates.len() as u32, "flow"),
            if candidates.len() == 1 { "has" } else { "have" },
            currency(projected)
        );
        let top_flow = top_flow.to_string();
        return GuidanceResult {
            module: ModuleKey::FlowSteps,
            status: GuidanceStatus::Actionable,
            recommendation: RecommendationKind::AddFlowStep,
            cadence_label: None,
            title,
            message,
            sample,
            baseline_key: None,
            target_key: Some(top_flow),
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details: GuidanceDetails::FlowSteps(details),
        }
        .with_weekly_gain(
            safe_div(projected, weeks),
            ctx.config.guidance.weeks_per_month,
        );
    }

    let flagged: Vec<&FlowStepAnalysis> = details
        .flows
        .iter()
        .flat_map(|f| &f.steps)
        .filter(|s| matches!(s.action, StepAction::Pause | StepAction::Improve))
        .collect();
    if !flagged.is_empty() {
        let paused = flagged
            .iter()
            .filter(|s| s.action == StepAction::Pause)
            .count();
        let message = format!(
            "{} need attention ({} to pause). \
             Check subject lines and offers, or remove steps that only add risk.",
            plural(flagged.len() as u32, "flow step"),
            paused
        );
        return GuidanceResult {
            module: ModuleKey::FlowSteps,
            status: GuidanceStatus::Actionable,
            recommendation: RecommendationKind::ReviewFlowSteps,
            cadence_label: None,
            title: "Review weak flow steps".to_string(),
            message,
            sample,
            baseline_key: None,
            target_key: None,
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details: GuidanceDetails::FlowSteps(details),
        };
    }

    GuidanceResult {
        module: ModuleKey::FlowSteps,
        status: GuidanceStatus::NoChange,
        recommendation: RecommendationKind::KeepFlows,
        cadence_label: None,
        title: "Flows are performing well".to_string(),
        message: format!(
            "All {} score well enough to keep as they are.",
            plural(sample as u32, "flow step")
        ),
        sample,
        baseline_key: None,
        target_key: None,
        estimated_weekly_gain: None,
        estimated_monthly_gain: None,
        impact_type: ImpactType::Lift,
        details: GuidanceDetails::FlowSteps(details),
    }
}
