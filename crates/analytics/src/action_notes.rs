//! Action notes: every module's guidance reduced to a title, a message and a
//! conservative, floor-filtered impact estimate.

use sendlens_core::config::GuidanceConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audience_size::audience_size_guidance;
use crate::context::AnalysisContext;
use crate::day_of_week::day_of_week_guidance;
use crate::flow_steps::flow_steps_guidance;
use crate::frequency::send_frequency_guidance;
use crate::gaps::gap_guidance;
use crate::guidance::{GuidanceResult, GuidanceStatus, ImpactType, ModuleKey, RecommendationKind};
use crate::list_health::list_health_guidance;
use crate::send_volume::send_volume_guidance;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub weekly: f64,
    pub monthly: f64,
    pub annual: f64,
    #[serde(rename = "type")]
    pub impact_type: ImpactType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleActionNote {
    pub module: ModuleKey,
    pub status: GuidanceStatus,
    pub recommendation: RecommendationKind,
    pub title: String,
    pub message: String,
    pub sample: usize,
    /// `None` when there is no gain or it falls under the monthly floor.
    pub estimated_impact: Option<EstimatedImpact>,
}

/// Scale a theoretical weekly gain by the conservative factor and drop it
/// when the monthly figure is under the floor.
pub fn estimate_impact(
    theoretical_weekly: Option<f64>,
    impact_type: ImpactType,
    cfg: &GuidanceConfig,
) -> Option<EstimatedImpact> {
    let weekly = theoretical_weekly? * cfg.conservative_factor;
    if !weekly.is_finite() || weekly <= 0.0 {
        return None;
    }
    let monthly = weekly * cfg.weeks_per_month;
    if monthly < cfg.min_monthly_gain {
        return None;
    }
    Some(EstimatedImpact {
        weekly,
        monthly,
        annual: weekly * cfg.weeks_per_year,
        impact_type,
    })
}

impl ModuleActionNote {
    pub fn from_guidance(guidance: &GuidanceResult, cfg: &GuidanceConfig) -> Self {
        let estimated_impact = if guidance.status == GuidanceStatus::Actionable {
            estimate_impact(guidance.estimated_weekly_gain, guidance.impact_type, cfg)
        } else {
            None
        };
        Self {
            module: guidance.module,
            status: guidance.status,
            recommendation: guidance.recommendation,
            title: guidance.title.clone(),
            message: guidance.message.clone(),
            sample: guidance.sample,
            estimated_impact,
        }
    }
}

/// Run one module's analyzer.
pub fn guidance_for(module: ModuleKey, ctx: &AnalysisContext<'_>) -> GuidanceResult {
    match module {
        ModuleKey::SendFrequency => send_frequency_guidance(ctx),
        ModuleKey::AudienceSize => audience_size_guidance(ctx),
        ModuleKey::CampaignDayOfWeek => day_of_week_guidance(ctx),
        ModuleKey::CampaignGaps => gap_guidance(ctx),
        ModuleKey::SendVolume => send_volume_guidance(ctx),
        ModuleKey::FlowSteps => flow_steps_guidance(ctx),
        ModuleKey::ListHealth => list_health_guidance(ctx),
    }
}

pub fn action_note_for(module: ModuleKey, ctx: &AnalysisContext<'_>) -> ModuleActionNote {
    let guidance = guidance_for(module, ctx);
    let note = ModuleActionNote::from_guidance(&guidance, &ctx.config.guidance);
    debug!(
        module = ?module,
        status = ?note.status,
        impact = note.estimated_impact.map(|i| i.monthly),
        "Action note built"
    );
    note
}

/// One note per module, in [`ModuleKey::ALL`] order.
pub fn build_action_notes(ctx: &AnalysisContext<'_>) -> Vec<ModuleActionNote> {
    let notes: Vec<ModuleActionNote> = ModuleKey::ALL
        .iter()
        .map(|module| action_note_for(*module, ctx))
        .collect();
    info!(
        range = %ctx.range,
        actionable = notes
            .iter()
            .filter(|n| n.status == GuidanceStatus::Actionable)
            .count(),
        with_impact = notes
            .iter()
            .filter(|n| n.estimated_impact.is_some())
            .count(),
        "Action notes built"
    );
    notes
}
