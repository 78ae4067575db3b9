//! Guidance results shared by every analyzer.

use serde::{Deserialize, Serialize};

use crate::audience_size::AudienceSizeDetails;
use crate::day_of_week::DayOfWeekDetails;
use crate::flow_steps::FlowStepDetails;
use crate::frequency::FrequencyDetails;
use crate::gaps::GapAnalysis;
use crate::list_health::ListHealthAnalysis;
use crate::send_volume::SendVolumeDetails;

/// Analysis modules that produce guidance and action notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKey {
    SendFrequency,
    AudienceSize,
    CampaignDayOfWeek,
    CampaignGaps,
    SendVolume,
    FlowSteps,
    ListHealth,
}

impl ModuleKey {
    pub const ALL: [ModuleKey; 7] = [
        Self::SendFrequency,
        Self::AudienceSize,
        Self::CampaignDayOfWeek,
        Self::CampaignGaps,
        Self::SendVolume,
        Self::FlowSteps,
        Self::ListHealth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::SendFrequency => "Campaign send frequency",
            Self::AudienceSize => "Campaign audience size",
            Self::CampaignDayOfWeek => "Campaign send day",
            Self::CampaignGaps => "Campaign gaps",
            Self::SendVolume => "Send volume",
            Self::FlowSteps => "Flow steps",
            Self::ListHealth => "List health",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidanceStatus {
    /// A change is recommended.
    Actionable,
    /// Current behaviour is already the best observed option.
    NoChange,
    /// Not enough data for a recommendation.
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    ScaleUp,
    ScaleDown,
    Stay,
    TestHigher,
    TestLower,
    TargetAudienceSize,
    KeepAudienceSize,
    ShiftSendDay,
    KeepSendDay,
    FillGaps,
    KeepConsistency,
    SendMore,
    SendLess,
    KeepAsIs,
    AddFlowStep,
    ReviewFlowSteps,
    KeepFlows,
    SuppressInactive,
    KeepList,
    None,
}

/// Whether an estimate is new revenue or avoided cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactType {
    Lift,
    Savings,
}

/// Module-specific analysis attached to a guidance result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GuidanceDetails {
    Frequency(FrequencyDetails),
    AudienceSize(AudienceSizeDetails),
    DayOfWeek(DayOfWeekDetails),
    Gaps(GapAnalysis),
    SendVolume(SendVolumeDetails),
    FlowSteps(FlowStepDetails),
    ListHealth(ListHealthAnalysis),
}

/// One module's recommendation for one request.
///
/// Gains are theoretical (unscaled); the action-note layer applies the
/// conservative factor and suppression floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceResult {
    pub module: ModuleKey,
    pub status: GuidanceStatus,
    pub recommendation: RecommendationKind,
    pub cadence_label: Option<String>,
    pub title: String,
    pub message: String,
    /// Observations backing the result (weeks, campaigns, steps or profiles).
    pub sample: usize,
    pub baseline_key: Option<String>,
    pub target_key: Option<String>,
    pub estimated_weekly_gain: Option<f64>,
    pub estimated_monthly_gain: Option<f64>,
    pub impact_type: ImpactType,
    pub details: GuidanceDetails,
}

pub const NOT_ENOUGH_DATA: &str = "Not enough data for a recommendation";

impl GuidanceResult {
    pub fn insufficient(
        module: ModuleKey,
        message: impl Into<String>,
        sample: usize,
        details: GuidanceDetails,
    ) -> Self {
        Self {
            module,
            status: GuidanceStatus::Insufficient,
            recommendation: RecommendationKind::None,
            cadence_label: None,
            title: NOT_ENOUGH_DATA.to_string(),
            message: message.into(),
            sample,
            baseline_key: None,
            target_key: None,
            estimated_weekly_gain: None,
            estimated_monthly_gain: None,
            impact_type: ImpactType::Lift,
            details,
        }
    }

    /// Set a theoretical weekly gain; non-positive or non-finite values clear it.
    pub fn with_weekly_gain(mut self, weekly: f64, weeks_per_month: f64) -> Self {
        if weekly.is_finite() && weekly > 0.0 {
            self.estimated_weekly_gain = Some(weekly);
            self.estimated_monthly_gain = Some(weekly * weeks_per_month);
        } else {
            self.estimated_weekly_gain = None;
            self.estimated_monthly_gain = None;
        }
        self
    }

    pub fn is_insufficient(&self) -> bool {
        self.status == GuidanceStatus::Insufficient
    }
}
