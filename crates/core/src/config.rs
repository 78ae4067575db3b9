use serde::{Deserialize, Serialize};

/// Thresholds and tuning constants shared by every analyzer. Loaded from
/// environment variables with the prefix `SENDLENS__`; anything unset keeps
/// its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub deliverability: DeliverabilityConfig,
    #[serde(default)]
    pub frequency: FrequencyConfig,
    #[serde(default)]
    pub audience_size: AudienceSizeConfig,
    #[serde(default)]
    pub day_of_week: DayOfWeekConfig,
    #[serde(default)]
    pub gaps: GapConfig,
    #[serde(default)]
    pub send_volume: SendVolumeConfig,
    #[serde(default)]
    pub flow_steps: FlowStepConfig,
    #[serde(default)]
    pub list_health: ListHealthConfig,
    #[serde(default)]
    pub guidance: GuidanceConfig,
}

impl AnalyticsConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SENDLENS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

// ─── Deliverability ─────────────────────────────────────────────────────────

/// Rates are percentages (0.10 means 0.10%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverabilityConfig {
    #[serde(default = "default_spam_green")]
    pub spam_green_limit: f64,
    #[serde(default = "default_spam_red")]
    pub spam_red_limit: f64,
    #[serde(default = "default_bounce_green")]
    pub bounce_green_limit: f64,
    #[serde(default = "default_bounce_red")]
    pub bounce_red_limit: f64,
    #[serde(default = "default_unsubscribe_limit")]
    pub unsubscribe_limit: f64,
    /// Sends needed before a red verdict on a single step is trusted.
    #[serde(default = "default_significant_sends")]
    pub significant_sends: u64,
    #[serde(default = "default_severe_multiplier")]
    pub severe_multiplier: f64,
    #[serde(default = "default_disproportion_multiplier")]
    pub disproportion_multiplier: f64,
    /// Share of account volume (0-1) below which red/yellow points are softened.
    #[serde(default = "default_low_volume_share")]
    pub low_volume_share: f64,
    #[serde(default = "default_low_volume_max_recovery")]
    pub low_volume_max_recovery: f64,
}

fn default_spam_green() -> f64 {
    0.10
}
fn default_spam_red() -> f64 {
    0.20
}
fn default_bounce_green() -> f64 {
    2.0
}
fn default_bounce_red() -> f64 {
    3.0
}
fn default_unsubscribe_limit() -> f64 {
    1.0
}
fn default_significant_sends() -> u64 {
    500
}
fn default_severe_multiplier() -> f64 {
    3.0
}
fn default_disproportion_multiplier() -> f64 {
    2.0
}
fn default_low_volume_share() -> f64 {
    0.005
}
fn default_low_volume_max_recovery() -> f64 {
    0.5
}

impl Default for DeliverabilityConfig {
    fn default() -> Self {
        Self {
            spam_green_limit: default_spam_green(),
            spam_red_limit: default_spam_red(),
            bounce_green_limit: default_bounce_green(),
            bounce_red_limit: default_bounce_red(),
            unsubscribe_limit: default_unsubscribe_limit(),
            significant_sends: default_significant_sends(),
            severe_multiplier: default_severe_multiplier(),
            disproportion_multiplier: default_disproportion_multiplier(),
            low_volume_share: default_low_volume_share(),
            low_volume_max_recovery: default_low_volume_max_recovery(),
        }
    }
}

// ─── Send Frequency ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyConfig {
    #[serde(default = "default_trailing_window_days")]
    pub trailing_window_days: i64,
    #[serde(default = "default_anomaly_percentile")]
    pub anomaly_percentile: f64,
    #[serde(default = "default_min_trailing_weeks")]
    pub min_trailing_weeks: usize,
    #[serde(default = "default_frequency_iqr_multiplier")]
    pub iqr_multiplier: f64,
    #[serde(default = "default_iqr_min_weeks")]
    pub iqr_min_weeks: usize,
    #[serde(default = "default_min_total_weeks")]
    pub min_total_weeks: usize,
    #[serde(default = "default_min_weeks_per_bucket")]
    pub min_weeks_per_bucket: usize,
    #[serde(default = "default_z_score")]
    pub z_score: f64,
}

fn default_trailing_window_days() -> i64 {
    365
}
fn default_anomaly_percentile() -> f64 {
    90.0
}
fn default_min_trailing_weeks() -> usize {
    8
}
fn default_frequency_iqr_multiplier() -> f64 {
    1.5
}
fn default_iqr_min_weeks() -> usize {
    4
}
fn default_min_total_weeks() -> usize {
    4
}
fn default_min_weeks_per_bucket() -> usize {
    3
}
fn default_z_score() -> f64 {
    1.96
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            trailing_window_days: default_trailing_window_days(),
            anomaly_percentile: default_anomaly_percentile(),
            min_trailing_weeks: default_min_trailing_weeks(),
            iqr_multiplier: default_frequency_iqr_multiplier(),
            iqr_min_weeks: default_iqr_min_weeks(),
            min_total_weeks: default_min_total_weeks(),
            min_weeks_per_bucket: default_min_weeks_per_bucket(),
            z_score: default_z_score(),
        }
    }
}

// ─── Audience Size ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceSizeConfig {
    /// Campaign count at which the small-send floor is applied.
    #[serde(default = "default_floor_min_campaigns")]
    pub floor_min_campaigns: usize,
    #[serde(default = "default_floor_percentile")]
    pub floor_percentile: f64,
    #[serde(default = "default_floor_min")]
    pub floor_min: f64,
    #[serde(default = "default_floor_max")]
    pub floor_max: f64,
    #[serde(default = "default_min_campaigns_per_bucket")]
    pub min_campaigns_per_bucket: usize,
    #[serde(default = "default_min_emails_per_bucket")]
    pub min_emails_per_bucket: u64,
}

fn default_floor_min_campaigns() -> usize {
    12
}
fn default_floor_percentile() -> f64 {
    5.0
}
fn default_floor_min() -> f64 {
    100.0
}
fn default_floor_max() -> f64 {
    1000.0
}
fn default_min_campaigns_per_bucket() -> usize {
    3
}
fn default_min_emails_per_bucket() -> u64 {
    10_000
}

impl Default for AudienceSizeConfig {
    fn default() -> Self {
        Self {
            floor_min_campaigns: default_floor_min_campaigns(),
            floor_percentile: default_floor_percentile(),
            floor_min: default_floor_min(),
            floor_max: default_floor_max(),
            min_campaigns_per_bucket: default_min_campaigns_per_bucket(),
            min_emails_per_bucket: default_min_emails_per_bucket(),
        }
    }
}

// ─── Day of Week ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayOfWeekConfig {
    #[serde(default = "default_min_campaigns_per_week")]
    pub min_campaigns_per_week: f64,
    #[serde(default = "default_min_campaigns_per_day")]
    pub min_campaigns_per_day: usize,
    #[serde(default = "default_min_total_campaigns")]
    pub min_total_campaigns: usize,
}

fn default_min_campaigns_per_week() -> f64 {
    0.25
}
fn default_min_campaigns_per_day() -> usize {
    3
}
fn default_min_total_campaigns() -> usize {
    6
}

impl Default for DayOfWeekConfig {
    fn default() -> Self {
        Self {
            min_campaigns_per_week: default_min_campaigns_per_week(),
            min_campaigns_per_day: default_min_campaigns_per_day(),
            min_total_campaigns: default_min_total_campaigns(),
        }
    }
}

// ─── Gaps ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    #[serde(default = "default_short_run_max_weeks")]
    pub short_run_max_weeks: usize,
    #[serde(default = "default_neighbour_weeks")]
    pub neighbour_weeks: usize,
    #[serde(default = "default_gap_iqr_multiplier")]
    pub iqr_multiplier: f64,
    #[serde(default = "default_iqr_min_refs")]
    pub iqr_min_refs: usize,
    #[serde(default = "default_winsor_low")]
    pub winsor_low_percentile: f64,
    #[serde(default = "default_winsor_high")]
    pub winsor_high_percentile: f64,
    #[serde(default = "default_cap_percentile")]
    pub cap_percentile: f64,
    #[serde(default = "default_local_window_weeks")]
    pub local_window_weeks: usize,
    #[serde(default = "default_min_local_refs")]
    pub min_local_refs: usize,
    #[serde(default = "default_decay_after_weeks")]
    pub decay_after_weeks: usize,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_coverage_gap_weeks")]
    pub coverage_gap_weeks: usize,
}

fn default_short_run_max_weeks() -> usize {
    4
}
fn default_neighbour_weeks() -> usize {
    4
}
fn default_gap_iqr_multiplier() -> f64 {
    3.0
}
fn default_iqr_min_refs() -> usize {
    5
}
fn default_winsor_low() -> f64 {
    10.0
}
fn default_winsor_high() -> f64 {
    90.0
}
fn default_cap_percentile() -> f64 {
    75.0
}
fn default_local_window_weeks() -> usize {
    8
}
fn default_min_local_refs() -> usize {
    4
}
fn default_decay_after_weeks() -> usize {
    12
}
fn default_decay_rate() -> f64 {
    0.95
}
fn default_coverage_gap_weeks() -> usize {
    10
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            short_run_max_weeks: default_short_run_max_weeks(),
            neighbour_weeks: default_neighbour_weeks(),
            iqr_multiplier: default_gap_iqr_multiplier(),
            iqr_min_refs: default_iqr_min_refs(),
            winsor_low_percentile: default_winsor_low(),
            winsor_high_percentile: default_winsor_high(),
            cap_percentile: default_cap_percentile(),
            local_window_weeks: default_local_window_weeks(),
            min_local_refs: default_min_local_refs(),
            decay_after_weeks: default_decay_after_weeks(),
            decay_rate: default_decay_rate(),
            coverage_gap_weeks: default_coverage_gap_weeks(),
        }
    }
}

// ─── Send Volume ────────────────────────────────────────────────────────────

/// Which send-volume model produces guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendVolumeModel {
    /// Pearson correlation of volume against revenue and risk rates.
    #[default]
    Correlation,
    /// `revenue = a + b * ln(volume)` fit with a red-zone kill switch.
    LogRegression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendVolumeConfig {
    #[serde(default)]
    pub model: SendVolumeModel,
    #[serde(default = "default_min_weekly_points")]
    pub min_weekly_points: usize,
    #[serde(default = "default_min_monthly_points")]
    pub min_monthly_points: usize,
    #[serde(default = "default_strong_correlation")]
    pub strong_correlation: f64,
    #[serde(default = "default_weak_correlation")]
    pub weak_correlation: f64,
    #[serde(default = "default_min_r_squared")]
    pub min_r_squared: f64,
    #[serde(default = "default_slope_threshold")]
    pub slope_threshold: f64,
    /// Fractional volume change used when pricing a send-more recommendation.
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
    /// Extra risk tolerance granted per point of revenue score.
    #[serde(default = "default_revenue_tolerance_step")]
    pub revenue_tolerance_step: f64,
}

fn default_min_weekly_points() -> usize {
    6
}
fn default_min_monthly_points() -> usize {
    3
}
fn default_strong_correlation() -> f64 {
    0.35
}
fn default_weak_correlation() -> f64 {
    0.15
}
fn default_min_r_squared() -> f64 {
    0.1
}
fn default_slope_threshold() -> f64 {
    50.0
}
fn default_volume_step() -> f64 {
    0.2
}
fn default_revenue_tolerance_step() -> f64 {
    0.25
}

impl Default for SendVolumeConfig {
    fn default() -> Self {
        Self {
            model: SendVolumeModel::default(),
            min_weekly_points: default_min_weekly_points(),
            min_monthly_points: default_min_monthly_points(),
            strong_correlation: default_strong_correlation(),
            weak_correlation: default_weak_correlation(),
            min_r_squared: default_min_r_squared(),
            slope_threshold: default_slope_threshold(),
            volume_step: default_volume_step(),
            revenue_tolerance_step: default_revenue_tolerance_step(),
        }
    }
}

// ─── Flow Steps ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStepConfig {
    #[serde(default = "default_min_confidence_sends")]
    pub min_confidence_sends: u64,
    #[serde(default = "default_min_flow_sends_for_new_step")]
    pub min_flow_sends_for_new_step: u64,
    #[serde(default = "default_min_last_step_score")]
    pub min_last_step_score: f64,
    #[serde(default = "default_min_step_revenue")]
    pub min_step_revenue: f64,
    #[serde(default = "default_min_step_revenue_share")]
    pub min_step_revenue_share: f64,
    /// Only suggest new steps when the window ends at the latest data.
    #[serde(default = "default_require_recent_window")]
    pub require_recent_window: bool,
    #[serde(default = "default_guardrail_revenue")]
    pub guardrail_revenue: f64,
    #[serde(default = "default_guardrail_share")]
    pub guardrail_share: f64,
    #[serde(default = "default_money_high_points")]
    pub money_high_points: f64,
}

fn default_min_confidence_sends() -> u64 {
    250
}
fn default_min_flow_sends_for_new_step() -> u64 {
    1000
}
fn default_min_last_step_score() -> f64 {
    75.0
}
fn default_min_step_revenue() -> f64 {
    250.0
}
fn default_min_step_revenue_share() -> f64 {
    0.05
}
fn default_require_recent_window() -> bool {
    true
}
fn default_guardrail_revenue() -> f64 {
    500.0
}
fn default_guardrail_share() -> f64 {
    0.10
}
fn default_money_high_points() -> f64 {
    35.0
}

impl Default for FlowStepConfig {
    fn default() -> Self {
        Self {
            min_confidence_sends: default_min_confidence_sends(),
            min_flow_sends_for_new_step: default_min_flow_sends_for_new_step(),
            min_last_step_score: default_min_last_step_score(),
            min_step_revenue: default_min_step_revenue(),
            min_step_revenue_share: default_min_step_revenue_share(),
            require_recent_window: default_require_recent_window(),
            guardrail_revenue: default_guardrail_revenue(),
            guardrail_share: default_guardrail_share(),
            money_high_points: default_money_high_points(),
        }
    }
}

// ─── List Health ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListHealthConfig {
    #[serde(default = "default_min_subscribers")]
    pub min_subscribers: usize,
    #[serde(default = "default_engaged_days")]
    pub engaged_days: i64,
    #[serde(default = "default_inactive_days")]
    pub inactive_days: i64,
    /// ESP cost per stored profile per month, in the store's currency.
    #[serde(default = "default_cost_per_profile_monthly")]
    pub cost_per_profile_monthly: f64,
}

fn default_min_subscribers() -> usize {
    100
}
fn default_engaged_days() -> i64 {
    90
}
fn default_inactive_days() -> i64 {
    120
}
fn default_cost_per_profile_monthly() -> f64 {
    0.015
}

impl Default for ListHealthConfig {
    fn default() -> Self {
        Self {
            min_subscribers: default_min_subscribers(),
            engaged_days: default_engaged_days(),
            inactive_days: default_inactive_days(),
            cost_per_profile_monthly: default_cost_per_profile_monthly(),
        }
    }
}

// ─── Guidance ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceConfig {
    /// Multiplier applied to theoretical gains before they are shown.
    #[serde(default = "default_conservative_factor")]
    pub conservative_factor: f64,
    /// Estimates below this monthly value are suppressed.
    #[serde(default = "default_min_monthly_gain")]
    pub min_monthly_gain: f64,
    #[serde(default = "default_weeks_per_month")]
    pub weeks_per_month: f64,
    #[serde(default = "default_weeks_per_year")]
    pub weeks_per_year: f64,
}

fn default_conservative_factor() -> f64 {
    0.5
}
fn default_min_monthly_gain() -> f64 {
    100.0
}
fn default_weeks_per_month() -> f64 {
    4.0
}
fn default_weeks_per_year() -> f64 {
    52.0
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            conservative_factor: default_conservative_factor(),
            min_monthly_gain: default_min_monthly_gain(),
            weeks_per_month: default_weeks_per_month(),
            weeks_per_year: default_weeks_per_year(),
        }
    }
}
