//! Opportunity summary: rolls action-note impacts up into campaign, flow and
//! audience categories without double counting overlapping campaign levers.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action_notes::{build_action_notes, ModuleActionNote};
use crate::context::AnalysisContext;
use crate::guidance::{ImpactType, ModuleKey};
use crate::stats::safe_div;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityCategory {
    Campaigns,
    Flows,
    Audience,
}

impl OpportunityCategory {
    pub const ALL: [OpportunityCategory; 3] = [Self::Campaigns, Self::Flows, Self::Audience];

    pub fn for_module(module: ModuleKey) -> Self {
        match module {
            ModuleKey::SendFrequency
            | ModuleKey::AudienceSize
            | ModuleKey::CampaignDayOfWeek
            | ModuleKey::CampaignGaps => Self::Campaigns,
            ModuleKey::FlowSteps => Self::Flows,
            ModuleKey::SendVolume | ModuleKey::ListHealth => Self::Audience,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityItem {
    pub module: ModuleKey,
    pub category: OpportunityCategory,
    pub title: String,
    pub amount_annual: f64,
    pub impact_type: ImpactType,
    pub percent_of_category: f64,
    pub percent_of_overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: OpportunityCategory,
    pub amount_annual: f64,
    pub percent_of_overall: f64,
    pub percent_of_baseline: f64,
    /// Items in this category, largest first.
    pub items: Vec<OpportunityItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySummary {
    pub total_annual: f64,
    /// Revenue in range scaled to a year.
    pub baseline_annual_revenue: f64,
    pub percent_of_baseline: f64,
    pub categories: Vec<CategoryTotal>,
    /// Items with an impact estimate, largest first.
    pub breakdown: Vec<OpportunityItem>,
}

// Folding from +0.0 keeps empty totals from serializing as -0.0.
fn total(amounts: impl IntoIterator<Item = f64>) -> f64 {
    amounts.into_iter().fold(0.0, |acc, a| acc + a)
}

fn annual_for(items: &[(ModuleKey, f64)], module: ModuleKey) -> f64 {
    total(
        items
            .iter()
            .filter(|(m, _)| *m == module)
            .map(|(_, amount)| *amount),
    )
}

/// Campaign category total: frequency and audience size overlap, so the
/// smaller of the two counts half. Gaps and send day add in full.
fn campaigns_total(items: &[(ModuleKey, f64)]) -> f64 {
    let frequency = annual_for(items, ModuleKey::SendFrequency);
    let audience = annual_for(items, ModuleKey::AudienceSize);
    frequency.max(audience)
        + 0.5 * frequency.min(audience)
        + annual_for(items, ModuleKey::CampaignGaps)
        + annual_for(items, ModuleKey::CampaignDayOfWeek)
}

fn by_amount_desc(items: &mut [OpportunityItem]) {
    items.sort_by(|a, b| b.amount_annual.total_cmp(&a.amount_annual));
}

pub fn summarize_notes(
    notes: &[ModuleActionNote],
    baseline_annual_revenue: f64,
) -> OpportunitySummary {
    let with_impact: Vec<(&ModuleActionNote, f64, ImpactType)> = notes
        .iter()
        .filter_map(|n| n.estimated_impact.map(|i| (n, i.annual, i.impact_type)))
        .collect();

    let with_impact = &with_impact;
    let in_category = move |category: OpportunityCategory| {
        with_impact
            .iter()
            .filter(move |(n, _, _)| OpportunityCategory::for_module(n.module) == category)
    };

    let amounts: Vec<(OpportunityCategory, f64)> = OpportunityCategory::ALL
        .into_iter()
        .map(|category| {
            let items: Vec<(ModuleKey, f64)> = in_category(category)
                .map(|(n, annual, _)| (n.module, *annual))
                .collect();
            let amount = match category {
                OpportunityCategory::Campaigns => campaigns_total(&items),
                _ => total(items.iter().map(|(_, a)| *a)),
            };
            (category, amount)
        })
        .collect();

    let total_annual = total(amounts.iter().map(|(_, amount)| *amount));

    let categories: Vec<CategoryTotal> = amounts
        .into_iter()
        .map(|(category, amount_annual)| {
            let mut items: Vec<OpportunityItem> = in_category(category)
                .map(|(note, annual, impact_type)| OpportunityItem {
                    module: note.module,
                    category,
                    title: note.title.clone(),
                    amount_annual: *annual,
                    impact_type: *impact_type,
                    percent_of_category: (safe_div(*annual, amount_annual) * 100.0).min(100.0),
                    percent_of_overall: (safe_div(*annual, total_annual) * 100.0).min(100.0),
                })
                .collect();
            by_amount_desc(&mut items);
            CategoryTotal {
                category,
                amount_annual,
                percent_of_overall: safe_div(amount_annual, total_annual) * 100.0,
                percent_of_baseline: safe_div(amount_annual, baseline_annual_revenue) * 100.0,
                items,
            }
        })
        .collect();

    let mut breakdown: Vec<OpportunityItem> = categories
        .iter()
        .flat_map(|c| c.items.iter().cloned())
        .collect();
    by_amount_desc(&mut breakdown);

    OpportunitySummary {
        total_annual,
        baseline_annual_revenue,
        percent_of_baseline: safe_div(total_annual, baseline_annual_revenue) * 100.0,
        categories,
        breakdown,
    }
}

/// Revenue of every send in range, annualized.
pub fn baseline_annual_revenue(ctx: &AnalysisContext<'_>) -> f64 {
    let revenue = total(ctx.all_sends().iter().map(|r| r.revenue));
    safe_div(revenue, ctx.weeks_in_range()) * ctx.config.guidance.weeks_per_year
}

pub fn build_opportunity_summary(ctx: &AnalysisContext<'_>) -> OpportunitySummary {
    let notes = build_action_notes(ctx);
    let summary = summarize_notes(&notes, baseline_annual_revenue(ctx));
    info!(
        total_annual = summary.total_annual,
        items = summary.breakdown.len(),
        "Opportunity summary built"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_notes::{estimate_impact, EstimatedImpact};
    use crate::guidance::{GuidanceStatus, RecommendationKind};
    use sendlens_core::config::GuidanceConfig;

    fn note(module: ModuleKey, weekly: f64) -> ModuleActionNote {
        ModuleActionNote {
            module,
            status: GuidanceStatus::Actionable,
            recommendation: RecommendationKind::None,
            title: module.label().to_string(),
            message: String::new(),
            sample: 10,
            estimated_impact: estimate_impact(
                Some(weekly),
                ImpactType::Lift,
                &GuidanceConfig::default(),
            ),
        }
    }

    fn annual(notes: &[ModuleActionNote], module: ModuleKey) -> f64 {
        notes
            .iter()
            .find(|n| n.module == module)
            .and_then(|n| n.estimated_impact)
            .map(|i: EstimatedImpact| i.annual)
            .unwrap_or(0.0)
    }

    #[test]
    fn test_campaign_blend_avoids_double_count() {
        let notes = vec![
            note(ModuleKey::SendFrequency, 400.0),
            note(ModuleKey::AudienceSize, 200.0),
            note(ModuleKey::CampaignGaps, 100.0),
            note(ModuleKey::FlowSteps, 300.0),
        ];
        let summary = summarize_notes(&notes, 1_000_000.0);
        let f = annual(&notes, ModuleKey::SendFrequency);
        let a = annual(&notes, ModuleKey::AudienceSize);
        let g = annual(&notes, ModuleKey::CampaignGaps);
        let campaigns = &summary.categories[0];
        assert_eq!(campaigns.category, OpportunityCategory::Campaigns);
        assert!((campaigns.amount_annual - (f + 0.5 * a + g)).abs() < 1e-6);
        let modules: Vec<ModuleKey> = campaigns.items.iter().map(|i| i.module).collect();
        assert_eq!(
            modules,
            vec![
                ModuleKey::SendFrequency,
                ModuleKey::AudienceSize,
                ModuleKey::CampaignGaps
            ]
        );
        let flows = &summary.categories[1];
        assert!(
            (flows.amount_annual - annual(&notes, ModuleKey::FlowSteps)).abs() < 1e-6
        );
        assert_eq!(flows.items.len(), 1);
        assert!(
            (summary.total_annual - (campaigns.amount_annual + flows.amount_annual)).abs() < 1e-6
        );
        assert_eq!(summary.breakdown[0].module, ModuleKey::SendFrequency);
    }

    #[test]
    fn test_suppressed_note_not_in_breakdown() {
        // $25 a week theoretical is $50 a month after scaling.
        let notes = vec![
            note(ModuleKey::CampaignDayOfWeek, 25.0),
            note(ModuleKey::ListHealth, 500.0),
        ];
        assert!(notes[0].estimated_impact.is_none());
        let summary = summarize_notes(&notes, 0.0);
        assert_eq!(summary.breakdown.len(), 1);
        assert_eq!(summary.breakdown[0].module, ModuleKey::ListHealth);
        assert_eq!(summary.percent_of_baseline, 0.0);
        assert!(
            (summary.breakdown[0].percent_of_overall - 100.0).abs() < 1e-9
        );
    }

    #[test]
    fn test_empty_categories_serialize_as_positive_zero_with_item_lists() {
        let notes = vec![note(ModuleKey::FlowSteps, 300.0)];
        let summary = summarize_notes(&notes, 50_000.0);
        let value = serde_json::to_value(&summary.categories[0]).unwrap();
        assert!(value["items"].as_array().is_some_and(|a| a.is_empty()));
        assert!(summary.categories[0].amount_annual.is_sign_positive());
        assert!(summary.categories[2].amount_annual.is_sign_positive());

        let flows = serde_json::to_value(&summary.categories[1]).unwrap();
        assert_eq!(flows["items"][0]["module"], "flow-steps");

        let empty = summarize_notes(&[], 0.0);
        assert!(empty.total_annual.is_sign_positive());
        assert_eq!(serde_json::to_string(&empty.total_annual).unwrap(), "0.0");
    }
}
