//! Email performance analytics: time bucketing, deliverability zones,
//! campaign and flow guidance, action notes and opportunity sizing over an
//! immutable dataset.

pub mod action_notes;
pub mod audience_size;
pub mod bucketing;
pub mod context;
pub mod day_of_week;
pub mod deliverability;
pub mod export;
pub mod flow_steps;
pub mod format;
pub mod frequency;
pub mod gaps;
pub mod guidance;
pub mod list_health;
pub mod metrics;
pub mod opportunities;
pub mod segment;
pub mod send_volume;
pub mod stats;

pub use action_notes::{build_action_notes, EstimatedImpact, ModuleActionNote};
pub use context::AnalysisContext;
pub use deliverability::{risk_zone, RiskZone};
pub use export::{build_export, AnalyticsExport};
pub use guidance::{GuidanceResult, GuidanceStatus, ModuleKey};
pub use opportunities::{build_opportunity_summary, OpportunitySummary};
pub use segment::SegmentAnalyzer;
