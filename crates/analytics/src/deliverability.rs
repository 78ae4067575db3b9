//! Deliverability risk zones: maps spam and bounce rates to green/yellow/red
//! and to the 0-20 point deliverability pillar.

use sendlens_core::config::DeliverabilityConfig;
use sendlens_core::SendRecord;
use serde::{Deserialize, Serialize};

use crate::bucketing::{pct, MetricSums};
use crate::stats::safe_div;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskZone {
    Green,
    Yellow,
    Red,
}

/// Red if either rate is over its red limit, yellow if either reaches its
/// green limit, otherwise green. Rates are percentages.
pub fn risk_zone(spam_rate: f64, bounce_rate: f64, limits: &DeliverabilityConfig) -> RiskZone {
    if spam_rate > limits.spam_red_limit || bounce_rate > limits.bounce_red_limit {
        RiskZone::Red
    } else if spam_rate >= limits.spam_green_limit || bounce_rate >= limits.bounce_green_limit {
        RiskZone::Yellow
    } else {
        RiskZone::Green
    }
}

pub fn zone_points(zone: RiskZone) -> f64 {
    match zone {
        RiskZone::Green => 20.0,
        RiskZone::Yellow => 12.0,
        RiskZone::Red => 0.0,
    }
}

/// Zone points, softened for segments carrying a tiny share of account volume.
///
/// Below 15 points and under `low_volume_share` of sends, points recover
/// toward 20 by up to `low_volume_max_recovery` of the gap, scaled by how far
/// under the share threshold the segment sits.
pub fn deliverability_points(
    zone: RiskZone,
    send_share: Option<f64>,
    limits: &DeliverabilityConfig,
) -> f64 {
    let base = zone_points(zone);
    match send_share {
        Some(share) if base < 15.0 && share >= 0.0 && share < limits.low_volume_share => {
            let smallness = 1.0 - safe_div(share, limits.low_volume_share);
            let gap = 20.0 - base;
            base + gap * limits.low_volume_max_recovery * smallness
        }
        _ => base,
    }
}

/// Account-wide totals used to judge whether a single step's risk matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_sends: u64,
    pub account_spam_complaints: u64,
    pub account_bounces: u64,
    pub account_spam_rate: f64,
    pub account_bounce_rate: f64,
}

impl AccountContext {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a SendRecord>) -> Self {
        let sums = MetricSums::from_records(records);
        Self {
            account_sends: sums.emails_sent,
            account_spam_complaints: sums.spam_complaints,
            account_bounces: sums.bounces,
            account_spam_rate: pct(sums.spam_complaints as f64, sums.emails_sent as f64),
            account_bounce_rate: pct(sums.bounces as f64, sums.emails_sent as f64),
        }
    }

    pub fn send_share(&self, sends: u64) -> f64 {
        safe_div(sends as f64, self.account_sends as f64)
    }
}

/// Volume and complaint counts of the segment being judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentVolume {
    pub sends: u64,
    pub spam_complaints: u64,
    pub bounces: u64,
}

impl From<&MetricSums> for SegmentVolume {
    fn from(sums: &MetricSums) -> Self {
        Self {
            sends: sums.emails_sent,
            spam_complaints: sums.spam_complaints,
            bounces: sums.bounces,
        }
    }
}

/// Risk zone that only keeps a red verdict when it is credible for the account.
///
/// A raw red is kept when the rates exceed the severe multiple of the red
/// limits, or when the segment is statistically significant and either the
/// account itself is outside its green limits or the segment produces a
/// disproportionate share of the account's complaints or bounces. Any other
/// red is reported as yellow.
pub fn zone_with_context(
    segment: SegmentVolume,
    account: &AccountContext,
    limits: &DeliverabilityConfig,
) -> RiskZone {
    let spam_rate = pct(segment.spam_complaints as f64, segment.sends as f64);
    let bounce_rate = pct(segment.bounces as f64, segment.sends as f64);
    let raw = risk_zone(spam_rate, bounce_rate, limits);
    if raw != RiskZone::Red {
        return raw;
    }

    let severe = spam_rate > limits.spam_red_limit * limits.severe_multiplier
        || bounce_rate > limits.bounce_red_limit * limits.severe_multiplier;
    if severe {
        return RiskZone::Red;
    }

    let significant = segment.sends >= limits.significant_sends;
    let account_unhealthy = account.account_spam_rate >= limits.spam_green_limit
        || account.account_bounce_rate >= limits.bounce_green_limit;

    let send_share = account.send_share(segment.sends);
    let spam_share = safe_div(
        segment.spam_complaints as f64,
        account.account_spam_complaints as f64,
    );
    let bounce_share = safe_div(segment.bounces as f64, account.account_bounces as f64);
    let disproportionate = spam_share > limits.disproportion_multiplier * send_share
        || bounce_share > limits.disproportion_multiplier * send_share;

    if significant && (account_unhealthy || disproportionate) {
        RiskZone::Red
    } else {
        RiskZone::Yellow
    }
}

/// Zone plus points for a segment, as shown next to each analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliverabilityAssessment {
    pub zone: RiskZone,
    pub points: f64,
    pub spam_rate: f64,
    pub bounce_rate: f64,
    pub send_share: Option<f64>,
}

pub fn assess(
    segment: SegmentVolume,
    account: Option<&AccountContext>,
    limits: &DeliverabilityConfig,
) -> DeliverabilityAssessment {
    let spam_rate = pct(segment.spam_complaints as f64, segment.sends as f64);
    let bounce_rate = pct(segment.bounces as f64, segment.sends as f64);
    let (zone, send_share) = match account {
        Some(ctx) => (
            zone_with_context(segment, ctx, limits),
            Some(ctx.send_share(segment.sends)),
        ),
        None => (risk_zone(spam_rate, bounce_rate, limits), None),
    };
    DeliverabilityAssessment {
        zone,
        points: deliverability_points(zone, send_share, limits),
        spam_rate,
        bounce_rate,
        send_share,
    }
}
