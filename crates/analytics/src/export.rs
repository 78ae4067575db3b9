//! JSON export builder: packages summaries, comparisons, weekly series,
//! action notes and opportunities for report and LLM consumers.

use chrono::{DateTime, NaiveDate, Utc};
use sendlens_core::{AnalyticsResult, DateRange, SendRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action_notes::{build_action_notes, ModuleActionNote};
use crate::bucketing::{aggregate_periods, Granularity, MetricRates, MetricSums};
use crate::context::AnalysisContext;
use crate::metrics::{compare_periods, MetricComparison};
use crate::opportunities::{baseline_annual_revenue, summarize_notes, OpportunitySummary};
use crate::stats::safe_div;

const TOP_CAMPAIGNS: usize = 10;

fn capped(rate: f64) -> f64 {
    rate.clamp(0.0, 100.0)
}

/// Percent rates clamped to `[0, 100]`; money ratios left as is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRates {
    pub open_rate: f64,
    pub click_rate: f64,
    pub click_to_open_rate: f64,
    pub conversion_rate: f64,
    pub spam_rate: f64,
    pub bounce_rate: f64,
    pub unsubscribe_rate: f64,
    pub revenue_per_email: f64,
    pub avg_order_value: f64,
}

impl From<&MetricRates> for ExportRates {
    fn from(r: &MetricRates) -> Self {
        Self {
            open_rate: capped(r.open_rate),
            click_rate: capped(r.click_rate),
            click_to_open_rate: capped(r.click_to_open_rate),
            conversion_rate: capped(r.conversion_rate),
            spam_rate: capped(r.spam_rate),
            bounce_rate: capped(r.bounce_rate),
            unsubscribe_rate: capped(r.unsubscribe_rate),
            revenue_per_email: r.revenue_per_email,
            avg_order_value: r.avg_order_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelExport {
    pub sends: u64,
    pub emails_sent: u64,
    pub revenue: f64,
    pub total_orders: u64,
    pub rates: ExportRates,
    pub vs_previous_period: Vec<MetricComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyExportPoint {
    pub week_start: NaiveDate,
    pub is_complete: bool,
    pub campaigns: u64,
    pub campaign_emails: u64,
    pub campaign_revenue: f64,
    pub flow_emails: u64,
    pub flow_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignExport {
    pub name: String,
    pub sent_date: DateTime<Utc>,
    pub emails_sent: u64,
    pub revenue: f64,
    pub rates: ExportRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowExport {
    pub flow_name: String,
    pub emails_sent: u64,
    pub revenue: f64,
    pub rates: ExportRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsExport {
    pub range: DateRange,
    pub first_email_date: Option<NaiveDate>,
    pub last_email_date: Option<NaiveDate>,
    pub campaigns: ChannelExport,
    pub flows: ChannelExport,
    pub weekly: Vec<WeeklyExportPoint>,
    pub top_campaigns: Vec<CampaignExport>,
    pub flow_totals: Vec<FlowExport>,
    pub action_notes: Vec<ModuleActionNote>,
    pub opportunities: OpportunitySummary,
}

impl AnalyticsExport {
    pub fn to_json_pretty(&self) -> AnalyticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn channel(all: &[SendRecord], range: &DateRange) -> ChannelExport {
    let records: Vec<&SendRecord> = all.iter().collect();
    let comparison = compare_periods(&records, range);
    let sums = comparison.current.sums;
    ChannelExport {
        sends: sums.send_count,
        emails_sent: sums.emails_sent,
        revenue: sums.revenue,
        total_orders: sums.total_orders,
        rates: ExportRates::from(&comparison.current.rates),
        vs_previous_period: comparison.metrics,
    }
}

pub fn build_export(ctx: &AnalysisContext<'_>) -> AnalyticsExport {
    let dataset = ctx.dataset;
    let campaigns = ctx.campaigns();
    let flow_emails = ctx.flow_emails();

    let campaign_weeks =
        aggregate_periods(campaigns.iter().copied(), &ctx.range, Granularity::Weekly);
    let flow_weeks =
        aggregate_periods(flow_emails.iter().copied(), &ctx.range, Granularity::Weekly);
    let weekly = campaign_weeks
        .iter()
        .zip(&flow_weeks)
        .map(|(c, f)| WeeklyExportPoint {
            week_start: c.period_start,
            is_complete: c.is_complete,
            campaigns: c.sums.send_count,
            campaign_emails: c.sums.emails_sent,
            campaign_revenue: c.sums.revenue,
            flow_emails: f.sums.emails_sent,
            flow_revenue: f.sums.revenue,
        })
        .collect();

    let mut ranked = campaigns.clone();
    ranked.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    let top_campaigns = ranked
        .into_iter()
        .take(TOP_CAMPAIGNS)
        .map(|c| {
            let sums = MetricSums::from_records([c]);
            CampaignExport {
                name: c.name.clone(),
                sent_date: c.sent_date,
                emails_sent: c.emails_sent,
                revenue: c.revenue,
                rates: ExportRates::from(&sums.rates()),
            }
        })
        .collect();

    let flow_totals = dataset
        .flow_names()
        .into_iter()
        .filter_map(|name| {
            let sums = MetricSums::from_records(
                flow_emails
                    .iter()
                    .copied()
                    .filter(|r| r.flow_name.as_deref() == Some(name.as_str())),
            );
            (sums.send_count > 0).then(|| FlowExport {
                emails_sent: sums.emails_sent,
                revenue: sums.revenue,
                rates: ExportRates::from(&sums.rates()),
                flow_name: name,
            })
        })
        .collect();

    let action_notes = build_action_notes(ctx);
    let opportunities = summarize_notes(&action_notes, baseline_annual_revenue(ctx));

    let export = AnalyticsExport {
        range: ctx.range,
        first_email_date: dataset.first_email_date(),
        last_email_date: dataset.last_email_date(),
        campaigns: channel(dataset.campaigns(), &ctx.range),
        flows: channel(dataset.flow_emails(), &ctx.range),
        weekly,
        top_campaigns,
        flow_totals,
        action_notes,
        opportunities,
    };
    let revenue = export.campaigns.revenue + export.flows.revenue;
    info!(
        range = %ctx.range,
        campaigns = export.campaigns.sends,
        flow_emails = export.flows.sends,
        revenue,
        share_of_flows = safe_div(export.flows.revenue, revenue),
        "Export built"
    );
    export
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sendlens_core::{AnalyticsConfig, Dataset};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn campaign(day: i64, emails: u64, opens: u64, revenue: f64) -> SendRecord {
        let date = monday() + Duration::days(day);
        let mut r = SendRecord::campaign(
            format!("c{day}"),
            Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap()),
        );
        r.emails_sent = emails;
        r.unique_opens = opens;
        r.revenue = revenue;
        r
    }

    #[test]
    fn test_rates_are_capped_and_weeks_aligned() {
        // Opens above sends from a bad export row.
        let data = Dataset::new(
            vec![
                campaign(1, 100, 250, 50.0),
                campaign(9, 0, 0, 0.0),
                campaign(15, 1_000, 300, 500.0),
            ],
            vec![],
            vec![],
        );
        let config = AnalyticsConfig::default();
        let range = DateRange::from_dates(monday(), monday() + Duration::days(20));
        let ctx = AnalysisContext::new(&data, range, &config);
        let export = build_export(&ctx);

        assert_eq!(export.weekly.len(), 3);
        assert!(export.weekly.iter().all(|w| w.is_complete));
        assert_eq!(export.top_campaigns[0].name, "c15");
        let bad = export
            .top_campaigns
            .iter()
            .find(|c| c.name == "c1")
            .unwrap();
        assert_eq!(bad.rates.open_rate, 100.0);
        let empty = export
            .top_campaigns
            .iter()
            .find(|c| c.name == "c9")
            .unwrap();
        assert_eq!(empty.rates.open_rate, 0.0);
        assert_eq!(export.campaigns.sends, 3);
        assert!(export.campaigns.rates.open_rate <= 100.0);
        assert_eq!(export.action_notes.len(), 7);

        let json = export.to_json_pretty().unwrap();
        assert!(json.contains("\"top_campaigns\""));
    }
}
