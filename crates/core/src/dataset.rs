//! Immutable dataset context handed to every analyzer.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::date_range::{resolve_date_range, DateRange, DateRangeSelector};
use crate::error::AnalyticsResult;
use crate::types::{FlowSequenceInfo, FlowStepInfo, SendRecord, Subscriber};

/// Parsed campaigns, flow emails and subscribers plus derived indices.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    campaigns: Vec<SendRecord>,
    flow_emails: Vec<SendRecord>,
    subscribers: Vec<Subscriber>,
    first_email_date: Option<NaiveDate>,
    last_email_date: Option<NaiveDate>,
}

impl Dataset {
    /// Build a dataset, dropping records with non-finite or negative revenue.
    pub fn new(
        campaigns: Vec<SendRecord>,
        flow_emails: Vec<SendRecord>,
        subscribers: Vec<Subscriber>,
    ) -> Self {
        let campaigns = clean(campaigns);
        let flow_emails = clean(flow_emails);

        let dates = campaigns
            .iter()
            .chain(flow_emails.iter())
            .map(|r| r.sent_date.date_naive());
        let first = dates.clone().min();
        let last = dates.max();

        debug!(
            campaigns = campaigns.len(),
            flow_emails = flow_emails.len(),
            subscribers = subscribers.len(),
            "Dataset assembled"
        );

        Self {
            campaigns,
            flow_emails,
            subscribers,
            first_email_date: first,
            last_email_date: last,
        }
    }

    pub fn campaigns(&self) -> &[SendRecord] {
        &self.campaigns
    }

    pub fn flow_emails(&self) -> &[SendRecord] {
        &self.flow_emails
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn campaigns_in(&self, range: &DateRange) -> Vec<&SendRecord> {
        self.campaigns
            .iter()
            .filter(|r| range.contains(r.sent_date))
            .collect()
    }

    pub fn flow_emails_in(&self, range: &DateRange) -> Vec<&SendRecord> {
        self.flow_emails
            .iter()
            .filter(|r| range.contains(r.sent_date))
            .collect()
    }

    /// Campaigns and flow emails inside `range`.
    pub fn all_sends_in(&self, range: &DateRange) -> Vec<&SendRecord> {
        let mut sends = self.campaigns_in(range);
        sends.extend(self.flow_emails_in(range));
        sends
    }

    pub fn first_email_date(&self) -> Option<NaiveDate> {
        self.first_email_date
    }

    pub fn last_email_date(&self) -> Option<NaiveDate> {
        self.last_email_date
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty() && self.flow_emails.is_empty()
    }

    pub fn resolve_range(&self, selector: &DateRangeSelector) -> AnalyticsResult<DateRange> {
        let bounds = self.first_email_date.zip(self.last_email_date);
        resolve_date_range(selector, bounds)
    }

    /// Distinct flow names, sorted.
    pub fn flow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .flow_emails
            .iter()
            .filter_map(|r| r.flow_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Ordered steps of `flow_name`.
    ///
    /// Steps are ordered by `sequence_position` when present, then by the
    /// first date each message id was sent.
    pub fn flow_sequence_info(&self, flow_name: &str) -> Option<FlowSequenceInfo> {
        let mut by_message: BTreeMap<String, (Option<u32>, NaiveDate, String, u64)> =
            BTreeMap::new();

        for record in self
            .flow_emails
            .iter()
            .filter(|r| r.flow_name.as_deref() == Some(flow_name))
        {
            let key = record
                .flow_message_id
                .clone()
                .unwrap_or_else(|| record.name.clone());
            let date = record.sent_date.date_naive();
            let entry = by_message
                .entry(key)
                .or_insert((record.sequence_position, date, record.name.clone(), 0));
            entry.0 = entry.0.or(record.sequence_position);
            entry.1 = entry.1.min(date);
            entry.3 += record.emails_sent;
        }

        if by_message.is_empty() {
            return None;
        }

        let mut ordered: Vec<_> = by_message.into_iter().collect();
        ordered.sort_by(|(id_a, a), (id_b, b)| {
            let pos_a = a.0.unwrap_or(u32::MAX);
            let pos_b = b.0.unwrap_or(u32::MAX);
            pos_a
                .cmp(&pos_b)
                .then(a.1.cmp(&b.1))
                .then(id_a.cmp(id_b))
        });

        let steps = ordered
            .into_iter()
            .enumerate()
            .map(|(idx, (message_id, (_, _, label, emails_sent)))| FlowStepInfo {
                position: idx as u32 + 1,
                message_id,
                label,
                emails_sent,
            })
            .collect();

        Some(FlowSequenceInfo {
            flow_name: flow_name.to_string(),
            steps,
        })
    }
}

fn clean(mut records: Vec<SendRecord>) -> Vec<SendRecord> {
    let before = records.len();
    records.retain(SendRecord::is_valid);
    if records.len() < before {
        debug!(
            dropped = before - records.len(),
            "Dropped records with invalid revenue"
        );
    }
    records.sort_by_key(|r| r.sent_date);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_invalid_revenue_is_dropped() {
        let mut bad = SendRecord::campaign("bad", at(2024, 1, 2));
        bad.revenue = f64::NAN;
        let good = SendRecord::campaign("good", at(2024, 1, 3));
        let dataset = Dataset::new(vec![bad, good], vec![], vec![]);
        assert_eq!(dataset.campaigns().len(), 1);
        assert_eq!(dataset.campaigns()[0].name, "good");
    }

    #[test]
    fn test_bounds_cover_campaigns_and_flows() {
        let campaign = SendRecord::campaign("c", at(2024, 2, 10));
        let flow = SendRecord::flow_email("Welcome", "w1", at(2024, 3, 5));
        let dataset = Dataset::new(vec![campaign], vec![flow], vec![]);
        assert_eq!(
            dataset.first_email_date(),
            NaiveDate::from_ymd_opt(2024, 2, 10)
        );
        assert_eq!(
            dataset.last_email_date(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_flow_sequence_orders_by_position_then_date() {
        let mut second = SendRecord::flow_email("Welcome", "w2", at(2024, 1, 1));
        second.sequence_position = Some(2);
        second.emails_sent = 40;
        let mut first = SendRecord::flow_email("Welcome", "w1", at(2024, 1, 5));
        first.sequence_position = Some(1);
        first.emails_sent = 100;
        let unpositioned = SendRecord::flow_email("Welcome", "w3", at(2024, 1, 2));
        let other = SendRecord::flow_email("Sunset", "s1", at(2024, 1, 2));

        let dataset = Dataset::new(vec![], vec![second, first, unpositioned, other], vec![]);
        let info = dataset.flow_sequence_info("Welcome").unwrap();
        let ids: Vec<&str> = info.steps.iter().map(|s| s.message_id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
        assert_eq!(info.steps[0].emails_sent, 100);
        assert_eq!(
            dataset.flow_names(),
            vec!["Sunset".to_string(), "Welcome".to_string()]
        );
        assert!(dataset.flow_sequence_info("Missing").is_none());
    }
}
