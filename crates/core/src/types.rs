use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a send record came from a one-off campaign or an automated flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SendKind {
    Campaign,
    Flow,
}

/// One campaign send or one flow email's reporting row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendRecord {
    pub kind: SendKind,
    /// Campaign name or flow email subject, used only for labelling.
    pub name: String,
    pub sent_date: DateTime<Utc>,
    pub emails_sent: u64,
    pub revenue: f64,
    pub total_orders: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub unsubscribes_count: u64,
    pub spam_complaints_count: u64,
    pub bounces_count: u64,
    #[serde(default)]
    pub flow_name: Option<String>,
    #[serde(default)]
    pub flow_message_id: Option<String>,
    #[serde(default)]
    pub sequence_position: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SendRecord {
    /// A zeroed campaign record sent at `sent_date`.
    pub fn campaign(name: impl Into<String>, sent_date: DateTime<Utc>) -> Self {
        Self::empty(SendKind::Campaign, name.into(), sent_date)
    }

    /// A zeroed flow email record belonging to `flow_name`.
    pub fn flow_email(
        flow_name: impl Into<String>,
        message_id: impl Into<String>,
        sent_date: DateTime<Utc>,
    ) -> Self {
        let message_id = message_id.into();
        let mut record = Self::empty(SendKind::Flow, message_id.clone(), sent_date);
        record.flow_name = Some(flow_name.into());
        record.flow_message_id = Some(message_id);
        record
    }

    fn empty(kind: SendKind, name: String, sent_date: DateTime<Utc>) -> Self {
        Self {
            kind,
            name,
            sent_date,
            emails_sent: 0,
            revenue: 0.0,
            total_orders: 0,
            unique_opens: 0,
            unique_clicks: 0,
            unsubscribes_count: 0,
            spam_complaints_count: 0,
            bounces_count: 0,
            flow_name: None,
            flow_message_id: None,
            sequence_position: None,
            status: None,
        }
    }

    /// Revenue is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.revenue.is_finite() && self.revenue >= 0.0
    }
}

/// A subscriber profile from the list export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscriber {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_open: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_click: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_consent: bool,
    #[serde(default)]
    pub lifetime_revenue: f64,
}

impl Subscriber {
    /// Most recent open or click, whichever is later.
    pub fn last_engaged(&self) -> Option<DateTime<Utc>> {
        match (self.last_open, self.last_click) {
            (Some(open), Some(click)) => Some(open.max(click)),
            (open, click) => open.or(click),
        }
    }
}

/// Ordered steps of one flow as seen in the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSequenceInfo {
    pub flow_name: String,
    pub steps: Vec<FlowStepInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStepInfo {
    /// 1-based position inside the flow.
    pub position: u32,
    pub message_id: String,
    pub label: String,
    pub emails_sent: u64,
}
