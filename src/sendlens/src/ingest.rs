//! CSV ingestion for campaign, flow and subscriber exports.
//!
//! Column names accept both snake_case and the ESP's export headers. A row
//! with an unreadable date or number is skipped and counted; it never aborts
//! the load.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sendlens_core::{AnalyticsError, AnalyticsResult, SendRecord, Subscriber};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub rows: usize,
    pub loaded: usize,
    pub skipped: usize,
}

// ─── Row Shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CampaignRow {
    #[serde(default, alias = "Campaign Name")]
    name: Option<String>,
    #[serde(default, alias = "Send Time", alias = "sent_date")]
    send_time: Option<String>,
    #[serde(default, alias = "Campaign Status")]
    status: Option<String>,
    #[serde(default, alias = "Total Recipients")]
    emails_sent: Option<String>,
    #[serde(default, alias = "Revenue")]
    revenue: Option<String>,
    #[serde(default, alias = "Unique Placed Order")]
    total_orders: Option<String>,
    #[serde(default, alias = "Unique Opens")]
    unique_opens: Option<String>,
    #[serde(default, alias = "Unique Clicks")]
    unique_clicks: Option<String>,
    #[serde(default, alias = "Unsubscribes")]
    unsubscribes: Option<String>,
    #[serde(default, alias = "Spam Complaints")]
    spam_complaints: Option<String>,
    #[serde(default, alias = "Bounces")]
    bounces: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlowRow {
    #[serde(default, alias = "Flow Name")]
    flow_name: Option<String>,
    #[serde(default, alias = "Flow Message ID")]
    flow_message_id: Option<String>,
    #[serde(default, alias = "Flow Message Name")]
    message_name: Option<String>,
    #[serde(default, alias = "Day", alias = "sent_date")]
    day: Option<String>,
    #[serde(default, alias = "Sequence Position")]
    sequence_position: Option<String>,
    #[serde(default, alias = "Status")]
    status: Option<String>,
    #[serde(default, alias = "Total Recipients")]
    emails_sent: Option<String>,
    #[serde(default, alias = "Revenue")]
    revenue: Option<String>,
    #[serde(default, alias = "Unique Placed Order")]
    total_orders: Option<String>,
    #[serde(default, alias = "Unique Opens")]
    unique_opens: Option<String>,
    #[serde(default, alias = "Unique Clicks")]
    unique_clicks: Option<String>,
    #[serde(default, alias = "Unsubscribes")]
    unsubscribes: Option<String>,
    #[serde(default, alias = "Spam Complaints")]
    spam_complaints: Option<String>,
    #[serde(default, alias = "Bounces")]
    bounces: Option<String>,
}

/// Count columns shared by campaign and flow rows.
struct CountColumns<'a> {
    emails_sent: &'a Option<String>,
    revenue: &'a Option<String>,
    total_orders: &'a Option<String>,
    unique_opens: &'a Option<String>,
    unique_clicks: &'a Option<String>,
    unsubscribes: &'a Option<String>,
    spam_complaints: &'a Option<String>,
    bounces: &'a Option<String>,
}

macro_rules! count_columns {
    ($row:expr) => {
        CountColumns {
            emails_sent: &$row.emails_sent,
            revenue: &$row.revenue,
            total_orders: &$row.total_orders,
            unique_opens: &$row.unique_opens,
            unique_clicks: &$row.unique_clicks,
            unsubscribes: &$row.unsubscribes,
            spam_complaints: &$row.spam_complaints,
            bounces: &$row.bounces,
        }
    };
}

#[derive(Debug, Deserialize)]
struct SubscriberRow {
    #[serde(default, alias = "Klaviyo ID", alias = "Profile ID")]
    id: Option<String>,
    #[serde(default, alias = "Email")]
    email: Option<String>,
    #[serde(default, alias = "Profile Created On", alias = "Created")]
    created_at: Option<String>,
    #[serde(default, alias = "Last Open")]
    last_open: Option<String>,
    #[serde(default, alias = "Last Click")]
    last_click: Option<String>,
    #[serde(default, alias = "Email Marketing Consent")]
    email_consent: Option<String>,
    #[serde(default, alias = "Historic Customer Lifetime Value")]
    lifetime_revenue: Option<String>,
}

// ─── Field Parsing ──────────────────────────────────────────────────────────

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `$1,234.50`, `12%` and plain numbers; blank is zero, garbage is `None`.
fn parse_number(value: &Option<String>) -> Option<f64> {
    let Some(raw) = present(value) else {
        return Some(0.0);
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(value: &Option<String>) -> Option<u64> {
    parse_number(value)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64)
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a timestamp in UTC; bare dates land at midnight.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `Some(None)` for a blank cell, `None` for an unreadable one.
fn optional_datetime(value: &Option<String>) -> Option<Option<DateTime<Utc>>> {
    match present(value) {
        None => Some(None),
        Some(raw) => parse_datetime(raw).map(Some),
    }
}

fn parse_consent(value: &Option<String>) -> bool {
    present(value).is_some_and(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "subscribed"
        )
    })
}

fn fill_counts(record: &mut SendRecord, counts: CountColumns<'_>) -> Option<()> {
    record.emails_sent = parse_count(counts.emails_sent)?;
    record.revenue = parse_number(counts.revenue)?;
    record.total_orders = parse_count(counts.total_orders)?;
    record.unique_opens = parse_count(counts.unique_opens)?;
    record.unique_clicks = parse_count(counts.unique_clicks)?;
    record.unsubscribes_count = parse_count(counts.unsubscribes)?;
    record.spam_complaints_count = parse_count(counts.spam_complaints)?;
    record.bounces_count = parse_count(counts.bounces)?;
    Some(())
}

// ─── Row Conversion ─────────────────────────────────────────────────────────

fn campaign_from(row: CampaignRow) -> Option<SendRecord> {
    let sent = parse_datetime(present(&row.send_time)?)?;
    let name = present(&row.name)
        .unwrap_or("Untitled campaign")
        .to_string();
    let mut record = SendRecord::campaign(name, sent);
    fill_counts(&mut record, count_columns!(row))?;
    record.status = present(&row.status).map(str::to_string);
    Some(record)
}

fn flow_email_from(row: FlowRow) -> Option<SendRecord> {
    let flow = present(&row.flow_name)?.to_string();
    let sent = parse_datetime(present(&row.day)?)?;
    let message_id = present(&row.flow_message_id)
        .or_else(|| present(&row.message_name))?
        .to_string();
    let mut record = SendRecord::flow_email(flow, message_id, sent);
    if let Some(label) = present(&row.message_name) {
        record.name = label.to_string();
    }
    record.sequence_position = match present(&row.sequence_position) {
        Some(raw) => Some(raw.parse::<u32>().ok()?),
        None => None,
    };
    record.status = present(&row.status).map(str::to_string);
    fill_counts(&mut record, count_columns!(row))?;
    Some(record)
}

fn subscriber_from(row: SubscriberRow) -> Option<Subscriber> {
    let id = present(&row.id)
        .or_else(|| present(&row.email))?
        .to_string();
    Some(Subscriber {
        id,
        email: present(&row.email).map(str::to_string),
        created_at: optional_datetime(&row.created_at)?,
        last_open: optional_datetime(&row.last_open)?,
        last_click: optional_datetime(&row.last_click)?,
        email_consent: parse_consent(&row.email_consent),
        lifetime_revenue: parse_number(&row.lifetime_revenue)?,
    })
}

// ─── Readers ────────────────────────────────────────────────────────────────

fn read_rows<R, Row, T>(
    source: R,
    kind: &str,
    convert: impl Fn(Row) -> Option<T>,
) -> AnalyticsResult<(Vec<T>, IngestReport)>
where
    R: Read,
    Row: DeserializeOwned,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);
    let mut report = IngestReport::default();
    let mut out = Vec::new();

    for (idx, result) in reader.deserialize::<Row>().enumerate() {
        report.rows += 1;
        // Header is line 1.
        let line = idx + 2;
        match result.map(&convert) {
            Ok(Some(item)) => {
                out.push(item);
                report.loaded += 1;
            }
            Ok(None) => {
                report.skipped += 1;
                warn!(
                    kind,
                    line,
                    "Skipping row with a missing or unreadable value"
                );
            }
            Err(e) => {
                report.skipped += 1;
                warn!(kind, line, error = %e, "Skipping malformed row");
            }
        }
    }

    info!(
        kind,
        rows = report.rows,
        loaded = report.loaded,
        skipped = report.skipped,
        "CSV loaded"
    );
    Ok((out, report))
}

fn open(path: &Path) -> AnalyticsResult<std::fs::File> {
    std::fs::File::open(path).map_err(|e| {
        AnalyticsError::Ingest(format!("cannot open {}: {e}", path.display()))
    })
}

pub fn read_campaigns<R: Read>(source: R) -> AnalyticsResult<(Vec<SendRecord>, IngestReport)> {
    read_rows(source, "campaigns", campaign_from)
}

pub fn read_flow_emails<R: Read>(source: R) -> AnalyticsResult<(Vec<SendRecord>, IngestReport)> {
    read_rows(source, "flows", flow_email_from)
}

pub fn read_subscribers<R: Read>(source: R) -> AnalyticsResult<(Vec<Subscriber>, IngestReport)> {
    read_rows(source, "subscribers", subscriber_from)
}

pub fn load_campaigns(path: &Path) -> AnalyticsResult<Vec<SendRecord>> {
    Ok(read_campaigns(open(path)?)?.0)
}

pub fn load_flow_emails(path: &Path) -> AnalyticsResult<Vec<SendRecord>> {
    Ok(read_flow_emails(open(path)?)?.0)
}

pub fn load_subscribers(path: &Path) -> AnalyticsResult<Vec<Subscriber>> {
    Ok(read_subscribers(open(path)?)?.0)
}
