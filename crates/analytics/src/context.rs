//! The explicit context every analyzer receives.

use sendlens_core::{AnalyticsConfig, Dataset, DateRange, SendRecord};

/// Dataset, resolved range and thresholds for one analysis request.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub dataset: &'a Dataset,
    pub range: DateRange,
    pub config: &'a AnalyticsConfig,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(dataset: &'a Dataset, range: DateRange, config: &'a AnalyticsConfig) -> Self {
        Self {
            dataset,
            range,
            config,
        }
    }

    pub fn campaigns(&self) -> Vec<&'a SendRecord> {
        self.dataset.campaigns_in(&self.range)
    }

    pub fn flow_emails(&self) -> Vec<&'a SendRecord> {
        self.dataset.flow_emails_in(&self.range)
    }

    pub fn all_sends(&self) -> Vec<&'a SendRecord> {
        self.dataset.all_sends_in(&self.range)
    }

    /// Length of the range in weeks (fractional).
    pub fn weeks_in_range(&self) -> f64 {
        self.range.weeks()
    }

    /// The range ends on the dataset's most recent send date.
    pub fn ends_at_latest_data(&self) -> bool {
        match self.dataset.last_email_date() {
            Some(last) => self.range.end_date() >= last,
            None => false,
        }
    }
}
