//! Shared types for the email analytics engine: send records, the immutable
//! dataset context, date-range resolution, and centralized thresholds.

pub mod config;
pub mod dataset;
pub mod date_range;
pub mod error;
pub mod types;

pub use config::AnalyticsConfig;
pub use dataset::Dataset;
pub use date_range::{DateRange, DateRangeSelector, RangePreset};
pub use error::{AnalyticsError, AnalyticsResult};
pub use types::{SendKind, SendRecord, Subscriber};
