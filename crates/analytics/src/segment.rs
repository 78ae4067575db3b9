//! Common shape of the campaign segmentation analyzers: bucket campaigns by
//! one dimension, then pick a best bucket under safety and volume gates.

use serde::Serialize;

use crate::context::AnalysisContext;
use crate::guidance::{GuidanceResult, ModuleKey};

pub trait SegmentAnalyzer {
    type Bucket: Serialize;

    fn module(&self) -> ModuleKey;

    /// Non-empty buckets for the context's range.
    fn buckets(&self, ctx: &AnalysisContext<'_>) -> Vec<Self::Bucket>;

    fn guidance(&self, ctx: &AnalysisContext<'_>) -> GuidanceResult;
}
