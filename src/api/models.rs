use std::collections::BTreeMap;

use serde::Serialize;

use crate::dispatch::DispatcherStats;
use crate::media::ToolReport;
use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct SelectionSummary {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub components: BTreeMap<String, String>,
    pub dispatcher: DispatcherStats,
    pub selections: SelectionSummary,
    pub users: Option<usize>,
    pub metrics: MetricsSnapshot,
    pub tools: ToolReport,
}
