use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Point-in-time totals pushed to stream clients and served by the
/// stats endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatsSnapshot {
    pub total_events: i64,
    pub events_last_hour: i64,
    /// Distinct session ids seen in the last 30 minutes
    pub active_sessions: i64,
    pub top_paths: Vec<PathCount>,
    pub top_designs: Vec<DesignCount>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DesignCount {
    pub design_id: String,
    pub count: i64,
}
