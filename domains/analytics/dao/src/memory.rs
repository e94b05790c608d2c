use std::collections::{HashMap, HashSet};

use analytics_models::{
    AnalyticsEvent, DesignCount, EventDetails, PathCount, StatsSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::{EventStore, EventStoreError, TOP_LIMIT};

/// Process-local store for tests and standalone runs. Snapshot
/// semantics mirror the Postgres queries.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<(Uuid, AnalyticsEvent)>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self { Self::default() }

    pub async fn len(&self) -> usize { self.events.read().await.len() }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_event(
        &self, event: &AnalyticsEvent,
    ) -> Result<Uuid, EventStoreError> {
        let id = Uuid::now_v7();
        self.events.write().await.push((id, event.clone()));
        Ok(id)
    }

    async fn stats_snapshot(
        &self, now: DateTime<Utc>,
    ) -> Result<StatsSnapshot, EventStoreError> {
        let events = self.events.read().await;

        let hour_ago = now - Duration::hours(1);
        let half_hour_ago = now - Duration::minutes(30);
        let day_ago = now - Duration::days(1);

        let total_events = events.len() as i64;
        let events_last_hour = events
            .iter()
            .filter(|(_, e)| e.timestamp >= hour_ago)
            .count() as i64;
        let active_sessions = events
            .iter()
            .filter(|(_, e)| e.timestamp >= half_hour_ago)
            .map(|(_, e)| e.session_id.as_str())
            .collect::<HashSet<_>>()
            .len() as i64;

        let mut path_counts: HashMap<&str, i64> = HashMap::new();
        let mut design_counts: HashMap<&str, i64> = HashMap::new();
        for (_, event) in events.iter() {
            if event.timestamp < day_ago {
                continue;
            }
            *path_counts.entry(event.path.as_str()).or_default() += 1;
            if let EventDetails::Gallery { design_id, .. } = &event.details {
                *design_counts.entry(design_id.as_str()).or_default() += 1;
            }
        }

        Ok(StatsSnapshot {
            total_events,
            events_last_hour,
            active_sessions,
            top_paths: ranked(path_counts)
                .into_iter()
                .map(|(path, count)| {
                    PathCount {
                        path: path.to_string(),
                        count,
                    }
                })
                .collect(),
            top_designs: ranked(design_counts)
                .into_iter()
                .map(|(design_id, count)| {
                    DesignCount {
                        design_id: design_id.to_string(),
                        count,
                    }
                })
                .collect(),
            generated_at: now,
        })
    }
}

/// Count desc, key asc, truncated to the snapshot limit — the same
/// ordering the SQL uses.
fn ranked(counts: HashMap<&str, i64>) -> Vec<(&str, i64)> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.truncate(TOP_LIMIT as usize);
    entries
}
