use analytics_models::{
    AnalyticsEvent, DesignCount, PathCount, StatsSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sql_connection::SqlConnect;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// How many paths/designs a snapshot ranks
pub const TOP_LIMIT: i64 = 5;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence seam for validated analytics events. The HTTP layer
/// only sees this trait so tests can substitute the in-memory store.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(
        &self, event: &AnalyticsEvent,
    ) -> Result<Uuid, EventStoreError>;

    async fn stats_snapshot(
        &self, now: DateTime<Utc>,
    ) -> Result<StatsSnapshot, EventStoreError>;
}

pub struct PostgresEventStore {
    db: SqlConnect,
}

impl PostgresEventStore {
    pub fn new(db: SqlConnect) -> Self { Self { db } }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip_all)]
    async fn insert_event(
        &self, event: &AnalyticsEvent,
    ) -> Result<Uuid, EventStoreError> {
        let client = self
            .db
            .get_client()
            .await
            .map_err(|e| EventStoreError::Connection(e.to_string()))?;

        let id = Uuid::now_v7();
        let category = event.category().as_str();

        // The category tag lives in its own column; the remaining
        // category-specific fields go to jsonb.
        let mut details = serde_json::to_value(&event.details)?;
        if let Some(obj) = details.as_object_mut() {
            obj.remove("category");
        }
        let device = match &event.device {
            Some(device) => Some(serde_json::to_value(device)?),
            None => None,
        };

        client
            .execute(
                "INSERT INTO analytics_events \
                 (id, category, session_id, user_id, path, referrer, \
                  occurred_at, device, details) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &id,
                    &category,
                    &event.session_id,
                    &event.user_id,
                    &event.path,
                    &event.referrer,
                    &event.timestamp,
                    &device,
                    &details,
                ],
            )
            .await?;

        Ok(id)
    }

    #[instrument(skip_all)]
    async fn stats_snapshot(
        &self, now: DateTime<Utc>,
    ) -> Result<StatsSnapshot, EventStoreError> {
        let client = self
            .db
            .get_client()
            .await
            .map_err(|e| EventStoreError::Connection(e.to_string()))?;

        let hour_ago = now - Duration::hours(1);
        let half_hour_ago = now - Duration::minutes(30);
        let day_ago = now - Duration::days(1);

        let total_events: i64 = client
            .query_one("SELECT COUNT(*) FROM analytics_events", &[])
            .await?
            .get(0);

        let events_last_hour: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM analytics_events WHERE occurred_at \
                 >= $1",
                &[&hour_ago],
            )
            .await?
            .get(0);

        let active_sessions: i64 = client
            .query_one(
                "SELECT COUNT(DISTINCT session_id) FROM analytics_events \
                 WHERE occurred_at >= $1",
                &[&half_hour_ago],
            )
            .await?
            .get(0);

        let top_paths = client
            .query(
                "SELECT path, COUNT(*) AS hits FROM analytics_events \
                 WHERE occurred_at >= $1 \
                 GROUP BY path ORDER BY hits DESC, path ASC LIMIT $2",
                &[&day_ago, &TOP_LIMIT],
            )
            .await?
            .iter()
            .map(|row| {
                PathCount {
                    path: row.get("path"),
                    count: row.get("hits"),
                }
            })
            .collect();

        let top_designs = client
            .query(
                "SELECT details->>'design_id' AS design_id, COUNT(*) AS \
                 hits FROM analytics_events \
                 WHERE category = 'gallery' AND occurred_at >= $1 \
                 GROUP BY design_id ORDER BY hits DESC, design_id ASC \
                 LIMIT $2",
                &[&day_ago, &TOP_LIMIT],
            )
            .await?
            .iter()
            .map(|row| {
                DesignCount {
                    design_id: row.get("design_id"),
                    count: row.get("hits"),
                }
            })
            .collect();

        Ok(StatsSnapshot {
            total_events,
            events_last_hour,
            active_sessions,
            top_paths,
            top_designs,
            generated_at: now,
        })
    }
}
