use std::sync::{Arc, atomic::AtomicU64};

use analytics_dao::{EventStore, PostgresEventStore};
use analytics_models::{StatsSnapshot, validate_event};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::Utc;
use common_errors::AppError;
use event_bus::EventBus;
use serde::Serialize;
use sql_connection::SqlConnect;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{live::LiveEvent, stream::event_stream};

/// Capacity of each stream subscriber's live-event channel
const LIVE_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AnalyticsServices {
    pub store: Arc<dyn EventStore>,
    pub bus: EventBus<LiveEvent>,
    pub active_streams: Arc<AtomicU64>,
}

impl AnalyticsServices {
    pub fn new(db: SqlConnect) -> Self {
        Self::with_store(Arc::new(PostgresEventStore::new(db)))
    }

    pub fn with_store(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            bus: EventBus::new(LIVE_CHANNEL_CAPACITY),
            active_streams: Arc::new(AtomicU64::new(0)),
        }
    }
}

pub struct AnalyticsHandlers;

impl AnalyticsHandlers {
    pub fn routes() -> Router<AnalyticsServices> {
        Router::new()
            .route("/events", post(ingest_event))
            .route("/stats", get(get_stats))
            .route("/stream", get(event_stream))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub id: Uuid,
}

#[utoipa::path(
    post,
    path = "/api/analytics/events",
    responses(
        (status = 202, description = "Event accepted", body = IngestResponse),
        (status = 422, description = "Event failed schema validation"),
        (status = 500, description = "Internal server error")
    ),
    tag = "analytics"
)]
#[instrument(skip_all)]
pub async fn ingest_event(
    State(services): State<AnalyticsServices>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let event = validate_event(&payload).map_err(|err| {
        AppError::unprocessable_entity(
            "EVENT_VALIDATION_FAILED",
            "event failed schema validation",
        )
        .with_details(
            serde_json::to_value(&err.violations).unwrap_or_default(),
        )
    })?;

    let id = services
        .store
        .insert_event(&event)
        .await
        .map_err(AppError::from_error)?;

    services.bus.publish(LiveEvent::new_event(id, &event)).await;
    if let Some(highlight) = LiveEvent::highlight(id, &event) {
        services.bus.publish(highlight).await;
    }

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { id })))
}

#[utoipa::path(
    get,
    path = "/api/analytics/stats",
    responses(
        (status = 200, description = "Current stat totals", body = StatsSnapshot),
        (status = 500, description = "Internal server error")
    ),
    tag = "analytics"
)]
#[instrument(skip_all)]
pub async fn get_stats(
    State(services): State<AnalyticsServices>,
) -> Result<Json<StatsSnapshot>, AppError> {
    let snapshot = services
        .store
        .stats_snapshot(Utc::now())
        .await
        .map_err(AppError::from_error)?;
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use analytics_dao::InMemoryEventStore;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn setup_test_app() -> (Arc<InMemoryEventStore>, Router) {
        let store = Arc::new(InMemoryEventStore::new());
        let services = AnalyticsServices::with_store(store.clone());
        let app = AnalyticsHandlers::routes().with_state(services);
        (store, app)
    }

    fn post_json(payload: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_valid_event() {
        let (store, app) = setup_test_app();

        let payload = json!({
            "timestamp": "2026-08-06T10:30:00Z",
            "session_id": "sess-1",
            "path": "/book",
            "category": "booking",
            "action": "start"
        });

        let response = app.oneshot(post_json(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let response_json: serde_json::Value =
            serde_json::from_slice(&body).unwrap();
        assert!(response_json["id"].is_string());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_invalid_event_enumerates_violations() {
        let (store, app) = setup_test_app();

        let payload = json!({
            "session_id": "sess-1",
            "category": "booking",
            "action": "teleport"
        });

        let response = app.oneshot(post_json(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let response_json: serde_json::Value =
            serde_json::from_slice(&body).unwrap();

        let details = response_json["error"]["details"].as_array().unwrap();
        let fields: Vec<_> = details
            .iter()
            .map(|v| v["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"timestamp"));
        assert!(fields.contains(&"path"));
        assert!(fields.contains(&"action"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_stats_endpoint() {
        let (_store, app) = setup_test_app();

        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": "sess-2",
            "path": "/gallery",
            "category": "gallery",
            "action": "view",
            "design_id": "koi-12"
        });
        let _ = app
            .clone()
            .oneshot(post_json(&payload))
            .await
            .unwrap();

        let request = Request::builder()
            .method(Method::GET)
            .uri("/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let response_json: serde_json::Value =
            serde_json::from_slice(&body).unwrap();
        assert_eq!(response_json["total_events"], 1);
        assert_eq!(
            response_json["top_designs"][0]["design_id"],
            "koi-12"
        );
    }
}
