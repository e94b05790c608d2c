use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use analytics_dao::EventStore;
use analytics_models::DesignCount;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use chrono::Utc;
use event_bus::EventBus;
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{handlers::AnalyticsServices, live::LiveEvent};

/// Cadence of the stats_update/heartbeat pair
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// The fixed enumeration of wire event names
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamEventName {
    Connected,
    StatsUpdate,
    Heartbeat,
    NewEvent,
    Conversion,
    ErrorOccurred,
    TopDesignsChange,
    UserJoined,
    UserLeft,
}

impl StreamEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::StatsUpdate => "stats_update",
            Self::Heartbeat => "heartbeat",
            Self::NewEvent => "new_event",
            Self::Conversion => "conversion",
            Self::ErrorOccurred => "error_occurred",
            Self::TopDesignsChange => "top_designs_change",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }
}

/// One named frame before SSE encoding; kept separate from
/// `axum::response::sse::Event` so the stream logic stays inspectable
/// in tests.
#[derive(Clone, Debug)]
pub struct StreamFrame {
    pub name: StreamEventName,
    pub data: serde_json::Value,
}

impl StreamFrame {
    fn new<T: Serialize>(name: StreamEventName, payload: &T) -> Self {
        let data = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!(event = name.as_str(), error = %e, "frame payload failed to serialize");
            json!({})
        });
        Self { name, data }
    }

    pub fn into_sse_event(self) -> Event {
        Event::default()
            .event(self.name.as_str())
            .data(self.data.to_string())
    }
}

/// Owns the per-connection cleanup: gauge decrement and the
/// `user_left` notification. Lives inside the connection's stream, so
/// client disconnect drops it together with the interval timer.
struct StreamGuard {
    connection_id: Uuid,
    bus: EventBus<LiveEvent>,
    active_streams: Arc<AtomicU64>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
        debug!(
            connection_id = %self.connection_id,
            "stream client disconnected"
        );

        let bus = self.bus.clone();
        let connection_id = self.connection_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                bus.publish(LiveEvent::UserLeft { connection_id }).await;
            });
        }
    }
}

struct TickState {
    store: Arc<dyn EventStore>,
    interval: tokio::time::Interval,
    last_top_designs: Option<Vec<DesignCount>>,
    _guard: StreamGuard,
}

/// Builds the per-connection frame sequence: one `connected`, then on
/// every interval tick a `stats_update` followed by a `heartbeat`,
/// with live bus events interleaved as they arrive.
fn frames(
    store: Arc<dyn EventStore>, live_rx: flume::Receiver<LiveEvent>,
    connection_id: Uuid, guard: StreamGuard,
) -> impl Stream<Item = StreamFrame> + Send {
    let connected = stream::once(async move {
        StreamFrame::new(
            StreamEventName::Connected,
            &json!({
                "connection_id": connection_id,
                "server_time": Utc::now(),
            }),
        )
    });

    let state = TickState {
        store,
        interval: tokio::time::interval_at(
            tokio::time::Instant::now() + STATS_INTERVAL,
            STATS_INTERVAL,
        ),
        last_top_designs: None,
        _guard: guard,
    };

    let ticks = stream::unfold(state, |mut state| {
        async move {
            state.interval.tick().await;

            let mut frames = Vec::new();
            match state.store.stats_snapshot(Utc::now()).await {
                Ok(snapshot) => {
                    let top_designs = snapshot.top_designs.clone();
                    frames.push(StreamFrame::new(
                        StreamEventName::StatsUpdate,
                        &snapshot,
                    ));
                    if let Some(previous) = &state.last_top_designs {
                        if *previous != top_designs {
                            frames.push(StreamFrame::new(
                                StreamEventName::TopDesignsChange,
                                &json!({"top_designs": top_designs}),
                            ));
                        }
                    }
                    state.last_top_designs = Some(top_designs);
                }
                Err(e) => {
                    warn!(error = %e, "stats snapshot failed, tick degrades to heartbeat");
                }
            }
            frames.push(StreamFrame::new(
                StreamEventName::Heartbeat,
                &json!({"server_time": Utc::now()}),
            ));

            Some((stream::iter(frames), state))
        }
    })
    .flatten();

    let live = live_rx.into_stream().map(|event| {
        StreamFrame::new(event.stream_event_name(), &event)
    });

    connected.chain(stream::select(ticks, live))
}

#[utoipa::path(
    get,
    path = "/api/analytics/stream",
    responses(
        (status = 200, description = "Live dashboard event stream", content_type = "text/event-stream")
    ),
    tag = "analytics"
)]
#[instrument(skip_all)]
pub async fn event_stream(
    State(services): State<AnalyticsServices>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection_id = Uuid::now_v7();

    let live_rx = services.bus.subscribe().await;
    services.active_streams.fetch_add(1, Ordering::Relaxed);
    services
        .bus
        .publish(LiveEvent::UserJoined { connection_id })
        .await;

    let guard = StreamGuard {
        connection_id,
        bus: services.bus.clone(),
        active_streams: services.active_streams.clone(),
    };

    let stream =
        frames(services.store.clone(), live_rx, connection_id, guard)
            .map(|frame| Ok(frame.into_sse_event()));

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use analytics_dao::InMemoryEventStore;
    use analytics_models::validate_event;
    use serde_json::json;

    use super::*;

    fn test_connection(
        services: AnalyticsServices, live_rx: flume::Receiver<LiveEvent>,
    ) -> impl Stream<Item = StreamFrame> + Send {
        let connection_id = Uuid::now_v7();
        services.active_streams.fetch_add(1, Ordering::Relaxed);
        let guard = StreamGuard {
            connection_id,
            bus: services.bus.clone(),
            active_streams: services.active_streams.clone(),
        };
        frames(services.store.clone(), live_rx, connection_id, guard)
    }

    async fn seed_gallery_event(store: &InMemoryEventStore, design: &str) {
        let event = validate_event(&json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": "sess-1",
            "path": "/gallery",
            "category": "gallery",
            "action": "view",
            "design_id": design
        }))
        .unwrap();
        store.insert_event(&event).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_precedes_stats_and_heartbeat() {
        let store = Arc::new(InMemoryEventStore::new());
        let services = AnalyticsServices::with_store(store.clone());
        let live_rx = services.bus.subscribe().await;

        let mut stream =
            Box::pin(test_connection(services.clone(), live_rx));

        let first = stream.next().await.unwrap();
        assert_eq!(first.name, StreamEventName::Connected);
        assert!(first.data["connection_id"].is_string());
        assert!(first.data["server_time"].is_string());

        let second = stream.next().await.unwrap();
        assert_eq!(second.name, StreamEventName::StatsUpdate);
        let third = stream.next().await.unwrap();
        assert_eq!(third.name, StreamEventName::Heartbeat);
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_designs_change_emitted_on_ranking_shift() {
        let store = Arc::new(InMemoryEventStore::new());
        let services = AnalyticsServices::with_store(store.clone());
        let live_rx = services.bus.subscribe().await;

        seed_gallery_event(&store, "koi-12").await;

        let mut stream =
            Box::pin(test_connection(services.clone(), live_rx));

        // connected + first tick pair; no change event yet since there
        // is no previous ranking to compare against
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::Connected
        );
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::StatsUpdate
        );
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::Heartbeat
        );

        // Shift the ranking between ticks
        seed_gallery_event(&store, "dragon-34").await;
        seed_gallery_event(&store, "dragon-34").await;

        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::StatsUpdate
        );
        let change = stream.next().await.unwrap();
        assert_eq!(change.name, StreamEventName::TopDesignsChange);
        assert_eq!(
            change.data["top_designs"][0]["design_id"],
            "dragon-34"
        );
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::Heartbeat
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_events_are_interleaved() {
        let store = Arc::new(InMemoryEventStore::new());
        let services = AnalyticsServices::with_store(store.clone());
        let live_rx = services.bus.subscribe().await;

        let mut stream =
            Box::pin(test_connection(services.clone(), live_rx));
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::Connected
        );

        services
            .bus
            .publish(LiveEvent::Conversion {
                id: Uuid::now_v7(),
                goal: "deposit_paid".to_string(),
                value: Some(150.0),
            })
            .await;

        let frame = stream.next().await.unwrap();
        assert_eq!(frame.name, StreamEventName::Conversion);
        assert_eq!(frame.data["goal"], "deposit_paid");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_ticks_and_clears_subscription() {
        let store = Arc::new(InMemoryEventStore::new());
        let services = AnalyticsServices::with_store(store.clone());
        let live_rx = services.bus.subscribe().await;

        let mut stream =
            Box::pin(test_connection(services.clone(), live_rx));
        assert_eq!(
            stream.next().await.unwrap().name,
            StreamEventName::Connected
        );
        assert_eq!(
            services.active_streams.load(Ordering::Relaxed),
            1
        );
        assert_eq!(services.bus.subscriber_count().await, 1);

        drop(stream);

        assert_eq!(
            services.active_streams.load(Ordering::Relaxed),
            0
        );
        // The dead receiver is pruned on the next publish
        services
            .bus
            .publish(LiveEvent::UserJoined {
                connection_id: Uuid::now_v7(),
            })
            .await;
        assert_eq!(services.bus.subscriber_count().await, 0);
    }
}
