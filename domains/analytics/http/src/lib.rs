pub mod handlers;
pub mod live;
pub mod stream;

pub use handlers::{
    AnalyticsHandlers, AnalyticsServices, IngestResponse, get_stats,
    ingest_event,
};
pub use live::LiveEvent;
pub use stream::{STATS_INTERVAL, StreamEventName, event_stream};
