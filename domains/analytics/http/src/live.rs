use analytics_models::{
    AnalyticsEvent, ErrorSeverity, EventCategory, EventDetails,
};
use serde::Serialize;
use uuid::Uuid;

use crate::stream::StreamEventName;

/// Notification fanned out over the bus to connected stream clients as
/// ingestion happens.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    NewEvent {
        id: Uuid,
        category: EventCategory,
        path: String,
        session_id: String,
    },
    Conversion {
        id: Uuid,
        goal: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    ErrorOccurred {
        id: Uuid,
        message: String,
        severity: ErrorSeverity,
    },
    UserJoined {
        connection_id: Uuid,
    },
    UserLeft {
        connection_id: Uuid,
    },
}

impl LiveEvent {
    pub fn new_event(id: Uuid, event: &AnalyticsEvent) -> Self {
        Self::NewEvent {
            id,
            category: event.category(),
            path: event.path.clone(),
            session_id: event.session_id.clone(),
        }
    }

    /// Conversion and error events get a second, dedicated
    /// notification on top of `new_event`.
    pub fn highlight(id: Uuid, event: &AnalyticsEvent) -> Option<Self> {
        match &event.details {
            EventDetails::Conversion { goal, value } => {
                Some(Self::Conversion {
                    id,
                    goal: goal.clone(),
                    value: *value,
                })
            }
            EventDetails::Error {
                message, severity, ..
            } => {
                Some(Self::ErrorOccurred {
                    id,
                    message: message.clone(),
                    severity: *severity,
                })
            }
            _ => None,
        }
    }

    pub fn stream_event_name(&self) -> StreamEventName {
        match self {
            Self::NewEvent { .. } => StreamEventName::NewEvent,
            Self::Conversion { .. } => StreamEventName::Conversion,
            Self::ErrorOccurred { .. } => StreamEventName::ErrorOccurred,
            Self::UserJoined { .. } => StreamEventName::UserJoined,
            Self::UserLeft { .. } => StreamEventName::UserLeft,
        }
    }
}
