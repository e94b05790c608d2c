use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use utoipa::ToSchema;
use uuid::Uuid;

/// One validated client-side analytics event. Immutable once it has
/// passed [`crate::validate_event`].
#[derive(
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
    TypedBuilder,
    ToSchema,
)]
pub struct AnalyticsEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[builder(default)]
    pub user_id: Option<Uuid>,
    pub path: String,
    #[builder(default)]
    pub referrer: Option<String>,
    #[builder(default)]
    pub device: Option<DeviceInfo>,
    #[serde(flatten)]
    pub details: EventDetails,
}

impl AnalyticsEvent {
    pub fn category(&self) -> EventCategory { self.details.category() }
}

/// Category-specific payload. The `category` tag decides which fields
/// are valid; an event satisfies exactly one arm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventDetails {
    PageView {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    Interaction {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    Booking {
        action: BookingAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    Gallery {
        action: String,
        design_id: String,
    },
    Conversion {
        goal: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    Error {
        message: String,
        severity: ErrorSeverity,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl EventDetails {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::PageView { .. } => EventCategory::PageView,
            Self::Interaction { .. } => EventCategory::Interaction,
            Self::Booking { .. } => EventCategory::Booking,
            Self::Gallery { .. } => EventCategory::Gallery,
            Self::Conversion { .. } => EventCategory::Conversion,
            Self::Error { .. } => EventCategory::Error,
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    PageView,
    Interaction,
    Booking,
    Gallery,
    Conversion,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Interaction => "interaction",
            Self::Booking => "booking",
            Self::Gallery => "gallery",
            Self::Conversion => "conversion",
            Self::Error => "error",
        }
    }
}

/// Actions accepted for `category = booking`; anything else is a
/// validation failure.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Start,
    SelectService,
    SelectDate,
    EnterDetails,
    Payment,
    Complete,
    Abandon,
}

impl BookingAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "select_service" => Some(Self::SelectService),
            "select_date" => Some(Self::SelectDate),
            "enter_details" => Some(Self::EnterDetails),
            "payment" => Some(Self::Payment),
            "complete" => Some(Self::Complete),
            "abandon" => Some(Self::Abandon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SelectService => "select_service",
            Self::SelectDate => "select_date",
            Self::EnterDetails => "enter_details",
            Self::Payment => "payment",
            Self::Complete => "complete",
            Self::Abandon => "abandon",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// Client device metadata, all fields optional on the wire.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
    TypedBuilder,
    ToSchema,
)]
pub struct DeviceInfo {
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Combined viewport string, e.g. "1920x1080"
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}
