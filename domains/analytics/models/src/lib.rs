pub mod events;
pub mod stats;
pub mod validator;

pub use events::{
    AnalyticsEvent, BookingAction, DeviceInfo, ErrorSeverity, EventCategory,
    EventDetails,
};
pub use stats::{DesignCount, PathCount, StatsSnapshot};
pub use validator::{FieldViolation, ValidationError, validate_event};
