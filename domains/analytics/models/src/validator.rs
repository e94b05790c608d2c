use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{
    AnalyticsEvent, BookingAction, DeviceInfo, ErrorSeverity, EventDetails,
};

/// One field that failed validation. `field` is the dotted path into
/// the payload, e.g. `device.viewport`.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Schema mismatch. Carries every violation found, never just the
/// first; the payload is rejected whole.
#[derive(Debug, Error)]
#[error("event failed schema validation ({} violations)", violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn into_result(
        self, event: Option<AnalyticsEvent>,
    ) -> Result<AnalyticsEvent, ValidationError> {
        match (self.0.is_empty(), event) {
            (true, Some(event)) => Ok(event),
            (_, _) => {
                Err(ValidationError {
                    violations: self.0,
                })
            }
        }
    }
}

/// Validates an untyped payload into a strongly-typed event, or fails
/// with every field violation. Pure and synchronous; unknown
/// categories are rejected, never coerced.
pub fn validate_event(
    value: &Value,
) -> Result<AnalyticsEvent, ValidationError> {
    let mut errors = Violations::default();

    let Some(obj) = value.as_object()
    else {
        errors.push("", "payload must be a JSON object");
        return errors.into_result(None);
    };

    let timestamp = parse_timestamp(obj, &mut errors);
    let session_id = required_string(obj, "session_id", &mut errors);
    let user_id = optional_uuid(obj, "user_id", &mut errors);
    let path = required_string(obj, "path", &mut errors);
    let referrer = optional_string(obj, "referrer", &mut errors);
    let device = parse_device(obj, &mut errors);
    let details = parse_details(obj, &mut errors);

    let event = match (timestamp, session_id, path, details) {
        (Some(timestamp), Some(session_id), Some(path), Some(details)) => {
            Some(AnalyticsEvent {
                timestamp,
                session_id,
                user_id,
                path,
                referrer,
                device,
                details,
            })
        }
        _ => None,
    };

    errors.into_result(event)
}

/// Accepts an RFC 3339 string or integer epoch milliseconds,
/// normalized to UTC.
fn parse_timestamp(
    obj: &Map<String, Value>, errors: &mut Violations,
) -> Option<DateTime<Utc>> {
    match obj.get("timestamp") {
        Some(Value::String(s)) => {
            match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(_) => {
                    errors.push(
                        "timestamp",
                        "must be an RFC 3339 date-time string",
                    );
                    None
                }
            }
        }
        Some(Value::Number(n)) => {
            match n.as_i64() {
                Some(millis) => {
                    match Utc.timestamp_millis_opt(millis).single() {
                        Some(ts) => Some(ts),
                        None => {
                            errors.push(
                                "timestamp",
                                "epoch milliseconds out of range",
                            );
                            None
                        }
                    }
                }
                None => {
                    errors.push(
                        "timestamp",
                        "must be integer epoch milliseconds",
                    );
                    None
                }
            }
        }
        Some(_) => {
            errors.push(
                "timestamp",
                "must be an RFC 3339 string or epoch milliseconds",
            );
            None
        }
        None => {
            errors.push("timestamp", "is required");
            None
        }
    }
}

fn required_string(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.push(field, "must not be empty");
            None
        }
        Some(_) => {
            errors.push(field, "must be a string");
            None
        }
        None => {
            errors.push(field, "is required");
            None
        }
    }
}

fn optional_string(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(field, "must be a string");
            None
        }
    }
}

fn optional_uuid(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<Uuid> {
    match obj.get(field) {
        Some(Value::String(s)) => {
            match Uuid::parse_str(s) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(field, "must be a UUID");
                    None
                }
            }
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(field, "must be a UUID string");
            None
        }
    }
}

/// Non-negative integer, e.g. a duration in milliseconds
fn optional_u64(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<u64> {
    match obj.get(field) {
        Some(Value::Number(n)) => {
            match n.as_u64() {
                Some(v) => Some(v),
                None => {
                    errors.push(field, "must be a non-negative integer");
                    None
                }
            }
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(field, "must be a non-negative integer");
            None
        }
    }
}

fn optional_finite_f64(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<f64> {
    match obj.get(field) {
        Some(Value::Number(n)) => {
            match n.as_f64() {
                Some(v) if v.is_finite() => Some(v),
                _ => {
                    errors.push(field, "must be a finite number");
                    None
                }
            }
        }
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(field, "must be a number");
            None
        }
    }
}

fn optional_u32(
    obj: &Map<String, Value>, field: &str, errors: &mut Violations,
) -> Option<u32> {
    match optional_u64(obj, field, errors) {
        Some(v) if v <= u32::MAX as u64 => Some(v as u32),
        Some(_) => {
            errors.push(field, "is out of range");
            None
        }
        None => None,
    }
}

fn parse_device(
    obj: &Map<String, Value>, errors: &mut Violations,
) -> Option<DeviceInfo> {
    let device = match obj.get("device") {
        Some(Value::Object(device)) => device,
        Some(Value::Null) | None => return None,
        Some(_) => {
            errors.push("device", "must be an object");
            return None;
        }
    };

    let device_string = |field: &str, errors: &mut Violations| {
        match device.get(field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(_) => {
                errors.push(&format!("device.{field}"), "must be a string");
                None
            }
        }
    };

    Some(DeviceInfo {
        device_type: device_string("device_type", errors),
        browser: device_string("browser", errors),
        os: device_string("os", errors),
        viewport: device_string("viewport", errors),
        language: device_string("language", errors),
    })
}

fn parse_details(
    obj: &Map<String, Value>, errors: &mut Violations,
) -> Option<EventDetails> {
    let category = match obj.get("category") {
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            errors.push("category", "must be a string");
            return None;
        }
        None => {
            errors.push("category", "is required");
            return None;
        }
    };

    match category {
        "page_view" => {
            let title = optional_string(obj, "title", errors);
            let duration_ms = optional_u64(obj, "duration_ms", errors);
            Some(EventDetails::PageView { title, duration_ms })
        }
        "interaction" => {
            let action = required_string(obj, "action", errors);
            let target = optional_string(obj, "target", errors);
            let value = optional_finite_f64(obj, "value", errors);
            action.map(|action| {
                EventDetails::Interaction {
                    action,
                    target,
                    value,
                }
            })
        }
        "booking" => {
            let action = match required_string(obj, "action", errors) {
                Some(raw) => {
                    match BookingAction::parse(&raw) {
                        Some(action) => Some(action),
                        None => {
                            errors.push(
                                "action",
                                "must be one of start, select_service, \
                                 select_date, enter_details, payment, \
                                 complete, abandon",
                            );
                            None
                        }
                    }
                }
                None => None,
            };
            let step = optional_u32(obj, "step", errors);
            let service = optional_string(obj, "service", errors);
            action.map(|action| {
                EventDetails::Booking {
                    action,
                    step,
                    service,
                }
            })
        }
        "gallery" => {
            let action = required_string(obj, "action", errors);
            let design_id = required_string(obj, "design_id", errors);
            match (action, design_id) {
                (Some(action), Some(design_id)) => {
                    Some(EventDetails::Gallery { action, design_id })
                }
                _ => None,
            }
        }
        "conversion" => {
            let goal = required_string(obj, "goal", errors);
            let value = match optional_finite_f64(obj, "value", errors) {
                Some(v) if v > 0.0 => Some(v),
                Some(_) => {
                    errors.push("value", "must be positive");
                    None
                }
                None => None,
            };
            goal.map(|goal| EventDetails::Conversion { goal, value })
        }
        "error" => {
            let message = required_string(obj, "message", errors);
            let severity = match required_string(obj, "severity", errors) {
                Some(raw) => {
                    match ErrorSeverity::parse(&raw) {
                        Some(severity) => Some(severity),
                        None => {
                            errors.push(
                                "severity",
                                "must be one of info, warning, error, \
                                 critical",
                            );
                            None
                        }
                    }
                }
                None => None,
            };
            let stack = optional_string(obj, "stack", errors);
            match (message, severity) {
                (Some(message), Some(severity)) => {
                    Some(EventDetails::Error {
                        message,
                        severity,
                        stack,
                    })
                }
                _ => None,
            }
        }
        other => {
            errors.push("category", format!("unknown category '{other}'"));
            None
        }
    }
}
