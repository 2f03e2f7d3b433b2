use chrono::NaiveDateTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Exact format of the `timestamp` form field (HTML `datetime-local` input).
pub const TIMESTAMP_FIELD_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// A geolocated event. `lat`/`lon` are both set or both NULL, depending on
/// whether the location text geocoded at creation/edit time. `organizer` is
/// fixed at creation and never part of an update.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub timestamp: NaiveDateTime,
    pub location: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub organizer: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload backing the creation/edit forms: the same fields the form posts
/// back, with the timestamp rendered in the field's own format.
#[derive(Debug, Serialize)]
pub struct EventFormData {
    pub id: Option<Uuid>,
    pub name: String,
    pub timestamp: String,
    pub location: String,
    pub image_url: String,
}

impl EventFormData {
    pub fn blank() -> Self {
        Self {
            id: None,
            name: String::new(),
            timestamp: String::new(),
            location: String::new(),
            image_url: String::new(),
        }
    }
}

impl From<&Event> for EventFormData {
    fn from(event: &Event) -> Self {
        Self {
            id: Some(event.id),
            name: event.name.clone(),
            timestamp: format_timestamp_field(event.timestamp),
            location: event.location.clone(),
            image_url: event.image_url.clone(),
        }
    }
}

pub fn parse_timestamp_field(raw: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FIELD_FORMAT).map_err(|_| {
        AppError::ValidationError(format!(
            "Timestamp '{raw}' is not in the expected YYYY-MM-DDTHH:MM format"
        ))
    })
}

pub fn format_timestamp_field(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FIELD_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_event() -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Midsummer concert".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(18, 30, 0)
                .unwrap(),
            location: "Plaza Mayor, Madrid".to_string(),
            lat: Some(40.415),
            lon: Some(-3.707),
            organizer: "organizer@example.com".to_string(),
            image_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn timestamp_field_parses_expected_format() {
        let parsed = parse_timestamp_field("2025-06-01T18:30").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(18, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn timestamp_field_rejects_other_formats() {
        assert!(parse_timestamp_field("2025-06-01 18:30").is_err());
        assert!(parse_timestamp_field("2025-06-01T18:30:00").is_err());
        assert!(parse_timestamp_field("not a date").is_err());
    }

    #[test]
    fn timestamp_field_round_trips() {
        // An edit form submitted with an unchanged timestamp field must
        // reproduce the exact stored value.
        let raw = "2025-06-01T18:30";
        let parsed = parse_timestamp_field(raw).unwrap();
        assert_eq!(format_timestamp_field(parsed), raw);
        assert_eq!(parse_timestamp_field(&format_timestamp_field(parsed)).unwrap(), parsed);
    }

    #[test]
    fn form_data_prefills_from_event() {
        let event = sample_event();
        let form = EventFormData::from(&event);
        assert_eq!(form.id, Some(event.id));
        assert_eq!(form.timestamp, "2025-06-01T18:30");
        assert_eq!(form.location, event.location);
    }

    #[test]
    fn blank_form_has_no_id() {
        let form = EventFormData::blank();
        assert!(form.id.is_none());
        assert!(form.name.is_empty());
    }
}
