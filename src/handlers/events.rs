use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::event::{parse_timestamp_field, Event, EventFormData};
use crate::models::session::SessionUser;
use crate::services::geocoder::Coordinates;
use crate::services::images;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{redirect_to_listing, success};

/// Half-width of the proximity search box, in degrees of latitude and
/// longitude independently. Not a great-circle distance.
const PROXIMITY_DEGREES: f64 = 0.2;

const EVENT_COLUMNS: &str =
    "id, name, timestamp, location, lat, lon, organizer, image_url, created_at, updated_at";

/// GET /: every event, soonest first.
pub async fn list_events(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY timestamp ASC");
    let events = sqlx::query_as::<_, Event>(&query)
        .fetch_all(&state.pool)
        .await?;

    Ok(success(events, "Events retrieved").into_response())
}

/// GET /events: every event, most recent first.
pub async fn list_events_descending(
    State(state): State<Arc<AppState>>,
) -> Result<Response, AppError> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY timestamp DESC");
    let events = sqlx::query_as::<_, Event>(&query)
        .fetch_all(&state.pool)
        .await?;

    Ok(success(events, "Events retrieved").into_response())
}

#[derive(Debug, Deserialize)]
pub struct AddressFilter {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct FilteredEvents {
    pub center: Option<Coordinates>,
    pub events: Vec<Event>,
}

/// POST /: upcoming events near a free-text address. A geocoding miss
/// yields an empty list, not the unfiltered one.
pub async fn filter_events(
    State(state): State<Arc<AppState>>,
    Form(filter): Form<AddressFilter>,
) -> Result<Response, AppError> {
    let Some(center) = state.geocoder.lookup(&filter.address).await? else {
        return Ok(success(
            FilteredEvents {
                center: None,
                events: Vec::new(),
            },
            "Address did not resolve",
        )
        .into_response());
    };

    let (lat_min, lat_max) = proximity_bounds(center.lat);
    let (lon_min, lon_max) = proximity_bounds(center.lon);

    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events \
         WHERE lat BETWEEN $1 AND $2 AND lon BETWEEN $3 AND $4 AND timestamp >= $5 \
         ORDER BY timestamp ASC"
    );
    let events = sqlx::query_as::<_, Event>(&query)
        .bind(lat_min)
        .bind(lat_max)
        .bind(lon_min)
        .bind(lon_max)
        .bind(Local::now().naive_local())
        .fetch_all(&state.pool)
        .await?;

    Ok(success(
        FilteredEvents {
            center: Some(center),
            events,
        },
        "Events retrieved",
    )
    .into_response())
}

/// GET /event/:id: event detail.
pub async fn event_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = fetch_event(&state.pool, id).await?;
    Ok(success(event, "Event retrieved").into_response())
}

/// GET /new: the blank creation form.
pub async fn new_event_form() -> Response {
    success(EventFormData::blank(), "New event form").into_response()
}

/// GET /edit/:id: the edit form, pre-filled with the stored event.
pub async fn edit_event_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = fetch_event(&state.pool, id).await?;
    Ok(success(EventFormData::from(&event), "Edit event form").into_response())
}

/// POST /new: create an event owned by the logged-in user.
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let submission = read_event_form(&mut multipart).await?;

    // A miss leaves the event without coordinates; it still saves.
    let coordinates = state.geocoder.lookup(&submission.location).await?;
    let (lat, lon) = split_coordinates(coordinates);

    let image_url = match submission.image {
        Some(image) => state.images.upload(&image.filename, image.bytes).await?,
        None => String::new(),
    };

    sqlx::query(
        "INSERT INTO events (name, timestamp, location, lat, lon, organizer, image_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&submission.name)
    .bind(submission.timestamp)
    .bind(&submission.location)
    .bind(lat)
    .bind(lon)
    .bind(&user.email)
    .bind(&image_url)
    .execute(&state.pool)
    .await?;

    tracing::info!(organizer = %user.email, name = %submission.name, "Event created");

    Ok(redirect_to_listing())
}

/// POST /edit/:id: update an event. Only the organizer may edit, and the
/// organizer column itself is never part of the update.
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let event = fetch_event(&state.pool, id).await?;
    ensure_organizer(&event, &user)?;

    let submission = read_event_form(&mut multipart).await?;

    // Unlike creation, a miss here keeps whatever coordinates the event
    // already had.
    let resolved = state.geocoder.lookup(&submission.location).await?;
    let (lat, lon) = coordinates_or_previous(resolved, (event.lat, event.lon));

    let image_url = match submission.image {
        Some(image) => state.images.upload(&image.filename, image.bytes).await?,
        None => event.image_url,
    };

    sqlx::query(
        "UPDATE events SET name = $1, timestamp = $2, location = $3, lat = $4, lon = $5, \
         image_url = $6, updated_at = now() WHERE id = $7",
    )
    .bind(&submission.name)
    .bind(submission.timestamp)
    .bind(&submission.location)
    .bind(lat)
    .bind(lon)
    .bind(&image_url)
    .bind(id)
    .execute(&state.pool)
    .await?;

    Ok(redirect_to_listing())
}

/// GET,POST /delete/:id: remove an event. The hosted image is deleted on a
/// best-effort basis first; the event row goes away regardless.
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    let event = fetch_event(&state.pool, id).await?;
    ensure_organizer(&event, &user)?;

    if !event.image_url.is_empty() {
        match images::public_id_from_url(&event.image_url) {
            Some(public_id) => {
                if let Err(err) = state.images.destroy(public_id).await {
                    tracing::warn!(event_id = %id, error = %err, "Hosted image removal failed, deleting event anyway");
                }
            }
            None => {
                tracing::warn!(event_id = %id, url = %event.image_url, "No asset id derivable from image URL");
            }
        }
    }

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    tracing::info!(event_id = %id, organizer = %user.email, "Event deleted");

    Ok(redirect_to_listing())
}

async fn fetch_event(pool: &PgPool, id: Uuid) -> Result<Event, AppError> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
    sqlx::query_as::<_, Event>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event with id '{id}' was not found")))
}

fn ensure_organizer(event: &Event, user: &SessionUser) -> Result<(), AppError> {
    if event.organizer == user.email {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the organizer may modify this event".to_string(),
        ))
    }
}

fn proximity_bounds(center: f64) -> (f64, f64) {
    (center - PROXIMITY_DEGREES, center + PROXIMITY_DEGREES)
}

fn split_coordinates(coordinates: Option<Coordinates>) -> (Option<f64>, Option<f64>) {
    match coordinates {
        Some(c) => (Some(c.lat), Some(c.lon)),
        None => (None, None),
    }
}

fn coordinates_or_previous(
    resolved: Option<Coordinates>,
    previous: (Option<f64>, Option<f64>),
) -> (Option<f64>, Option<f64>) {
    match resolved {
        Some(c) => (Some(c.lat), Some(c.lon)),
        None => previous,
    }
}

struct EventSubmission {
    name: String,
    timestamp: NaiveDateTime,
    location: String,
    image: Option<UploadedImage>,
}

struct UploadedImage {
    filename: String,
    bytes: Bytes,
}

/// Pull the creation/edit form out of a multipart body. `name`, `timestamp`
/// and `location` are required; `image` is an optional file part.
async fn read_event_form(multipart: &mut Multipart) -> Result<EventSubmission, AppError> {
    let mut name = None;
    let mut raw_timestamp = None;
    let mut location = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Malformed form body: {e}")))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => name = Some(read_text(field).await?),
            Some("timestamp") => raw_timestamp = Some(read_text(field).await?),
            Some("location") => location = Some(read_text(field).await?),
            Some("image") => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(format!("Malformed form body: {e}")))?;
                // Browsers submit an empty file part when nothing was picked.
                if !bytes.is_empty() {
                    image = Some(UploadedImage { filename, bytes });
                }
            }
            _ => {}
        }
    }

    let name = name
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("Name is required".to_string()))?;
    let location = location
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("Location is required".to_string()))?;
    let raw_timestamp = raw_timestamp
        .ok_or_else(|| AppError::ValidationError("Timestamp is required".to_string()))?;
    let timestamp = parse_timestamp_field(&raw_timestamp)?;

    Ok(EventSubmission {
        name,
        timestamp,
        location,
        image,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::ValidationError(format!("Malformed form body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn event_owned_by(email: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Neighborhood market".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            location: "Gran Via, Madrid".to_string(),
            lat: Some(40.42),
            lon: Some(-3.70),
            organizer: email.to_string(),
            image_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(email: &str) -> SessionUser {
        SessionUser {
            email: email.to_string(),
            name: None,
        }
    }

    #[test]
    fn organizer_may_mutate() {
        let event = event_owned_by("owner@example.com");
        assert!(ensure_organizer(&event, &user("owner@example.com")).is_ok());
    }

    #[test]
    fn non_organizer_is_forbidden() {
        let event = event_owned_by("owner@example.com");
        let err = ensure_organizer(&event, &user("intruder@example.com")).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn proximity_bounds_are_inclusive_half_widths() {
        let (min, max) = proximity_bounds(40.0);
        assert!((min - 39.8).abs() < 1e-9);
        assert!((max - 40.2).abs() < 1e-9);
        // BETWEEN in the query keeps both endpoints, so an event at exactly
        // center + 0.2 falls inside the box.
    }

    #[test]
    fn creation_miss_leaves_both_coordinates_empty() {
        assert_eq!(split_coordinates(None), (None, None));
    }

    #[test]
    fn creation_hit_fills_both_coordinates() {
        let (lat, lon) = split_coordinates(Some(Coordinates { lat: 1.0, lon: 2.0 }));
        assert_eq!(lat, Some(1.0));
        assert_eq!(lon, Some(2.0));
    }

    #[test]
    fn edit_miss_preserves_previous_coordinates() {
        let previous = (Some(40.42), Some(-3.70));
        assert_eq!(coordinates_or_previous(None, previous), previous);
    }

    #[test]
    fn edit_hit_replaces_previous_coordinates() {
        let resolved = Some(Coordinates { lat: 48.85, lon: 2.35 });
        let (lat, lon) = coordinates_or_previous(resolved, (Some(40.42), Some(-3.70)));
        assert_eq!(lat, Some(48.85));
        assert_eq!(lon, Some(2.35));
    }

    #[test]
    fn edit_miss_with_no_previous_coordinates_stays_empty() {
        assert_eq!(coordinates_or_previous(None, (None, None)), (None, None));
    }
}
