use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tower_sessions::service::SignedCookie;
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::auth::{authorize, login, logout};
use crate::handlers::events::{
    create_event, delete_event, edit_event_form, event_details, filter_events, list_events,
    list_events_descending, new_event_form, update_event,
};
use crate::handlers::health_check;
use crate::state::AppState;

/// Image uploads come through the event forms; anything past this size is
/// rejected before it reaches the handlers.
const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

pub fn create_routes(
    state: Arc<AppState>,
    sessions: SessionManagerLayer<MemoryStore, SignedCookie>,
) -> Router {
    Router::new()
        .route("/", get(list_events).post(filter_events))
        .route("/login", get(login))
        .route("/authorize", get(authorize))
        .route("/logout", get(logout))
        .route("/new", get(new_event_form).post(create_event))
        .route("/edit/:id", get(edit_event_form).post(update_event))
        // POST is the canonical verb; GET stays routable for plain-link
        // delete buttons.
        .route("/delete/:id", get(delete_event).post(delete_event))
        .route("/event/:id", get(event_details))
        .route("/events", get(list_events_descending))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
