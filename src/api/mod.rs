// REST API endpoints for the institutions

mod error;
mod resources;
mod session;

pub use error::{ErrorBody, UNAUTHENTICATED_MESSAGE, status_for};

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AdminArea, InstructorArea, SessionService, StudentArea};
use crate::config::Institutions;
use crate::users::Directory;

/// Shared handles for every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub institutions: Institutions,
    pub directory: Arc<Directory>,
}

impl FromRef<AppState> for Arc<SessionService> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Institutions {
    fn from_ref(state: &AppState) -> Self {
        state.institutions.clone()
    }
}

impl FromRef<AppState> for Arc<Directory> {
    fn from_ref(state: &AppState) -> Self {
        state.directory.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/{institution}/auth/login", post(session::login))
        .route(
            "/{institution}/admin/logout",
            get(session::logout::<AdminArea>).post(session::logout::<AdminArea>),
        )
        .route(
            "/{institution}/instructor/logout",
            get(session::logout::<InstructorArea>).post(session::logout::<InstructorArea>),
        )
        .route(
            "/{institution}/student/logout",
            get(session::logout::<StudentArea>).post(session::logout::<StudentArea>),
        )
        .route("/{institution}/admin/home", get(resources::admin_home))
        .route("/{institution}/instructor/home", get(resources::instructor_home))
        .route("/{institution}/student/home", get(resources::student_home))
        .route("/{institution}/student/create", post(resources::create_students))
        .route("/{institution}/instructor/create", post(resources::create_instructors))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let stats = state.sessions.stats();
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "institutions": state.institutions.len(),
        "sessions": {
            "active": stats.active,
            "expired": stats.expired,
            "revoked": stats.revoked,
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
