//! Role-scoped resource endpoints.

use axum::Json;
use axum::extract::State;

use crate::auth::{AdminArea, AuthError, Authorized, InstructorArea, StudentArea};
use crate::users::admins::{self, AdminHome};
use crate::users::instructors::{self, CreateInstructors, CreatedInstructors, InstructorHome};
use crate::users::students::{self, CreateStudents, CreatedStudents, StudentHome};

use super::AppState;

pub async fn admin_home(
    auth: Authorized<AdminArea>,
    State(state): State<AppState>,
) -> Result<Json<AdminHome>, AuthError> {
    admins::home(&state.directory, auth.institution.as_str(), auth.binding.user_id()).map(Json)
}

pub async fn instructor_home(
    auth: Authorized<InstructorArea>,
    State(state): State<AppState>,
) -> Result<Json<InstructorHome>, AuthError> {
    instructors::home(&state.directory, auth.institution.as_str(), auth.binding.user_id()).map(Json)
}

pub async fn student_home(
    auth: Authorized<StudentArea>,
    State(state): State<AppState>,
) -> Result<Json<StudentHome>, AuthError> {
    students::home(&state.directory, auth.institution.as_str(), auth.binding.user_id()).map(Json)
}

/// `POST /{institution}/student/create`
pub async fn create_students(
    auth: Authorized<AdminArea>,
    State(state): State<AppState>,
    Json(request): Json<CreateStudents>,
) -> Result<Json<CreatedStudents>, AuthError> {
    let now = state.sessions.now();
    let credentials = state.sessions.credentials().clone();
    let directory = state.directory.clone();
    // Every entry hashes a fresh password.
    tokio::task::spawn_blocking(move || {
        students::create(
            &credentials,
            &directory,
            auth.institution.as_str(),
            auth.binding.user_id(),
            request,
            now,
        )
    })
    .await
    .map_err(|e| AuthError::Internal(format!("creation task failed: {}", e)))?
    .map(Json)
}

/// `POST /{institution}/instructor/create`
pub async fn create_instructors(
    auth: Authorized<AdminArea>,
    State(state): State<AppState>,
    Json(request): Json<CreateInstructors>,
) -> Result<Json<CreatedInstructors>, AuthError> {
    let now = state.sessions.now();
    let credentials = state.sessions.credentials().clone();
    let directory = state.directory.clone();
    tokio::task::spawn_blocking(move || {
        instructors::create(
            &credentials,
            &directory,
            auth.institution.as_str(),
            auth.binding.user_id(),
            request,
            now,
        )
    })
    .await
    .map_err(|e| AuthError::Internal(format!("creation task failed: {}", e)))?
    .map(Json)
}
