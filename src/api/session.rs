//! Login and logout.

use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::HeaderMap;
use axum::response::{Json, Redirect};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::auth::{AuthError, BEARER_COOKIE, RoleArea, SessionService, presented_token};
use crate::types::UserId;

use super::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// `POST /{institution}/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Path(institution): Path<String>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    if !state.institutions.contains(&institution) {
        return Err(AuthError::UnknownInstitution);
    }
    let user_id: UserId = form
        .user_id
        .parse()
        .map_err(|_| AuthError::ValidationFailure("user_id must be a number".to_string()))?;

    // Password verification is deliberately slow; keep it off the reactor.
    let password = Zeroizing::new(form.password);
    let service: Arc<SessionService> = state.sessions.clone();
    let tenant = institution.clone();
    let issued = tokio::task::spawn_blocking(move || {
        service.issue(&tenant, user_id, password.as_str())
    })
    .await
    .map_err(|e| AuthError::Internal(format!("login task failed: {}", e)))?;

    let issued = match issued {
        Ok(issued) => issued,
        Err(e) => {
            warn!(%institution, %user_id, reason = e.code(), "Login failed");
            return Err(e);
        }
    };

    let max_age = (issued.expires_at - state.sessions.now()).num_seconds().max(0);
    let cookie = Cookie::parse(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        BEARER_COOKIE,
        issued.token.as_str(),
        max_age
    ))
    .map_err(|e| AuthError::Internal(format!("session cookie: {}", e)))?;

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: issued.token.into_inner(),
            expires: issued.expires_at,
        }),
    ))
}

#[derive(Deserialize)]
pub struct InstitutionPath {
    institution: String,
}

/// `GET|POST /{institution}/{role}/logout`
///
/// Always clears the cookie and redirects to the role's login page, whether
/// or not a live token was presented.
pub async fn logout<A: RoleArea>(
    State(state): State<AppState>,
    Path(InstitutionPath { institution }): Path<InstitutionPath>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    if !state.institutions.contains(&institution) {
        return Err(AuthError::UnknownInstitution);
    }

    match presented_token(&headers) {
        Ok(Some(token)) => {
            if state.sessions.revoke(&token) {
                info!(%institution, area = %A::ROLE, "Logged out");
            }
        }
        Ok(None) => debug!(%institution, "Logout without a token"),
        Err(e) => debug!(%institution, reason = e.code(), "Logout with an unreadable token"),
    }

    let mut removal = Cookie::build(BEARER_COOKIE).path("/").build();
    removal.make_removal();
    let jar = jar.add(removal);
    Ok((
        jar,
        Redirect::to(&format!("/{}/{}/login", institution, A::ROLE)),
    ))
}
