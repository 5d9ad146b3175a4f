//! Session extraction for HTTP requests.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Path};
use axum_extra::extract::CookieJar;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::HeaderMap;
use serde::Deserialize;
use tracing::warn;

use crate::auth::context::SessionBinding;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::service::SessionService;
use crate::auth::token::parse_authorization;
use crate::config::Institutions;
use crate::types::{InstitutionId, Role};

/// Cookie the front end keeps the bearer token in.
pub const BEARER_COOKIE: &str = "bearer_token";

/// Pull the presented token out of the request headers.
///
/// The `Authorization: Bearer` header wins; the `bearer_token` cookie is
/// used only when no header is present. `Ok(None)` means nothing was
/// presented at all.
pub fn presented_token(headers: &HeaderMap) -> AuthResult<Option<String>> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::TokenMalformed)?;
        return parse_authorization(value).map(|token| Some(token.into_inner()));
    }

    let jar = CookieJar::from_headers(headers);
    Ok(jar
        .get(BEARER_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty()))
}

/// A resource area guarded by a single role.
pub trait RoleArea: Send + Sync + 'static {
    const ROLE: Role;
}

pub struct AdminArea;
pub struct InstructorArea;
pub struct StudentArea;

impl RoleArea for AdminArea {
    const ROLE: Role = Role::Admin;
}

impl RoleArea for InstructorArea {
    const ROLE: Role = Role::Instructor;
}

impl RoleArea for StudentArea {
    const ROLE: Role = Role::Student;
}

#[derive(Debug, Deserialize)]
struct InstitutionPath {
    institution: String,
}

/// A validated session that passed the gate for `A`'s role in the
/// institution named by the `{institution}` path segment.
pub struct Authorized<A> {
    pub institution: InstitutionId,
    pub binding: SessionBinding,
    _area: PhantomData<A>,
}

impl<A> std::fmt::Debug for Authorized<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorized")
            .field("institution", &self.institution)
            .field("binding", &self.binding)
            .finish()
    }
}

impl<S, A> FromRequestParts<S> for Authorized<A>
where
    A: RoleArea,
    S: Send + Sync,
    Arc<SessionService>: FromRef<S>,
    Institutions: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(InstitutionPath { institution }) =
            Path::<InstitutionPath>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::UnknownInstitution)?;

        if !Institutions::from_ref(state).contains(&institution) {
            return Err(AuthError::UnknownInstitution);
        }

        let service = Arc::<SessionService>::from_ref(state);
        let result = presented_token(&parts.headers)
            .and_then(|token| service.require(token.as_deref(), &institution, A::ROLE));

        match result {
            Ok(binding) => Ok(Self {
                institution: InstitutionId::new(institution),
                binding,
                _area: PhantomData,
            }),
            Err(e) => {
                warn!(
                    %institution,
                    area = %A::ROLE,
                    reason = e.code(),
                    "Request rejected"
                );
                Err(e)
            }
        }
    }
}
