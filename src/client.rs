//! HTTP client for an institution's endpoints.
//!
//! Holds the bearer token after a successful login and attaches it to every
//! protected call. A 401 drops the stored token, since the caller has to log
//! in again anyway.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Institution;
use crate::types::{InstitutionId, Role, UserId};
use crate::users::NewProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The session is gone; log in again.
    Unauthenticated,
    /// Valid session, but not for this. Permissions may have changed.
    Forbidden,
    /// The institution's backend could not be reached.
    TenantUnreachable(String),
    /// Any other non-success status.
    Institution(StatusCode),
    /// A protected call was made before `login`.
    NotLoggedIn,
    /// The response body was not what the endpoint promises.
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Not authenticated, please log in again"),
            Self::Forbidden => write!(f, "Access denied; your permissions may have changed"),
            Self::TenantUnreachable(e) => write!(f, "Institution unreachable: {}", e),
            Self::Institution(status) => write!(f, "Institution answered {}", status),
            Self::NotLoggedIn => write!(f, "Not logged in"),
            Self::Decode(e) => write!(f, "Unexpected response: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

/// Map a response status onto the client's failure classes.
pub fn check_status(status: StatusCode) -> Result<(), ClientError> {
    match status {
        s if s.is_success() || s.is_redirection() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthenticated),
        StatusCode::FORBIDDEN => Err(ClientError::Forbidden),
        s => Err(ClientError::Institution(s)),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub token: String,
    pub expires: DateTime<Utc>,
}

pub struct InstitutionClient {
    institution: InstitutionId,
    base_url: Url,
    http: reqwest::Client,
    session: Option<Session>,
}

impl InstitutionClient {
    pub fn new(institution: &Institution) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            // Logout answers with a redirect to a login page; report it instead.
            .redirect(Policy::none())
            .build()
            .map_err(|e| ClientError::TenantUnreachable(e.to_string()))?;
        Ok(Self {
            institution: institution.id.clone(),
            base_url: institution.base_url.clone(),
            http,
            session: None,
        })
    }

    pub fn institution(&self) -> &InstitutionId {
        &self.institution
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Reuse a token obtained elsewhere.
    pub fn with_token(mut self, token: impl Into<String>, expires: DateTime<Utc>) -> Self {
        self.session = Some(Session {
            token: token.into(),
            expires,
        });
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(&format!("{}/{}", self.institution, path))
            .map_err(|e| ClientError::TenantUnreachable(e.to_string()))
    }

    fn token(&self) -> Result<&str, ClientError> {
        self.session
            .as_ref()
            .map(|s| s.token.as_str())
            .ok_or(ClientError::NotLoggedIn)
    }

    async fn finish<T: DeserializeOwned>(
        &mut self,
        sent: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, ClientError> {
        let response = sent.map_err(|e| ClientError::TenantUnreachable(e.to_string()))?;
        let status = response.status();
        if let Err(e) = check_status(status) {
            if e == ClientError::Unauthenticated {
                self.session = None;
            }
            debug!(institution = %self.institution, %status, "Request failed");
            return Err(e);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn login(&mut self, user_id: UserId, password: &str) -> Result<&Session, ClientError> {
        let url = self.endpoint("auth/login")?;
        let user_id = user_id.to_string();
        let sent = self
            .http
            .post(url)
            .form(&[("user_id", user_id.as_str()), ("password", password)])
            .send()
            .await;
        let session: Session = self.finish(sent).await?;
        Ok(self.session.insert(session))
    }

    async fn get_json(&mut self, path: &str) -> Result<Value, ClientError> {
        let url = self.endpoint(path)?;
        let sent = self.http.get(url).bearer_auth(self.token()?).send().await;
        self.finish(sent).await
    }

    async fn post_json(&mut self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let url = self.endpoint(path)?;
        let sent = self
            .http
            .post(url)
            .bearer_auth(self.token()?)
            .json(body)
            .send()
            .await;
        self.finish(sent).await
    }

    pub async fn admin_home(&mut self) -> Result<Value, ClientError> {
        self.get_json("admin/home").await
    }

    pub async fn instructor_home(&mut self) -> Result<Value, ClientError> {
        self.get_json("instructor/home").await
    }

    pub async fn student_home(&mut self) -> Result<Value, ClientError> {
        self.get_json("student/home").await
    }

    /// Role-dispatching home lookup, for callers holding a `Role` value.
    pub async fn home(&mut self, role: Role) -> Result<Value, ClientError> {
        match role {
            Role::Admin => self.admin_home().await,
            Role::Instructor => self.instructor_home().await,
            Role::Student => self.student_home().await,
        }
    }

    pub async fn create_students(&mut self, students: &[NewProfile]) -> Result<Value, ClientError> {
        self.post_json("student/create", &serde_json::json!({ "students": students }))
            .await
    }

    pub async fn create_instructors(
        &mut self,
        instructors: &[NewProfile],
    ) -> Result<Value, ClientError> {
        self.post_json(
            "instructor/create",
            &serde_json::json!({ "instructors": instructors }),
        )
        .await
    }

    /// Revoke the current token. The local session is dropped either way.
    pub async fn logout(&mut self, role: Role) -> Result<(), ClientError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let url = self.endpoint(&format!("{}/logout", role))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(|e| ClientError::TenantUnreachable(e.to_string()))?;
        check_status(response.status())
    }
}
