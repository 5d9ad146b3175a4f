//! Token validation.

use std::sync::Arc;

use chrono::Duration;

use crate::auth::clock::SharedClock;
use crate::auth::context::SessionBinding;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::session_store::SessionStore;
use crate::auth::token::BearerToken;

pub struct TokenValidator {
    sessions: Arc<SessionStore>,
    /// `Some(ttl)` when sliding expiry is on.
    slide: Option<Duration>,
    clock: SharedClock,
}

impl TokenValidator {
    pub fn new(sessions: Arc<SessionStore>, slide: Option<Duration>, clock: SharedClock) -> Self {
        Self {
            sessions,
            slide,
            clock,
        }
    }

    /// Resolve a presented token to its binding.
    ///
    /// `None` or an empty string is [`AuthError::TokenMissing`]; anything
    /// that does not decode as a token is [`AuthError::TokenMalformed`].
    pub fn validate(&self, presented: Option<&str>) -> AuthResult<SessionBinding> {
        let raw = presented.ok_or(AuthError::TokenMissing)?;
        let token = BearerToken::parse(raw)?;
        self.validate_token(&token)
    }

    pub fn validate_token(&self, token: &BearerToken) -> AuthResult<SessionBinding> {
        self.sessions
            .lookup(&token.digest(), self.clock.now(), self.slide)
    }
}
