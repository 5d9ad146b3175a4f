//! Credential check and token minting.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::auth::clock::SharedClock;
use crate::auth::context::SessionBinding;
use crate::auth::credentials::CredentialStore;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::session_store::SessionStore;
use crate::auth::token::BearerToken;
use crate::types::{InstitutionId, UserId};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: BearerToken,
    pub expires_at: DateTime<Utc>,
    pub binding: SessionBinding,
}

#[derive(Debug, Clone, Copy)]
pub struct IssuePolicy {
    pub ttl: Duration,
    /// Revoke the user's other sessions after issuing a new one.
    pub single_session: bool,
}

pub struct TokenIssuer {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionStore>,
    policy: IssuePolicy,
    clock: SharedClock,
    /// Logins in progress past the password check, one entry per user.
    issuing: DashMap<(InstitutionId, UserId), ()>,
}

impl TokenIssuer {
    pub fn new(
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionStore>,
        policy: IssuePolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            credentials,
            sessions,
            policy,
            clock,
            issuing: DashMap::new(),
        }
    }

    pub fn policy(&self) -> IssuePolicy {
        self.policy
    }

    /// Verify credentials and mint a token bound to the user's current role.
    ///
    /// Runs the password hash check, so call it off the async executor.
    ///
    /// The role is read again after the session is stored. A role change
    /// that landed during the hash check would otherwise miss the new token
    /// in its revocation sweep, so such a token is revoked and re-minted
    /// with the current role.
    pub fn issue(&self, institution: &str, user_id: UserId, password: &str) -> AuthResult<IssuedToken> {
        let user = self.credentials.verify(institution, user_id, password)?;

        // Insert, role check and single-session sweep run as one step per user.
        let _turn = self
            .issuing
            .entry((InstitutionId::new(institution), user_id))
            .or_default();

        let mut role = user.role;
        loop {
            let now = self.clock.now();
            let expires_at = now
                .checked_add_signed(self.policy.ttl)
                .ok_or_else(|| AuthError::Internal("token expiry out of range".to_string()))?;
            let binding = SessionBinding::new(
                InstitutionId::new(institution),
                user_id,
                role,
                now,
                expires_at,
            );

            let token = BearerToken::generate();
            let digest = token.digest();
            self.sessions.insert(digest, binding.clone());

            match self.credentials.get(institution, user_id).map(|u| u.role) {
                Some(current) if current == role => {}
                Some(current) => {
                    self.sessions.revoke(&digest, now);
                    debug!(%institution, %user_id, from = %role, to = %current, "Role changed during login");
                    role = current;
                    continue;
                }
                None => {
                    self.sessions.revoke(&digest, now);
                    return Err(AuthError::BadCredential);
                }
            }

            if self.policy.single_session {
                let revoked = self
                    .sessions
                    .revoke_user(institution, user_id, Some(&digest), now);
                if revoked > 0 {
                    debug!(%institution, %user_id, revoked, "Revoked older sessions");
                }
            }

            info!(
                %institution,
                %user_id,
                %role,
                session = %digest.short(),
                "Issued session token"
            );

            return Ok(IssuedToken {
                token,
                expires_at,
                binding,
            });
        }
    }
}
