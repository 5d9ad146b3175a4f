//! Session service: issuer, validator, gate and revocation behind one handle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::clock::{SharedClock, SystemClock};
use crate::auth::context::SessionBinding;
use crate::auth::credentials::CredentialStore;
use crate::auth::error::AuthResult;
use crate::auth::gate::{AuthorizationGate, Decision, RoleGrants};
use crate::auth::issuer::{IssuePolicy, IssuedToken, TokenIssuer};
use crate::auth::session_store::{SessionStats, SessionStore};
use crate::auth::token::BearerToken;
use crate::auth::validator::TokenValidator;
use crate::config::SessionConfig;
use crate::types::{Role, UserId};

pub struct SessionService {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionStore>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    gate: AuthorizationGate,
    clock: SharedClock,
    retention: Duration,
}

impl SessionService {
    pub fn new(credentials: Arc<CredentialStore>, config: &SessionConfig, grants: RoleGrants) -> Self {
        Self::with_clock(credentials, config, grants, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: Arc<CredentialStore>,
        config: &SessionConfig,
        grants: RoleGrants,
        clock: SharedClock,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let ttl = config.token_ttl();
        let issuer = TokenIssuer::new(
            credentials.clone(),
            sessions.clone(),
            IssuePolicy {
                ttl,
                single_session: config.single_session,
            },
            clock.clone(),
        );
        let validator = TokenValidator::new(
            sessions.clone(),
            config.sliding_expiry.then_some(ttl),
            clock.clone(),
        );

        Self {
            credentials,
            sessions,
            issuer,
            validator,
            gate: AuthorizationGate::new(grants),
            clock,
            retention: config.expired_retention(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn issue(&self, institution: &str, user_id: UserId, password: &str) -> AuthResult<IssuedToken> {
        self.issuer.issue(institution, user_id, password)
    }

    pub fn validate(&self, presented: Option<&str>) -> AuthResult<SessionBinding> {
        self.validator.validate(presented)
    }

    pub fn authorize(&self, binding: &SessionBinding, institution: &str, role: Role) -> Decision {
        self.gate.authorize(binding, institution, role)
    }

    /// Validate a presented token and check it against a role area.
    pub fn require(
        &self,
        presented: Option<&str>,
        institution: &str,
        role: Role,
    ) -> AuthResult<SessionBinding> {
        let binding = self.validate(presented)?;
        self.authorize(&binding, institution, role).into_result()?;
        Ok(binding)
    }

    /// Revoke a presented token. Idempotent; a token that does not even
    /// parse has nothing to revoke.
    pub fn revoke(&self, presented: &str) -> bool {
        let Ok(token) = BearerToken::parse(presented) else {
            return false;
        };
        let digest = token.digest();
        let revoked = self.sessions.revoke(&digest, self.clock.now());
        if revoked {
            info!(session = %digest.short(), "Revoked session token");
        }
        revoked
    }

    /// Revoke every live session of one user.
    pub fn revoke_user(&self, institution: &str, user_id: UserId) -> usize {
        let revoked = self
            .sessions
            .revoke_user(institution, user_id, None, self.clock.now());
        info!(%institution, %user_id, revoked, "Revoked user sessions");
        revoked
    }

    /// Change a user's role and revoke their outstanding sessions, so the
    /// old role stops working immediately.
    pub fn change_role(&self, institution: &str, user_id: UserId, role: Role) -> AuthResult<usize> {
        let previous = self.credentials.set_role(institution, user_id, role)?;
        if previous == role {
            return Ok(0);
        }
        info!(%institution, %user_id, from = %previous, to = %role, "Role changed");
        Ok(self.revoke_user(institution, user_id))
    }

    /// Drop expired and revoked records past the retention window.
    pub fn reap(&self) -> usize {
        let removed = self.sessions.reap(self.clock.now(), self.retention);
        if removed > 0 {
            debug!(removed, "Reaped session records");
        }
        removed
    }

    pub fn stats(&self) -> SessionStats {
        self.sessions.stats(self.clock.now())
    }
}

/// Periodically reap the session store until `shutdown` flips to `true`.
pub fn spawn_reaper(
    service: Arc<SessionService>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    service.reap();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Session reaper stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::{Clock, ManualClock};
    use crate::auth::error::AuthError;
    use crate::auth::gate::DenyReason;
    use crate::config::{Institution, Institutions};
    use crate::types::InstitutionId;

    fn institutions() -> Institutions {
        ["mangle_u", "other_u"]
            .into_iter()
            .map(|id| Institution {
                id: InstitutionId::new(id),
                base_url: url::Url::parse(&format!("https://{}.example.edu", id)).unwrap(),
            })
            .collect()
    }

    fn setup(config: SessionConfig) -> (SessionService, ManualClock) {
        let credentials = Arc::new(CredentialStore::new(&institutions()).unwrap());
        credentials
            .insert_with_password("mangle_u", UserId::new(42), Role::Admin, "secret")
            .unwrap();
        let clock = ManualClock::new(Utc::now());
        let service = SessionService::with_clock(
            credentials,
            &config,
            RoleGrants::strict(),
            Arc::new(clock.clone()),
        );
        (service, clock)
    }

    #[test]
    fn test_mangle_u_admin_scenario() {
        let (service, _) = setup(SessionConfig::default());

        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        let binding = service.validate(Some(issued.token.as_str())).unwrap();
        assert_eq!(binding.institution().as_str(), "mangle_u");
        assert_eq!(binding.user_id(), UserId::new(42));
        assert_eq!(binding.role(), Role::Admin);
        assert_eq!(binding.expires_at(), issued.expires_at);

        assert_eq!(service.authorize(&binding, "mangle_u", Role::Admin), Decision::Allow);
        assert_eq!(
            service.authorize(&binding, "mangle_u", Role::Instructor),
            Decision::Deny(DenyReason::RoleMismatch)
        );
        assert_eq!(
            service.authorize(&binding, "other_u", Role::Admin),
            Decision::Deny(DenyReason::InstitutionMismatch)
        );
    }

    #[test]
    fn test_bad_credentials_are_uniform() {
        let (service, _) = setup(SessionConfig::default());
        let wrong = service.issue("mangle_u", UserId::new(42), "wrong").unwrap_err();
        let absent = service
            .issue("mangle_u", UserId::new(9999), "anything")
            .unwrap_err();
        assert_eq!(wrong, AuthError::BadCredential);
        assert_eq!(absent, AuthError::BadCredential);
        assert!(service.sessions().is_empty());
    }

    #[test]
    fn test_default_ttl_is_one_day() {
        let (service, clock) = setup(SessionConfig::default());
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        assert_eq!(issued.expires_at, clock.now() + Duration::hours(24));
    }

    #[test]
    fn test_expired_token_never_validates() {
        let config = SessionConfig {
            token_ttl_seconds: 60,
            ..Default::default()
        };
        let (service, clock) = setup(config);
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();

        clock.advance(Duration::seconds(59));
        assert!(service.validate(Some(issued.token.as_str())).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(
            service.validate(Some(issued.token.as_str())),
            Err(AuthError::TokenExpired)
        );
        clock.advance(Duration::days(3));
        assert_eq!(
            service.validate(Some(issued.token.as_str())),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_validate_failure_kinds() {
        let (service, _) = setup(SessionConfig::default());
        assert_eq!(service.validate(None), Err(AuthError::TokenMissing));
        assert_eq!(service.validate(Some("")), Err(AuthError::TokenMissing));
        assert_eq!(service.validate(Some("%%%")), Err(AuthError::TokenMalformed));
        let stranger = BearerToken::generate();
        assert_eq!(
            service.validate(Some(stranger.as_str())),
            Err(AuthError::TokenUnknown)
        );
    }

    #[test]
    fn test_multiple_sessions_are_independent() {
        let (service, _) = setup(SessionConfig::default());
        let first = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        let second = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        assert_ne!(first.token, second.token);

        assert!(service.revoke(first.token.as_str()));
        assert_eq!(
            service.validate(Some(first.token.as_str())),
            Err(AuthError::TokenRevoked)
        );
        assert!(service.validate(Some(second.token.as_str())).is_ok());
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (service, clock) = setup(SessionConfig {
            token_ttl_seconds: 60,
            ..Default::default()
        });
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        assert!(service.revoke(issued.token.as_str()));
        assert!(!service.revoke(issued.token.as_str()));
        assert!(!service.revoke("garbage"));

        let expired = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        clock.advance(Duration::minutes(5));
        assert!(!service.revoke(expired.token.as_str()));
    }

    #[test]
    fn test_single_session_policy() {
        let (service, _) = setup(SessionConfig {
            single_session: true,
            ..Default::default()
        });
        let first = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        let second = service.issue("mangle_u", UserId::new(42), "secret").unwrap();

        assert_eq!(
            service.validate(Some(first.token.as_str())),
            Err(AuthError::TokenRevoked)
        );
        assert!(service.validate(Some(second.token.as_str())).is_ok());
    }

    #[test]
    fn test_sliding_expiry_extends_on_use() {
        let (service, clock) = setup(SessionConfig {
            token_ttl_seconds: 600,
            sliding_expiry: true,
            ..Default::default()
        });
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();

        clock.advance(Duration::seconds(500));
        let binding = service.validate(Some(issued.token.as_str())).unwrap();
        assert_eq!(binding.expires_at(), clock.now() + Duration::seconds(600));

        clock.advance(Duration::seconds(500));
        assert!(service.validate(Some(issued.token.as_str())).is_ok());

        clock.advance(Duration::seconds(601));
        assert_eq!(
            service.validate(Some(issued.token.as_str())),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_change_role_revokes_outstanding_tokens() {
        let (service, _) = setup(SessionConfig::default());
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();

        let revoked = service
            .change_role("mangle_u", UserId::new(42), Role::Instructor)
            .unwrap();
        assert_eq!(revoked, 1);
        assert_eq!(
            service.validate(Some(issued.token.as_str())),
            Err(AuthError::TokenRevoked)
        );

        let fresh = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        assert_eq!(fresh.binding.role(), Role::Instructor);

        // Same role again is a no-op.
        assert_eq!(
            service
                .change_role("mangle_u", UserId::new(42), Role::Instructor)
                .unwrap(),
            0
        );
        assert!(service.validate(Some(fresh.token.as_str())).is_ok());
    }

    #[test]
    fn test_require_combines_validate_and_authorize() {
        let (service, _) = setup(SessionConfig::default());
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        let token = Some(issued.token.as_str());

        assert!(service.require(token, "mangle_u", Role::Admin).is_ok());
        assert_eq!(
            service.require(token, "mangle_u", Role::Student),
            Err(AuthError::RoleMismatch)
        );
        assert_eq!(
            service.require(token, "other_u", Role::Admin),
            Err(AuthError::InstitutionMismatch)
        );
        assert_eq!(
            service.require(None, "mangle_u", Role::Admin),
            Err(AuthError::TokenMissing)
        );
    }

    #[test]
    fn test_reap_uses_retention() {
        let (service, clock) = setup(SessionConfig {
            token_ttl_seconds: 60,
            expired_retention_seconds: 60,
            ..Default::default()
        });
        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        service.revoke(issued.token.as_str());

        clock.advance(Duration::seconds(90));
        assert_eq!(service.reap(), 0);
        assert_eq!(
            service.validate(Some(issued.token.as_str())),
            Err(AuthError::TokenRevoked)
        );

        clock.advance(Duration::seconds(60));
        assert_eq!(service.reap(), 1);
        assert_eq!(service.stats(), SessionStats::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_for_same_user() {
        let (service, _) = setup(SessionConfig::default());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                tokio::task::spawn_blocking(move || {
                    service.issue("mangle_u", UserId::new(42), "secret")
                })
            })
            .collect();

        let mut tokens = std::collections::HashSet::new();
        for handle in handles {
            let issued = handle.await.unwrap().unwrap();
            tokens.insert(issued.token.into_inner());
        }
        assert_eq!(tokens.len(), 4);
        assert_eq!(service.stats().active, 4);
    }

    #[test]
    fn test_login_racing_role_change_never_keeps_old_role() {
        for _ in 0..8 {
            let (service, _) = setup(SessionConfig::default());
            let service = Arc::new(service);
            let start = Arc::new(std::sync::Barrier::new(2));

            let login = {
                let service = service.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    service.issue("mangle_u", UserId::new(42), "secret")
                })
            };
            let demote = {
                let service = service.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    service.change_role("mangle_u", UserId::new(42), Role::Student)
                })
            };

            demote.join().unwrap().unwrap();
            let issued = login.join().unwrap().unwrap();

            // Whatever the interleaving, the token never opens the admin area.
            match service.validate(Some(issued.token.as_str())) {
                Ok(binding) => assert_eq!(binding.role(), Role::Student),
                Err(e) => assert_eq!(e, AuthError::TokenRevoked),
            }
            assert!(
                service
                    .require(Some(issued.token.as_str()), "mangle_u", Role::Admin)
                    .is_err()
            );
        }
    }

    #[test]
    fn test_issue_binds_current_role() {
        let (service, _) = setup(SessionConfig::default());
        service
            .credentials()
            .set_role("mangle_u", UserId::new(42), Role::Instructor)
            .unwrap();

        let issued = service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        assert_eq!(issued.binding.role(), Role::Instructor);
        assert_eq!(
            service.validate(Some(issued.token.as_str())).unwrap().role(),
            Role::Instructor
        );
    }

    #[test]
    fn test_concurrent_single_session_logins_leave_one_live() {
        for _ in 0..4 {
            let (service, _) = setup(SessionConfig {
                single_session: true,
                ..Default::default()
            });
            let service = Arc::new(service);
            let start = Arc::new(std::sync::Barrier::new(2));

            let logins: Vec<_> = (0..2)
                .map(|_| {
                    let service = service.clone();
                    let start = start.clone();
                    std::thread::spawn(move || {
                        start.wait();
                        service.issue("mangle_u", UserId::new(42), "secret")
                    })
                })
                .collect();

            let live = logins
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .filter(|issued| service.validate(Some(issued.token.as_str())).is_ok())
                .count();
            assert_eq!(live, 1);
        }
    }

    #[test]
    fn test_out_of_range_expiry_is_an_error() {
        let credentials = Arc::new(CredentialStore::new(&institutions()).unwrap());
        credentials
            .insert_with_password("mangle_u", UserId::new(42), Role::Admin, "secret")
            .unwrap();
        let sessions = Arc::new(SessionStore::new());
        let issuer = TokenIssuer::new(
            credentials,
            sessions.clone(),
            IssuePolicy {
                ttl: Duration::MAX,
                single_session: false,
            },
            Arc::new(ManualClock::new(Utc::now())),
        );

        let err = issuer.issue("mangle_u", UserId::new(42), "secret").unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_runs_and_stops() {
        let (service, clock) = setup(SessionConfig {
            token_ttl_seconds: 60,
            expired_retention_seconds: 0,
            ..Default::default()
        });
        let service = Arc::new(service);
        service.issue("mangle_u", UserId::new(42), "secret").unwrap();
        clock.advance(Duration::seconds(61));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_reaper(service.clone(), std::time::Duration::from_secs(5), rx);

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert!(service.sessions().is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
