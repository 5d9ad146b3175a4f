//! Concurrent token → session map.
//!
//! Every operation touches a single key under its shard lock, so issue,
//! validate and revoke on the same token are linearizable: once
//! [`SessionStore::revoke`] returns, no later lookup can see the session as
//! active. Revoked sessions stay behind as tombstones until their expiry
//! (plus the retention window) so a revoked token keeps reporting
//! [`AuthError::TokenRevoked`] instead of turning into an unknown token.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::auth::context::SessionBinding;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::token::TokenDigest;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Revoked { at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct SessionRecord {
    binding: SessionBinding,
    state: SessionState,
    last_used: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<TokenDigest, SessionRecord>,
}

/// Counts reported by [`SessionStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub active: usize,
    pub expired: usize,
    pub revoked: usize,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly issued session.
    pub fn insert(&self, digest: TokenDigest, binding: SessionBinding) {
        let last_used = binding.issued_at();
        self.sessions.insert(
            digest,
            SessionRecord {
                binding,
                state: SessionState::Active,
                last_used,
            },
        );
    }

    /// Resolve a token digest to its binding.
    ///
    /// Revocation is checked before expiry. With `slide = Some(ttl)` a
    /// successful lookup moves the expiry to `now + ttl`; otherwise the
    /// lookup has no side effects.
    pub fn lookup(
        &self,
        digest: &TokenDigest,
        now: DateTime<Utc>,
        slide: Option<Duration>,
    ) -> AuthResult<SessionBinding> {
        match slide {
            None => {
                let record = self.sessions.get(digest).ok_or(AuthError::TokenUnknown)?;
                check(&record, now)?;
                Ok(record.binding.clone())
            }
            Some(ttl) => {
                let mut record = self
                    .sessions
                    .get_mut(digest)
                    .ok_or(AuthError::TokenUnknown)?;
                check(&record, now)?;
                let expires_at = now
                    .checked_add_signed(ttl)
                    .ok_or_else(|| AuthError::Internal("session expiry out of range".to_string()))?;
                record.binding = record.binding.extended_to(expires_at);
                record.last_used = now;
                Ok(record.binding.clone())
            }
        }
    }

    /// Turn a session into a tombstone.
    ///
    /// Returns whether a live session was revoked. Unknown, expired and
    /// already revoked tokens are accepted silently.
    pub fn revoke(&self, digest: &TokenDigest, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(digest) {
            Some(mut record) if record.state == SessionState::Active => {
                record.state = SessionState::Revoked { at: now };
                !record.binding.is_expired_at(now)
            }
            _ => false,
        }
    }

    /// Revoke every live session of one user, optionally sparing one token.
    ///
    /// Returns how many sessions were revoked.
    pub fn revoke_user(
        &self,
        institution: &str,
        user_id: UserId,
        except: Option<&TokenDigest>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut revoked = 0;
        for mut entry in self.sessions.iter_mut() {
            if Some(entry.key()) == except {
                continue;
            }
            let record = entry.value_mut();
            if record.state == SessionState::Active
                && record.binding.is_for(institution, user_id)
                && !record.binding.is_expired_at(now)
            {
                record.state = SessionState::Revoked { at: now };
                revoked += 1;
            }
        }
        revoked
    }

    /// Drop records whose expiry lies more than `retention` in the past.
    ///
    /// Returns how many records were removed.
    pub fn reap(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, record| {
                record
                    .binding
                    .expires_at()
                    .checked_add_signed(retention)
                    .is_none_or(|keep_until| keep_until > now)
            });
        before.saturating_sub(self.sessions.len())
    }

    pub fn last_used(&self, digest: &TokenDigest) -> Option<DateTime<Utc>> {
        self.sessions.get(digest).map(|r| r.last_used)
    }

    /// When a tombstone was written, if the token was revoked.
    pub fn revoked_at(&self, digest: &TokenDigest) -> Option<DateTime<Utc>> {
        self.sessions.get(digest).and_then(|r| match r.state {
            SessionState::Revoked { at } => Some(at),
            SessionState::Active => None,
        })
    }

    pub fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        let mut stats = SessionStats::default();
        for entry in self.sessions.iter() {
            match entry.state {
                SessionState::Revoked { .. } => stats.revoked += 1,
                SessionState::Active if entry.binding.is_expired_at(now) => stats.expired += 1,
                SessionState::Active => stats.active += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn check(record: &SessionRecord, now: DateTime<Utc>) -> AuthResult<()> {
    if let SessionState::Revoked { .. } = record.state {
        return Err(AuthError::TokenRevoked);
    }
    if record.binding.is_expired_at(now) {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}
