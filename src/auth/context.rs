//! Session binding for request-scoped identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{InstitutionId, Role, UserId};

/// The claim a bearer token stands for.
///
/// Created once at issuance and never changed afterwards; the institution
/// and role in particular stay fixed for the token's whole life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBinding {
    /// Tenant the session was issued for
    institution: InstitutionId,
    /// User within that tenant
    user_id: UserId,
    /// Role at issuance time
    role: Role,
    /// When the token was minted
    issued_at: DateTime<Utc>,
    /// When the token stops being accepted
    expires_at: DateTime<Utc>,
}

impl SessionBinding {
    pub fn new(
        institution: InstitutionId,
        user_id: UserId,
        role: Role,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            institution,
            user_id,
            role,
            issued_at,
            expires_at,
        }
    }

    pub fn institution(&self) -> &InstitutionId {
        &self.institution
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the binding has run out at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether this binding belongs to the given user.
    pub fn is_for(&self, institution: &str, user_id: UserId) -> bool {
        self.institution.as_str() == institution && self.user_id == user_id
    }

    /// Copy of this binding with a later expiry, used by sliding expiry.
    pub(crate) fn extended_to(&self, expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            ..self.clone()
        }
    }
}
