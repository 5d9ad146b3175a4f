//! Authorization gate: may this session enter this tenant's role area?

use std::collections::{BTreeMap, BTreeSet};

use crate::auth::context::SessionBinding;
use crate::auth::error::AuthError;
use crate::types::Role;

/// Why the gate said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InstitutionMismatch,
    RoleMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::InstitutionMismatch) => Err(AuthError::InstitutionMismatch),
            Decision::Deny(DenyReason::RoleMismatch) => Err(AuthError::RoleMismatch),
        }
    }
}

/// Explicit role widening table.
///
/// Empty by default, meaning strict role equality. An entry
/// `admin -> {instructor}` lets admin sessions into instructor areas; there
/// is no transitive inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants(BTreeMap<Role, BTreeSet<Role>>);

impl RoleGrants {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn with_grant(mut self, holder: Role, granted: Role) -> Self {
        self.0.entry(holder).or_default().insert(granted);
        self
    }

    /// Whether a session holding `holder` may act in an area requiring `required`.
    pub fn permits(&self, holder: Role, required: Role) -> bool {
        holder == required
            || self
                .0
                .get(&holder)
                .is_some_and(|granted| granted.contains(&required))
    }
}

impl From<&BTreeMap<Role, Vec<Role>>> for RoleGrants {
    fn from(table: &BTreeMap<Role, Vec<Role>>) -> Self {
        Self(
            table
                .iter()
                .map(|(holder, granted)| (*holder, granted.iter().copied().collect()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    grants: RoleGrants,
}

impl AuthorizationGate {
    pub fn new(grants: RoleGrants) -> Self {
        Self { grants }
    }

    /// Decide whether `binding` may access `requested_role`'s area of
    /// `requested_institution`.
    ///
    /// The tenant check always runs first: a session from another
    /// institution is reported as [`DenyReason::InstitutionMismatch`] even
    /// when its role would also be wrong.
    pub fn authorize(
        &self,
        binding: &SessionBinding,
        requested_institution: &str,
        requested_role: Role,
    ) -> Decision {
        if binding.institution().as_str() != requested_institution {
            return Decision::Deny(DenyReason::InstitutionMismatch);
        }
        if !self.grants.permits(binding.role(), requested_role) {
            return Decision::Deny(DenyReason::RoleMismatch);
        }
        Decision::Allow
    }
}
