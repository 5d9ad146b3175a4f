//! Error taxonomy for the authentication core.

use std::fmt;

/// Every way an authentication or authorization step can fail.
///
/// Variants are grouped by how the HTTP boundary reports them; see
/// [`AuthError::kind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong user id or password. Also returned when the user does not
    /// exist, so the two cases cannot be told apart.
    BadCredential,
    /// No bearer token was presented.
    TokenMissing,
    /// The token's expiry has passed.
    TokenExpired,
    /// The token was explicitly revoked.
    TokenRevoked,
    /// The token could not be parsed or decoded.
    TokenMalformed,
    /// The token decoded fine but no session exists for it.
    TokenUnknown,
    /// The session belongs to a different institution.
    InstitutionMismatch,
    /// The session's role does not match the role the resource requires.
    RoleMismatch,
    /// The role matches but a required permission is missing.
    PermissionDenied,
    /// The institution key is not configured.
    UnknownInstitution,
    /// The institution's backend host could not be reached.
    TenantUnreachable(String),
    /// The request body failed validation.
    ValidationFailure(String),
    /// Something broke that the caller cannot fix.
    Internal(String),
}

/// How a failure is surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    Authorization,
    NotFound,
    BadRequest,
    Institution,
}

impl AuthError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::BadCredential
            | Self::TokenMissing
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenMalformed
            | Self::TokenUnknown => FailureKind::Authentication,
            Self::InstitutionMismatch | Self::RoleMismatch | Self::PermissionDenied => {
                FailureKind::Authorization
            }
            Self::UnknownInstitution => FailureKind::NotFound,
            Self::ValidationFailure(_) => FailureKind::BadRequest,
            Self::TenantUnreachable(_) | Self::Internal(_) => FailureKind::Institution,
        }
    }

    /// Stable machine-readable code, used in logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadCredential => "bad_credential",
            Self::TokenMissing => "token_missing",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::TokenMalformed => "token_malformed",
            Self::TokenUnknown => "token_unknown",
            Self::InstitutionMismatch => "institution_mismatch",
            Self::RoleMismatch => "role_mismatch",
            Self::PermissionDenied => "permission_denied",
            Self::UnknownInstitution => "unknown_institution",
            Self::TenantUnreachable(_) => "tenant_unreachable",
            Self::ValidationFailure(_) => "validation_failure",
            Self::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadCredential => write!(f, "Invalid user id or password"),
            Self::TokenMissing => write!(f, "No bearer token presented"),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::TokenRevoked => write!(f, "Token has been revoked"),
            Self::TokenMalformed => write!(f, "Token is malformed"),
            Self::TokenUnknown => write!(f, "Token is not recognised"),
            Self::InstitutionMismatch => write!(f, "Session belongs to another institution"),
            Self::RoleMismatch => write!(f, "Session role does not grant access to this area"),
            Self::PermissionDenied => write!(f, "Missing permission for this operation"),
            Self::UnknownInstitution => write!(f, "Unknown institution"),
            Self::TenantUnreachable(msg) => write!(f, "Institution unreachable: {}", msg),
            Self::ValidationFailure(msg) => write!(f, "Validation failed: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_are_authentication() {
        for err in [
            AuthError::BadCredential,
            AuthError::TokenMissing,
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::TokenMalformed,
            AuthError::TokenUnknown,
        ] {
            assert_eq!(err.kind(), FailureKind::Authentication, "{:?}", err);
        }
    }

    #[test]
    fn test_gate_failures_are_authorization() {
        for err in [
            AuthError::InstitutionMismatch,
            AuthError::RoleMismatch,
            AuthError::PermissionDenied,
        ] {
            assert_eq!(err.kind(), FailureKind::Authorization, "{:?}", err);
        }
    }

    #[test]
    fn test_other_kinds() {
        assert_eq!(AuthError::UnknownInstitution.kind(), FailureKind::NotFound);
        assert_eq!(
            AuthError::ValidationFailure("x".into()).kind(),
            FailureKind::BadRequest
        );
        assert_eq!(
            AuthError::TenantUnreachable("down".into()).kind(),
            FailureKind::Institution
        );
        assert_eq!(AuthError::Internal("x".into()).kind(), FailureKind::Institution);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AuthError::BadCredential.to_string(),
            "Invalid user id or password"
        );
        assert_eq!(
            AuthError::ValidationFailure("name is empty".into()).to_string(),
            "Validation failed: name is empty"
        );
        assert_eq!(AuthError::TokenRevoked.code(), "token_revoked");
    }

    #[test]
    fn test_from_anyhow() {
        let err: AuthError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, AuthError::Internal(msg) if msg.contains("disk on fire")));
    }
}
