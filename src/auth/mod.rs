//! Authentication and session core.
//!
//! This module owns everything between "a client typed a password" and
//! "a handler may run for this tenant and role":
//!
//! - **Credentials**: per-institution accounts with Argon2id password hashes
//! - **Issuer**: verifies credentials and mints opaque bearer tokens
//! - **Session store**: concurrent token → binding map with revocation tombstones
//! - **Validator**: resolves a presented token or says why not
//! - **Gate**: tenant check first, then role check
//! - **Extractor**: axum glue that runs validator and gate per request
//!
//! ## Security Model
//!
//! - Tokens carry 256 bits from the OS random source; only their SHA-256
//!   digest is stored
//! - A wrong password and an unknown user are the same failure
//! - A token issued for one institution never opens another institution's
//!   resources, whatever its role
//! - Roles are strict; widening needs an explicit grant table
//!
//! ## Usage
//!
//! ```ignore
//! let issued = service.issue("mangle_u", UserId::new(42), "secret")?;
//! let binding = service.require(Some(issued.token.as_str()), "mangle_u", Role::Admin)?;
//! service.revoke(issued.token.as_str());
//! ```

pub mod clock;
mod context;
pub mod credentials;
mod error;
mod extractor;
mod gate;
mod issuer;
mod service;
mod session_store;
mod token;
mod validator;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::SessionBinding;
pub use credentials::{CredentialStore, UserRecord, generate_password, hash_password};
pub use error::{AuthError, AuthResult, FailureKind};
pub use extractor::{
    AdminArea, Authorized, BEARER_COOKIE, InstructorArea, RoleArea, StudentArea, presented_token,
};
pub use gate::{AuthorizationGate, Decision, DenyReason, RoleGrants};
pub use issuer::{IssuePolicy, IssuedToken, TokenIssuer};
pub use service::{SessionService, spawn_reaper};
pub use session_store::{SessionStats, SessionStore};
pub use token::{BearerToken, TOKEN_BYTES, TokenDigest, parse_authorization};
pub use validator::TokenValidator;
