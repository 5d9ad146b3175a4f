//! Per-institution credential storage and verification.

use std::collections::HashMap;

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::Zeroizing;

use crate::auth::error::{AuthError, AuthResult};
use crate::config::Institutions;
use crate::types::{InstitutionId, Role, UserId};

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LEN: usize = 18;

/// A stored account. The password hash never leaves this module.
#[derive(Clone)]
pub struct UserRecord {
    pub institution: InstitutionId,
    pub user_id: UserId,
    pub role: Role,
    password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("institution", &self.institution)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Credential store for every configured institution.
///
/// The set of institutions is fixed at construction. Lookups go through a
/// sharded map per institution; account creation claims its id through the
/// map's entry API so concurrent creations never overwrite each other.
pub struct CredentialStore {
    institutions: HashMap<InstitutionId, DashMap<UserId, UserRecord>>,
    /// Verified against when the user does not exist, so a miss costs the
    /// same as a wrong password.
    dummy_hash: String,
}

impl CredentialStore {
    pub fn new(institutions: &Institutions) -> anyhow::Result<Self> {
        let dummy = generate_password();
        Ok(Self {
            institutions: institutions
                .ids()
                .map(|id| (id.clone(), DashMap::new()))
                .collect(),
            dummy_hash: hash_password(&dummy)?,
        })
    }

    fn users(&self, institution: &str) -> AuthResult<&DashMap<UserId, UserRecord>> {
        self.institutions
            .get(institution)
            .ok_or(AuthError::UnknownInstitution)
    }

    /// Check a user id and password.
    ///
    /// A missing user and a wrong password both yield
    /// [`AuthError::BadCredential`].
    pub fn verify(&self, institution: &str, user_id: UserId, password: &str) -> AuthResult<UserRecord> {
        let users = self.users(institution)?;
        // Clone out so the hash check runs without holding the shard lock.
        let record = users.get(&user_id).map(|r| r.clone());

        match record {
            Some(record) => {
                if verify_password(&record.password_hash, password)? {
                    Ok(record)
                } else {
                    debug!(%institution, %user_id, "Password mismatch");
                    Err(AuthError::BadCredential)
                }
            }
            None => {
                let _ = verify_password(&self.dummy_hash, password);
                debug!(%institution, %user_id, "No such user");
                Err(AuthError::BadCredential)
            }
        }
    }

    /// Create an account with a random id and a generated password.
    ///
    /// The password is returned once and never stored in plaintext.
    pub fn create_user(
        &self,
        institution: &str,
        role: Role,
    ) -> AuthResult<(UserRecord, Zeroizing<String>)> {
        let users = self.users(institution)?;
        let password = generate_password();
        let password_hash = hash_password(&password)?;

        loop {
            let user_id = UserId::random();
            if let Entry::Vacant(slot) = users.entry(user_id) {
                let record = UserRecord {
                    institution: InstitutionId::new(institution),
                    user_id,
                    role,
                    password_hash,
                };
                slot.insert(record.clone());
                return Ok((record, password));
            }
        }
    }

    /// Create an account with a caller-chosen id and password.
    pub fn insert_with_password(
        &self,
        institution: &str,
        user_id: UserId,
        role: Role,
        password: &str,
    ) -> AuthResult<UserRecord> {
        let users = self.users(institution)?;
        let password_hash = hash_password(password)?;

        match users.entry(user_id) {
            Entry::Occupied(_) => Err(AuthError::ValidationFailure(format!(
                "user {} already exists",
                user_id
            ))),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    institution: InstitutionId::new(institution),
                    user_id,
                    role,
                    password_hash,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// Change a user's role, returning the previous one.
    ///
    /// Outstanding sessions keep their old role; use
    /// [`crate::auth::SessionService::change_role`] to revoke them as well.
    pub fn set_role(&self, institution: &str, user_id: UserId, role: Role) -> AuthResult<Role> {
        let users = self.users(institution)?;
        let mut record = users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::ValidationFailure(format!("no user {}", user_id)))?;
        Ok(std::mem::replace(&mut record.role, role))
    }

    pub fn get(&self, institution: &str, user_id: UserId) -> Option<UserRecord> {
        self.institutions
            .get(institution)?
            .get(&user_id)
            .map(|r| r.clone())
    }

    pub fn user_count(&self, institution: &str) -> usize {
        self.institutions
            .get(institution)
            .map(|users| users.len())
            .unwrap_or(0)
    }
}

/// Generate an alphanumeric password from the OS random source.
pub fn generate_password() -> Zeroizing<String> {
    let mut password = Zeroizing::new(String::with_capacity(GENERATED_PASSWORD_LEN));
    Alphanumeric.append_string(&mut OsRng, &mut password, GENERATED_PASSWORD_LEN);
    password
}

/// Hash a password into an Argon2id PHC string with a fresh salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Hashing password: {}", e))
}

fn verify_password(hash: &str, password: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("Stored password hash is unreadable: {}", e)))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!("Verifying password: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Institution;

    fn institutions() -> Institutions {
        ["mangle_u", "other_u"]
            .into_iter()
            .map(|id| Institution {
                id: InstitutionId::new(id),
                base_url: url::Url::parse(&format!("https://{}.example.edu", id)).unwrap(),
            })
            .collect()
    }

    fn store_with_admin() -> CredentialStore {
        let store = CredentialStore::new(&institutions()).unwrap();
        store
            .insert_with_password("mangle_u", UserId::new(42), Role::Admin, "secret")
            .unwrap();
        store
    }

    #[test]
    fn test_verify_success() {
        let store = store_with_admin();
        let user = store.verify("mangle_u", UserId::new(42), "secret").unwrap();
        assert_eq!(user.user_id, UserId::new(42));
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.institution.as_str(), "mangle_u");
    }

    #[test]
    fn test_wrong_password_and_missing_user_are_indistinguishable() {
        let store = store_with_admin();
        let wrong = store.verify("mangle_u", UserId::new(42), "wrong").unwrap_err();
        let missing = store
            .verify("mangle_u", UserId::new(9999), "anything")
            .unwrap_err();
        assert_eq!(wrong, AuthError::BadCredential);
        assert_eq!(wrong, missing);
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[test]
    fn test_user_ids_are_scoped_per_institution() {
        let store = store_with_admin();
        let err = store.verify("other_u", UserId::new(42), "secret").unwrap_err();
        assert_eq!(err, AuthError::BadCredential);

        store
            .insert_with_password("other_u", UserId::new(42), Role::Student, "hunter2")
            .unwrap();
        let other = store.verify("other_u", UserId::new(42), "hunter2").unwrap();
        assert_eq!(other.role, Role::Student);
    }

    #[test]
    fn test_unknown_institution() {
        let store = store_with_admin();
        let err = store.verify("nowhere", UserId::new(42), "secret").unwrap_err();
        assert_eq!(err, AuthError::UnknownInstitution);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = store_with_admin();
        let err = store
            .insert_with_password("mangle_u", UserId::new(42), Role::Student, "x")
            .unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailure(_)));
        // The original account is untouched.
        assert!(store.verify("mangle_u", UserId::new(42), "secret").is_ok());
    }

    #[test]
    fn test_create_user_generates_usable_credentials() {
        let store = CredentialStore::new(&institutions()).unwrap();
        let (record, password) = store.create_user("mangle_u", Role::Student).unwrap();
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        let verified = store.verify("mangle_u", record.user_id, &password).unwrap();
        assert_eq!(verified.role, Role::Student);
        assert_eq!(store.user_count("mangle_u"), 1);
        assert_eq!(store.user_count("other_u"), 0);
    }

    #[test]
    fn test_set_role() {
        let store = store_with_admin();
        let previous = store
            .set_role("mangle_u", UserId::new(42), Role::Instructor)
            .unwrap();
        assert_eq!(previous, Role::Admin);
        assert_eq!(
            store.get("mangle_u", UserId::new(42)).unwrap().role,
            Role::Instructor
        );
        assert!(store
            .set_role("mangle_u", UserId::new(7), Role::Student)
            .is_err());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password(&a, "same").unwrap());
        assert!(!verify_password(&a, "different").unwrap());
    }

    #[test]
    fn test_debug_hides_hash() {
        let store = store_with_admin();
        let record = store.get("mangle_u", UserId::new(42)).unwrap();
        let rendered = format!("{:?}", record);
        assert!(!rendered.contains("argon2"));
    }
}
