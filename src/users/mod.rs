//! Tenant-scoped user profiles and account creation.
//!
//! Profiles are owned here, credentials by [`crate::auth::CredentialStore`].
//! A user exists for the auth core as soon as it has credentials; the
//! profile is what the role-scoped home endpoints serve.

pub mod admins;
pub mod instructors;
pub mod students;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{AuthError, AuthResult, CredentialStore};
use crate::config::Institutions;
use crate::types::{InstitutionId, Role, UserId, Username};

use admins::{AdminProfile, Notification, Severity};

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 200;

/// Profile of an instructor or a student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub name: String,
    pub pronouns: String,
    pub birthdate: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub created_by: UserId,
}

/// One entry of a bulk creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    #[serde(default)]
    pub name: String,
    /// RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    #[serde(default)]
    pub birthdate: String,
    #[serde(default)]
    pub pronouns: String,
}

/// Credentials of a freshly created account. Shown once, never stored.
#[derive(Debug, Serialize)]
pub struct CreatedCredential {
    pub user_id: UserId,
    pub password: Zeroizing<String>,
}

/// Why one entry of a batch was not created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationFailure {
    /// Position in the request.
    pub index: usize,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: Vec<CreatedCredential>,
    pub failures: Vec<CreationFailure>,
}

#[derive(Default)]
struct TenantDirectory {
    admins: DashMap<UserId, AdminProfile>,
    instructors: DashMap<UserId, Profile>,
    students: DashMap<UserId, Profile>,
    notifications: DashMap<UserId, Vec<Notification>>,
}

impl TenantDirectory {
    fn profiles(&self, role: Role) -> Option<&DashMap<UserId, Profile>> {
        match role {
            Role::Instructor => Some(&self.instructors),
            Role::Student => Some(&self.students),
            Role::Admin => None,
        }
    }
}

/// Profile storage for every configured institution.
pub struct Directory {
    tenants: HashMap<InstitutionId, TenantDirectory>,
}

impl Directory {
    pub fn new(institutions: &Institutions) -> Self {
        Self {
            tenants: institutions
                .ids()
                .map(|id| (id.clone(), TenantDirectory::default()))
                .collect(),
        }
    }

    fn tenant(&self, institution: &str) -> AuthResult<&TenantDirectory> {
        self.tenants
            .get(institution)
            .ok_or(AuthError::UnknownInstitution)
    }

    pub fn admin(&self, institution: &str, user_id: UserId) -> Option<AdminProfile> {
        self.tenant(institution)
            .ok()?
            .admins
            .get(&user_id)
            .map(|a| a.clone())
    }

    pub fn admin_by_username(&self, institution: &str, username: &Username) -> Option<AdminProfile> {
        self.tenant(institution)
            .ok()?
            .admins
            .iter()
            .find(|a| &a.username == username)
            .map(|a| a.clone())
    }

    pub fn upsert_admin(&self, institution: &str, profile: AdminProfile) -> AuthResult<()> {
        self.tenant(institution)?
            .admins
            .insert(profile.user_id, profile);
        Ok(())
    }

    /// Instructor or student profile.
    pub fn profile(&self, institution: &str, role: Role, user_id: UserId) -> Option<Profile> {
        self.tenant(institution)
            .ok()?
            .profiles(role)?
            .get(&user_id)
            .map(|p| p.clone())
    }

    pub fn insert_profile(&self, institution: &str, role: Role, profile: Profile) -> AuthResult<()> {
        let profiles = self
            .tenant(institution)?
            .profiles(role)
            .ok_or_else(|| AuthError::Internal("admins have no plain profile".to_string()))?;
        profiles.insert(profile.user_id, profile);
        Ok(())
    }

    pub fn profile_count(&self, institution: &str, role: Role) -> usize {
        match role {
            Role::Admin => self.tenant(institution).map(|t| t.admins.len()).unwrap_or(0),
            _ => self
                .tenant(institution)
                .ok()
                .and_then(|t| t.profiles(role))
                .map(|p| p.len())
                .unwrap_or(0),
        }
    }

    pub fn notifications(&self, institution: &str, user_id: UserId) -> Vec<Notification> {
        self.tenant(institution)
            .ok()
            .and_then(|t| t.notifications.get(&user_id).map(|n| n.clone()))
            .unwrap_or_default()
    }

    pub fn notify(&self, institution: &str, user_id: UserId, notification: Notification) -> AuthResult<()> {
        self.tenant(institution)?
            .notifications
            .entry(user_id)
            .or_default()
            .push(notification);
        Ok(())
    }
}

/// Check one creation entry, returning its parsed birthdate.
pub fn validate_new_profile(entry: &NewProfile, now: DateTime<Utc>) -> AuthResult<DateTime<Utc>> {
    let name = entry.name.trim();
    if name.is_empty() {
        return Err(AuthError::ValidationFailure("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::ValidationFailure(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    if entry.pronouns.trim().is_empty() {
        return Err(AuthError::ValidationFailure("pronouns must not be empty".to_string()));
    }
    let birthdate = parse_birthdate(&entry.birthdate)?;
    if birthdate > now {
        return Err(AuthError::ValidationFailure(
            "birthdate must not be in the future".to_string(),
        ));
    }
    Ok(birthdate)
}

fn parse_birthdate(raw: &str) -> AuthResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            AuthError::ValidationFailure(format!("birthdate `{}` is not a date", raw))
        })
}

/// Create accounts and profiles for a batch, one entry at a time.
///
/// Entries fail independently: a bad entry is reported with its index and
/// the rest of the batch carries on. When anything failed, the creating
/// admin also gets a notification.
pub fn create_batch(
    credentials: &CredentialStore,
    directory: &Directory,
    institution: &str,
    role: Role,
    created_by: UserId,
    entries: Vec<NewProfile>,
    now: DateTime<Utc>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let total = entries.len();

    for (index, entry) in entries.into_iter().enumerate() {
        let created = validate_new_profile(&entry, now).and_then(|birthdate| {
            let (record, password) = credentials.create_user(institution, role)?;
            directory.insert_profile(
                institution,
                role,
                Profile {
                    user_id: record.user_id,
                    name: entry.name.trim().to_string(),
                    pronouns: entry.pronouns.trim().to_string(),
                    birthdate,
                    created_at: now,
                    created_by,
                },
            )?;
            Ok(CreatedCredential {
                user_id: record.user_id,
                password,
            })
        });

        match created {
            Ok(credential) => {
                debug!(%institution, %role, user_id = %credential.user_id, "Created account");
                outcome.created.push(credential);
            }
            Err(e) => {
                warn!(%institution, %role, index, reason = e.code(), "Skipped batch entry");
                outcome.failures.push(CreationFailure {
                    index,
                    reason: e.code(),
                    message: e.to_string(),
                });
            }
        }
    }

    if !outcome.failures.is_empty() {
        let message = format!(
            "{} of {} {} accounts could not be created",
            outcome.failures.len(),
            total,
            role
        );
        if let Err(e) = directory.notify(
            institution,
            created_by,
            Notification::new(Severity::Warning, message),
        ) {
            warn!(%institution, "Could not record batch notification: {}", e);
        }
    }

    outcome
}
