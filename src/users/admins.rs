//! Institution administrators.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{AuthError, AuthResult, CredentialStore};
use crate::config::BootstrapAdmin;
use crate::types::{Role, UserId, Username};

use super::{CreatedCredential, Directory};

/// Actions an admin may be allowed to take inside their institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminPermission {
    CreateStudent,
    DeleteStudent,
    CreateInstructor,
    DeleteInstructor,
    CreateCourse,
    DeleteCourse,
    AssignInstructor,
    CreateAdmin,
    DeleteAdmin,
}

impl AdminPermission {
    pub const ALL: [AdminPermission; 9] = [
        AdminPermission::CreateStudent,
        AdminPermission::DeleteStudent,
        AdminPermission::CreateInstructor,
        AdminPermission::DeleteInstructor,
        AdminPermission::CreateCourse,
        AdminPermission::DeleteCourse,
        AdminPermission::AssignInstructor,
        AdminPermission::CreateAdmin,
        AdminPermission::DeleteAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminPermission::CreateStudent => "create_student",
            AdminPermission::DeleteStudent => "delete_student",
            AdminPermission::CreateInstructor => "create_instructor",
            AdminPermission::DeleteInstructor => "delete_instructor",
            AdminPermission::CreateCourse => "create_course",
            AdminPermission::DeleteCourse => "delete_course",
            AdminPermission::AssignInstructor => "assign_instructor",
            AdminPermission::CreateAdmin => "create_admin",
            AdminPermission::DeleteAdmin => "delete_admin",
        }
    }

    /// Permission needed to create accounts of `role`.
    pub fn to_create(role: Role) -> Self {
        match role {
            Role::Student => AdminPermission::CreateStudent,
            Role::Instructor => AdminPermission::CreateInstructor,
            Role::Admin => AdminPermission::CreateAdmin,
        }
    }
}

impl fmt::Display for AdminPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminProfile {
    pub user_id: UserId,
    pub username: Username,
    pub created_at: DateTime<Utc>,
    pub permissions: BTreeSet<AdminPermission>,
}

impl AdminProfile {
    pub fn can(&self, permission: AdminPermission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Body of `GET /{institution}/admin/home`.
#[derive(Debug, Serialize)]
pub struct AdminHome {
    #[serde(flatten)]
    pub profile: AdminProfile,
    pub notifications: Vec<Notification>,
}

/// Load the admin's home, or `RoleMismatch` when the session's user has
/// credentials but no admin profile.
pub fn home(directory: &Directory, institution: &str, user_id: UserId) -> AuthResult<AdminHome> {
    let profile = directory
        .admin(institution, user_id)
        .ok_or(AuthError::RoleMismatch)?;
    Ok(AdminHome {
        notifications: directory.notifications(institution, user_id),
        profile,
    })
}

/// Admin profile of the caller holding `permission`.
pub fn require_permission(
    directory: &Directory,
    institution: &str,
    user_id: UserId,
    permission: AdminPermission,
) -> AuthResult<AdminProfile> {
    let profile = directory
        .admin(institution, user_id)
        .ok_or(AuthError::RoleMismatch)?;
    if !profile.can(permission) {
        return Err(AuthError::PermissionDenied);
    }
    Ok(profile)
}

/// Make sure a configured admin exists.
///
/// An admin that already exists only gets its permissions replaced and
/// `None` is returned. A new admin gets a generated password, returned
/// here exactly once.
pub fn bootstrap_admin(
    credentials: &CredentialStore,
    directory: &Directory,
    institution: &str,
    admin: &BootstrapAdmin,
    now: DateTime<Utc>,
) -> AuthResult<Option<CreatedCredential>> {
    let permissions: BTreeSet<AdminPermission> = admin.permissions.iter().copied().collect();

    if let Some(mut existing) = directory.admin_by_username(institution, &admin.username) {
        existing.permissions = permissions;
        directory.upsert_admin(institution, existing)?;
        return Ok(None);
    }

    let (record, password) = credentials.create_user(institution, Role::Admin)?;
    directory.upsert_admin(
        institution,
        AdminProfile {
            user_id: record.user_id,
            username: admin.username.clone(),
            created_at: now,
            permissions,
        },
    )?;
    directory.notify(
        institution,
        record.user_id,
        Notification::new(Severity::Info, "Account created. Change the generated password."),
    )?;
    info!(
        %institution,
        username = %admin.username,
        user_id = %record.user_id,
        "Bootstrapped admin"
    );

    Ok(Some(CreatedCredential {
        user_id: record.user_id,
        password,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Institution, Institutions};
    use crate::types::InstitutionId;

    fn setup() -> (CredentialStore, Directory) {
        let institutions: Institutions = [Institution {
            id: InstitutionId::new("mangle_u"),
            base_url: url::Url::parse("https://mangle.example.edu").unwrap(),
        }]
        .into_iter()
        .collect();
        (
            CredentialStore::new(&institutions).unwrap(),
            Directory::new(&institutions),
        )
    }

    fn bootstrap(permissions: Vec<AdminPermission>) -> BootstrapAdmin {
        BootstrapAdmin {
            username: Username::new("registrar"),
            permissions,
        }
    }

    #[test]
    fn test_permission_serde_names() {
        for permission in AdminPermission::ALL {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.as_str()));
            let back: AdminPermission = serde_json::from_str(&json).unwrap();
            assert_eq!(back, permission);
        }
        assert!(serde_json::from_str::<AdminPermission>("\"fly\"").is_err());
    }

    #[test]
    fn test_bootstrap_creates_admin_once() {
        let (credentials, directory) = setup();
        let now = Utc::now();

        let created = bootstrap_admin(
            &credentials,
            &directory,
            "mangle_u",
            &bootstrap(vec![AdminPermission::CreateStudent]),
            now,
        )
        .unwrap()
        .expect("first bootstrap creates the admin");

        let record = credentials
            .verify("mangle_u", created.user_id, &created.password)
            .unwrap();
        assert_eq!(record.role, Role::Admin);

        let again = bootstrap_admin(
            &credentials,
            &directory,
            "mangle_u",
            &bootstrap(vec![AdminPermission::CreateStudent, AdminPermission::CreateInstructor]),
            now,
        )
        .unwrap();
        assert!(again.is_none());
        assert_eq!(credentials.user_count("mangle_u"), 1);

        let home = home(&directory, "mangle_u", created.user_id).unwrap();
        assert!(home.profile.can(AdminPermission::CreateInstructor));
        assert_eq!(home.notifications.len(), 1);
        assert_eq!(home.notifications[0].severity, Severity::Info);
    }

    #[test]
    fn test_require_permission() {
        let (credentials, directory) = setup();
        let created = bootstrap_admin(
            &credentials,
            &directory,
            "mangle_u",
            &bootstrap(vec![AdminPermission::CreateStudent]),
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        assert!(
            require_permission(&directory, "mangle_u", created.user_id, AdminPermission::CreateStudent)
                .is_ok()
        );
        assert_eq!(
            require_permission(&directory, "mangle_u", created.user_id, AdminPermission::CreateInstructor)
                .unwrap_err(),
            AuthError::PermissionDenied
        );
        assert_eq!(
            require_permission(&directory, "mangle_u", UserId::new(7), AdminPermission::CreateStudent)
                .unwrap_err(),
            AuthError::RoleMismatch
        );
    }

    #[test]
    fn test_home_without_profile() {
        let (_, directory) = setup();
        assert_eq!(
            home(&directory, "mangle_u", UserId::new(9)).unwrap_err(),
            AuthError::RoleMismatch
        );
    }
}
