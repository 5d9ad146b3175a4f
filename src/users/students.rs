//! Students: home view and bulk creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthResult, CredentialStore};
use crate::types::{Role, UserId};

use super::admins::{AdminPermission, require_permission};
use super::{CreatedCredential, CreationFailure, Directory, NewProfile, Profile, create_batch};

/// Body of `GET /{institution}/student/home`.
#[derive(Debug, Serialize)]
pub struct StudentHome {
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct CreateStudents {
    pub students: Vec<NewProfile>,
}

#[derive(Debug, Serialize)]
pub struct CreatedStudents {
    pub students: Vec<CreatedCredential>,
    pub failures: Vec<CreationFailure>,
}

pub fn home(directory: &Directory, institution: &str, user_id: UserId) -> AuthResult<StudentHome> {
    directory
        .profile(institution, Role::Student, user_id)
        .map(|profile| StudentHome { profile })
        .ok_or(AuthError::RoleMismatch)
}

/// Create a batch of students on behalf of `admin`, who needs `create_student`.
pub fn create(
    credentials: &CredentialStore,
    directory: &Directory,
    institution: &str,
    admin: UserId,
    request: CreateStudents,
    now: DateTime<Utc>,
) -> AuthResult<CreatedStudents> {
    require_permission(directory, institution, admin, AdminPermission::CreateStudent)?;
    let outcome = create_batch(
        credentials,
        directory,
        institution,
        Role::Student,
        admin,
        request.students,
        now,
    );
    Ok(CreatedStudents {
        students: outcome.created,
        failures: outcome.failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootstrapAdmin, Institution, Institutions};
    use crate::types::{InstitutionId, Username};
    use crate::users::admins::bootstrap_admin;

    #[test]
    fn test_create_then_home() {
        let institutions: Institutions = [Institution {
            id: InstitutionId::new("mangle_u"),
            base_url: url::Url::parse("https://mangle.example.edu").unwrap(),
        }]
        .into_iter()
        .collect();
        let credentials = CredentialStore::new(&institutions).unwrap();
        let directory = Directory::new(&institutions);
        let now = Utc::now();

        let admin = bootstrap_admin(
            &credentials,
            &directory,
            "mangle_u",
            &BootstrapAdmin {
                username: Username::new("registrar"),
                permissions: vec![AdminPermission::CreateStudent],
            },
            now,
        )
        .unwrap()
        .unwrap();

        let request: CreateStudents = serde_json::from_value(serde_json::json!({
            "students": [
                {"name": "Grace Hopper", "birthdate": "1906-12-09", "pronouns": "she/her"}
            ]
        }))
        .unwrap();
        let created = create(&credentials, &directory, "mangle_u", admin.user_id, request, now).unwrap();
        assert_eq!(created.students.len(), 1);

        let home = home(&directory, "mangle_u", created.students[0].user_id).unwrap();
        assert_eq!(home.profile.name, "Grace Hopper");

        let body = serde_json::to_value(&home).unwrap();
        assert_eq!(body["pronouns"], "she/her");
        assert!(body.get("created_by").is_none());
    }

    #[test]
    fn test_create_requires_permission() {
        let institutions: Institutions = [Institution {
            id: InstitutionId::new("mangle_u"),
            base_url: url::Url::parse("https://mangle.example.edu").unwrap(),
        }]
        .into_iter()
        .collect();
        let credentials = CredentialStore::new(&institutions).unwrap();
        let directory = Directory::new(&institutions);

        let admin = bootstrap_admin(
            &credentials,
            &directory,
            "mangle_u",
            &BootstrapAdmin {
                username: Username::new("dean"),
                permissions: vec![AdminPermission::CreateInstructor],
            },
            Utc::now(),
        )
        .unwrap()
        .unwrap();

        let err = create(
            &credentials,
            &directory,
            "mangle_u",
            admin.user_id,
            CreateStudents { students: vec![] },
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, AuthError::PermissionDenied);
        assert_eq!(credentials.user_count("mangle_u"), 1);
    }
}
