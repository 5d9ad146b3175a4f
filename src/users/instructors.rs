//! Instructors: home view and bulk creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthResult, CredentialStore};
use crate::types::{Role, UserId};

use super::admins::{AdminPermission, require_permission};
use super::{CreatedCredential, CreationFailure, Directory, NewProfile, Profile, create_batch};

/// Body of `GET /{institution}/instructor/home`.
#[derive(Debug, Serialize)]
pub struct InstructorHome {
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct CreateInstructors {
    pub instructors: Vec<NewProfile>,
}

#[derive(Debug, Serialize)]
pub struct CreatedInstructors {
    pub instructors: Vec<CreatedCredential>,
    pub failures: Vec<CreationFailure>,
}

pub fn home(directory: &Directory, institution: &str, user_id: UserId) -> AuthResult<InstructorHome> {
    directory
        .profile(institution, Role::Instructor, user_id)
        .map(|profile| InstructorHome { profile })
        .ok_or(AuthError::RoleMismatch)
}

/// Create a batch of instructors on behalf of `admin`, who needs `create_instructor`.
pub fn create(
    credentials: &CredentialStore,
    directory: &Directory,
    institution: &str,
    admin: UserId,
    request: CreateInstructors,
    now: DateTime<Utc>,
) -> AuthResult<CreatedInstructors> {
    require_permission(directory, institution, admin, AdminPermission::CreateInstructor)?;
    let outcome = create_batch(
        credentials,
        directory,
        institution,
        Role::Instructor,
        admin,
        request.instructors,
        now,
    );
    Ok(CreatedInstructors {
        instructors: outcome.created,
        failures: outcome.failures,
    })
}
