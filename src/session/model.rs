//! Session models as exchanged with the API (camelCase JSON).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a user, globally or within one institute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    #[serde(alias = "ADMIN", alias = "INSTITUTEADMIN")]
    InstituteAdmin,
    Teacher,
    Student,
    Parent,
    #[serde(alias = "ATTENDANCEMARKER")]
    AttendanceMarker,
    OrganizationManager,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::InstituteAdmin => "INSTITUTE_ADMIN",
            UserRole::Teacher => "TEACHER",
            UserRole::Student => "STUDENT",
            UserRole::Parent => "PARENT",
            UserRole::AttendanceMarker => "ATTENDANCE_MARKER",
            UserRole::OrganizationManager => "ORGANIZATION_MANAGER",
            UserRole::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// An institute the user belongs to, with the user's role there if the API reports one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institute {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "instituteUserType")]
    pub user_role: Option<UserRole>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub grade: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// A student a parent account acts on behalf of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub institute_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// User as returned by `/auth/login` and `/auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    #[serde(default, alias = "firstName")]
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Authenticated user together with their institute memberships.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub institutes: Vec<Institute>,
}

impl User {
    pub fn from_auth(user: AuthUser, institutes: Vec<Institute>) -> Self {
        User {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            institutes,
        }
    }

    pub fn institute(&self, id: &str) -> Option<&Institute> {
        self.institutes.iter().find(|i| i.id == id)
    }
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
    pub user: AuthUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_aliases_and_unknown() {
        let roles: Vec<UserRole> =
            serde_json::from_value(json!(["ADMIN", "TEACHER", "ATTENDANCEMARKER", "JANITOR"]))
                .expect("Failed to decode roles");
        assert_eq!(
            roles,
            vec![
                UserRole::InstituteAdmin,
                UserRole::Teacher,
                UserRole::AttendanceMarker,
                UserRole::Unknown
            ]
        );
    }

    #[test]
    fn test_institute_camel_case() {
        let institute: Institute = serde_json::from_value(json!({
            "id": "I1",
            "name": "North High",
            "instituteUserType": "TEACHER",
            "imageUrl": "https://cdn.example.edu/i1.png"
        }))
        .expect("Failed to decode institute");

        assert_eq!(institute.user_role, Some(UserRole::Teacher));
        assert_eq!(institute.code, None);
        assert!(institute.image_url.is_some());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("a@example.edu", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
