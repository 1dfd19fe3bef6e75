//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pagination::{default_limit, default_page};
use super::{PaginateOptions, Permission, Role, TrashMode};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub nickname: Option<String>,
    /// Argon2 hash
    #[serde(skip_serializing, default)]
    pub password: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl User {
    /// Build a new user with a fresh id. `password` must already be hashed.
    pub fn new(username: String, password: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            nickname: None,
            password,
            phone: None,
            email: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// Public projection used when a user is embedded in posts and comments
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// Author as embedded in posts and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub nickname: Option<String>,
}

/// Fields a user may be unique on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    Phone,
}

impl UniqueField {
    pub fn column(&self) -> &'static str {
        match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
            UniqueField::Phone => "phone",
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub username: String,
    pub nickname: Option<String>,
    /// Plain text; hashed by the service
    pub password: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Role ids
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission ids
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl CreateUserInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

/// Input for updating a user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    pub id: String,
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
}

/// User list filters
#[derive(Debug, Clone, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Role id
    pub role: Option<String>,
    /// Permission id
    pub permission: Option<String>,
    #[serde(default)]
    pub trashed: TrashMode,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            role: None,
            permission: None,
            trashed: TrashMode::default(),
        }
    }
}

impl UserQuery {
    pub fn options(&self) -> PaginateOptions {
        PaginateOptions::new(self.page, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_has_uuid_and_no_roles() {
        let user = User::new("pincman".to_string(), "hash".to_string());
        assert!(Uuid::parse_str(&user.id).is_ok());
        assert!(user.roles.is_empty());
        assert!(!user.is_trashed());
    }

    #[test]
    fn test_password_not_serialized() {
        let user = User::new("pincman".to_string(), "secret-hash".to_string());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("deletedAt"));
    }

    #[test]
    fn test_unique_field_column() {
        assert_eq!(UniqueField::Username.column(), "username");
        assert_eq!(UniqueField::Phone.column(), "phone");
    }
}
