//! User service
//!
//! Account management on top of the user and RBAC repositories:
//! - every user holds the `user` role
//! - the first user receives `super-admin` while nobody holds it
//! - username, email and phone are unique among all users, trashed included

use crate::db::repositories::{RbacRepository, UserRepository};
use crate::models::{
    CreateUserInput, Paginated, SystemRoles, UniqueField, UpdateUserInput, User, UserQuery,
};
use crate::services::password::hash_password;
use anyhow::Context;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const USERNAME_LENGTH: RangeInclusive<usize> = 4..=30;
pub const PASSWORD_LENGTH: RangeInclusive<usize> = 8..=50;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username, email or phone already in use
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
    rbac: Arc<dyn RbacRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, rbac: Arc<dyn RbacRepository>) -> Self {
        Self { repo, rbac }
    }

    pub async fn create(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        validate_username(&input.username)?;
        validate_password(&input.password)?;
        self.ensure_unique(UniqueField::Username, Some(&input.username), None)
            .await?;
        self.ensure_unique(UniqueField::Email, input.email.as_deref(), None)
            .await?;
        self.ensure_unique(UniqueField::Phone, input.phone.as_deref(), None)
            .await?;

        // Links are resolved up front so a missing role leaves nothing behind
        let mut role_ids = self.existing_role_ids(&input.roles).await?;
        push_unique(&mut role_ids, self.system_role_id(SystemRoles::USER).await?);
        let promote = self.rbac.count_role_holders(SystemRoles::SUPER_ADMIN).await? == 0;
        if promote {
            if let Some(role) = self.rbac.find_role_by_name(SystemRoles::SUPER_ADMIN).await? {
                push_unique(&mut role_ids, role.id);
                tracing::info!(
                    "User {} is the first user and becomes {}",
                    input.username.trim(),
                    SystemRoles::SUPER_ADMIN
                );
            }
        }
        let permission_ids = self.existing_permission_ids(&input.permissions).await?;

        let mut user = User::new(input.username.trim().to_string(), hash_password(&input.password)?);
        user.nickname = non_empty(input.nickname);
        user.email = non_empty(input.email);
        user.phone = non_empty(input.phone);
        let user = self.repo.create(&user, &role_ids, &permission_ids).await?;

        tracing::info!("Created user {} ({})", user.username, user.id);
        self.detail(&user.id, true).await
    }

    pub async fn update(&self, input: UpdateUserInput) -> Result<User, UserServiceError> {
        let mut user = self.detail(&input.id, true).await?;

        if let Some(username) = input.username {
            validate_username(&username)?;
            self.ensure_unique(UniqueField::Username, Some(&username), Some(&user.id))
                .await?;
            user.username = username.trim().to_string();
        }
        if let Some(password) = input.password {
            validate_password(&password)?;
            user.password = hash_password(&password)?;
        }
        if let Some(email) = input.email {
            self.ensure_unique(UniqueField::Email, Some(&email), Some(&user.id))
                .await?;
            user.email = non_empty(Some(email));
        }
        if let Some(phone) = input.phone {
            self.ensure_unique(UniqueField::Phone, Some(&phone), Some(&user.id))
                .await?;
            user.phone = non_empty(Some(phone));
        }
        if let Some(nickname) = input.nickname {
            user.nickname = non_empty(Some(nickname));
        }
        self.repo.update(&user).await?;

        if let Some(roles) = input.roles {
            let mut role_ids = self.existing_role_ids(&roles).await?;
            push_unique(&mut role_ids, self.system_role_id(SystemRoles::USER).await?);
            self.rbac.set_user_roles(&user.id, &role_ids).await?;
        }
        if let Some(permissions) = input.permissions {
            let permission_ids = self.existing_permission_ids(&permissions).await?;
            self.rbac.set_user_permissions(&user.id, &permission_ids).await?;
        }

        self.detail(&user.id, true).await
    }

    pub async fn detail(&self, id: &str, with_trashed: bool) -> Result<User, UserServiceError> {
        self.repo
            .get_by_id(id, with_trashed)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }

    /// Live user by username, email or phone
    pub async fn find_by_credential(&self, credential: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.repo.get_by_credential(credential.trim()).await?)
    }

    pub async fn paginate(&self, query: &UserQuery) -> Result<Paginated<User>, UserServiceError> {
        let (users, total) = self.repo.list(query).await?;
        Ok(Paginated::from_page(users, total, query.options()))
    }

    /// With `trash`, live users are moved to the trash and trashed ones
    /// removed; without it every user among `ids` is removed.
    pub async fn delete(&self, ids: &[String], trash: bool) -> Result<u64, UserServiceError> {
        if !trash {
            return Ok(self.repo.hard_delete(ids).await?);
        }
        let removed = self.repo.delete_trashed(ids).await?;
        let trashed = self.repo.soft_delete(ids).await?;
        tracing::debug!("Users: {} trashed, {} removed", trashed, removed);
        Ok(removed + trashed)
    }

    pub async fn restore(&self, ids: &[String]) -> Result<u64, UserServiceError> {
        Ok(self.repo.restore(ids).await?)
    }

    /// Write back scalar fields of an already validated user
    pub(crate) async fn save(&self, user: &User) -> Result<User, UserServiceError> {
        self.repo.update(user).await?;
        self.detail(&user.id, true).await
    }

    pub(crate) async fn ensure_unique(
        &self,
        field: UniqueField,
        value: Option<&str>,
        exclude_id: Option<&str>,
    ) -> Result<(), UserServiceError> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        if self.repo.is_taken(field, value, exclude_id).await? {
            return Err(UserServiceError::Conflict(format!(
                "{} '{}' is already in use",
                field.column(),
                value
            )));
        }
        Ok(())
    }

    async fn system_role_id(&self, name: &str) -> Result<String, UserServiceError> {
        let role = self
            .rbac
            .find_role_by_name(name)
            .await?
            .with_context(|| format!("Role {} is missing; RBAC sync has not run", name))?;
        Ok(role.id)
    }

    async fn existing_role_ids(&self, ids: &[String]) -> Result<Vec<String>, UserServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let roles = self.rbac.roles_by_ids(ids).await?;
        Ok(roles.into_iter().map(|r| r.id).collect())
    }

    async fn existing_permission_ids(&self, ids: &[String]) -> Result<Vec<String>, UserServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let permissions = self.rbac.permissions_by_ids(ids).await?;
        Ok(permissions.into_iter().map(|p| p.id).collect())
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), UserServiceError> {
    let len = username.trim().chars().count();
    if !USERNAME_LENGTH.contains(&len) {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be {} to {} characters",
            USERNAME_LENGTH.start(),
            USERNAME_LENGTH.end()
        )));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), UserServiceError> {
    let len = password.chars().count();
    if !PASSWORD_LENGTH.contains(&len) {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be {} to {} characters",
            PASSWORD_LENGTH.start(),
            PASSWORD_LENGTH.end()
        )));
    }
    Ok(())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn push_unique(ids: &mut Vec<String>, id: String) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}
