//! RBAC resolver and ability checks
//!
//! The resolver owns the role and permission definitions and writes them to
//! the database at startup. [`Ability`] answers permission questions for one
//! user from the rules they hold.

use crate::db::repositories::RbacRepository;
use crate::models::{
    Permission, PermissionAction, PermissionDefinition, PermissionRule, RbacDefinition, Role,
    RoleDefinition, SyncReport, SystemRoles, SUBJECT_ALL, SYSTEM_MANAGE,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Subject names used in permission rules
pub mod subjects {
    pub const POST: &str = "Post";
    pub const COMMENT: &str = "Comment";
}

/// Roles and permissions the server ships with
pub fn default_definition() -> RbacDefinition {
    let permission = |name: &str, label: &str, action, subject: &str| PermissionDefinition {
        name: name.to_string(),
        label: Some(label.to_string()),
        description: None,
        rule: PermissionRule::new(action, subject),
    };

    RbacDefinition {
        roles: vec![
            RoleDefinition {
                name: SystemRoles::USER.to_string(),
                label: Some("普通用户".to_string()),
                description: Some("新用户的默认角色".to_string()),
                permissions: vec![
                    "post.create".to_string(),
                    "post.owner".to_string(),
                    "comment.create".to_string(),
                    "comment.owner".to_string(),
                ],
            },
            RoleDefinition {
                name: SystemRoles::SUPER_ADMIN.to_string(),
                label: Some("超级管理员".to_string()),
                description: Some("拥有整个系统的管理权限".to_string()),
                permissions: vec![SYSTEM_MANAGE.to_string()],
            },
        ],
        permissions: vec![
            permission(SYSTEM_MANAGE, "系统管理", PermissionAction::Manage, SUBJECT_ALL),
            permission("post.create", "发表文章", PermissionAction::Create, subjects::POST),
            permission("post.owner", "管理自己的文章", PermissionAction::Owner, subjects::POST),
            permission("comment.create", "发表评论", PermissionAction::Create, subjects::COMMENT),
            permission("comment.owner", "管理自己的评论", PermissionAction::Owner, subjects::COMMENT),
        ],
    }
}

/// Keeps the stored roles and permissions in line with a definition
pub struct RbacResolver {
    repo: Arc<dyn RbacRepository>,
    definition: RbacDefinition,
}

impl RbacResolver {
    pub fn new(repo: Arc<dyn RbacRepository>) -> Self {
        Self::with_definition(repo, default_definition())
    }

    pub fn with_definition(repo: Arc<dyn RbacRepository>, definition: RbacDefinition) -> Self {
        Self { repo, definition }
    }

    /// Write the definition in one transaction. Nothing is written on error.
    pub async fn sync(&self) -> Result<SyncReport> {
        let report = self
            .repo
            .sync(&self.definition)
            .await
            .context("RBAC sync failed")?;

        tracing::info!(
            "RBAC synced: {} roles, {} permissions ({} stale roles and {} stale permissions removed)",
            report.roles,
            report.permissions,
            report.removed_roles,
            report.removed_permissions
        );
        if let Some(user_id) = &report.super_admin_assigned {
            tracing::info!("Assigned {} to user {}", SystemRoles::SUPER_ADMIN, user_id);
        }
        if report.super_admin_skipped {
            tracing::warn!(
                "No user exists yet; the first registered user becomes {}",
                SystemRoles::SUPER_ADMIN
            );
        }
        Ok(report)
    }

    pub async fn roles(&self) -> Result<Vec<Role>> {
        self.repo.list_roles().await
    }

    pub async fn permissions(&self) -> Result<Vec<Permission>> {
        self.repo.list_permissions().await
    }

    /// Ability of a user, from roles and direct permissions
    pub async fn ability_for(&self, user_id: &str) -> Result<Ability> {
        let permissions = self.repo.effective_permissions(user_id).await?;
        Ok(Ability::from_permissions(&permissions))
    }
}

/// The rules one user holds
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<PermissionRule>,
}

impl Ability {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self { rules }
    }

    pub fn from_permissions(permissions: &[Permission]) -> Self {
        Self::new(permissions.iter().map(|p| p.rule.clone()).collect())
    }

    pub fn can(&self, action: PermissionAction, subject: &str) -> bool {
        self.rules.iter().any(|rule| rule.allows(action, subject))
    }

    /// True for `manage` on `all`
    pub fn is_system_manager(&self) -> bool {
        self.can(PermissionAction::Manage, SUBJECT_ALL)
    }

    /// Manage on the subject, or owner permission plus authorship of every
    /// item. `owner_ids` holds one author id per existing item.
    pub fn can_own(&self, subject: &str, owner_ids: &[String], user_id: &str) -> bool {
        if self.can(PermissionAction::Manage, subject) {
            return true;
        }
        self.can(PermissionAction::Owner, subject) && owner_ids.iter().all(|id| id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxRbacRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::User;

    async fn setup_test_resolver() -> (DynDatabasePool, RbacResolver) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let resolver = RbacResolver::new(SqlxRbacRepository::boxed(pool.clone()));
        (pool, resolver)
    }

    #[test]
    fn test_default_definition_is_consistent() {
        let definition = default_definition();
        let names: Vec<_> = definition.permissions.iter().map(|p| p.name.as_str()).collect();
        for role in &definition.roles {
            for permission in &role.permissions {
                assert!(names.contains(&permission.as_str()), "unknown {}", permission);
            }
        }
        let user_role = definition
            .roles
            .iter()
            .find(|r| r.name == SystemRoles::USER)
            .unwrap();
        assert_eq!(user_role.label.as_deref(), Some("普通用户"));
        assert_eq!(user_role.permissions.len(), 4);
    }

    #[test]
    fn test_ability_can() {
        let ability = Ability::new(vec![PermissionRule::new(PermissionAction::Create, subjects::POST)]);
        assert!(ability.can(PermissionAction::Create, subjects::POST));
        assert!(!ability.can(PermissionAction::Create, subjects::COMMENT));
        assert!(!ability.is_system_manager());
    }

    #[test]
    fn test_can_own_requires_authorship_of_every_item() {
        let ability = Ability::new(vec![PermissionRule::new(PermissionAction::Owner, subjects::POST)]);
        let mine = vec!["me".to_string(), "me".to_string()];
        let mixed = vec!["me".to_string(), "you".to_string()];

        assert!(ability.can_own(subjects::POST, &mine, "me"));
        assert!(!ability.can_own(subjects::POST, &mixed, "me"));
        assert!(!ability.can_own(subjects::COMMENT, &mine, "me"));
    }

    #[test]
    fn test_manager_owns_everything() {
        let ability = Ability::new(vec![PermissionRule::new(PermissionAction::Manage, SUBJECT_ALL)]);
        let theirs = vec!["someone".to_string()];
        assert!(ability.can_own(subjects::COMMENT, &theirs, "me"));
        assert!(ability.is_system_manager());
    }

    #[tokio::test]
    async fn test_sync_then_ability_for_promoted_user() {
        let (pool, resolver) = setup_test_resolver().await;
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("admin".to_string(), "hash".to_string()), &[], &[])
            .await
            .unwrap();

        let report = resolver.sync().await.unwrap();
        assert_eq!(report.super_admin_assigned.as_deref(), Some(user.id.as_str()));

        let ability = resolver.ability_for(&user.id).await.unwrap();
        assert!(ability.is_system_manager());
        assert_eq!(resolver.roles().await.unwrap().len(), 2);
        assert_eq!(resolver.permissions().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_sync_without_users_is_skipped() {
        let (_pool, resolver) = setup_test_resolver().await;
        let report = resolver.sync().await.unwrap();
        assert!(report.super_admin_skipped);
        assert!(report.super_admin_assigned.is_none());
    }
}
