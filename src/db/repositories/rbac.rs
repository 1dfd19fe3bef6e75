//! RBAC repository
//!
//! Roles, permissions and their assignments to users. The startup sync runs
//! every step inside one transaction.

use crate::db::{bind_values, placeholders, with_pool, DynDatabasePool, SqlFilter, SqlValue};
use crate::models::{
    Permission, PermissionRule, RbacDefinition, Role, SyncReport, SystemRoles, SYSTEM_MANAGE,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait RbacRepository: Send + Sync {
    /// Write roles, permissions and the super admin assignment atomically
    async fn sync(&self, definition: &RbacDefinition) -> Result<SyncReport>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// Roles among `ids` that exist
    async fn roles_by_ids(&self, ids: &[String]) -> Result<Vec<Role>>;

    /// Permissions among `ids` that exist
    async fn permissions_by_ids(&self, ids: &[String]) -> Result<Vec<Permission>>;

    async fn roles_for_users(&self, user_ids: &[String]) -> Result<HashMap<String, Vec<Role>>>;

    /// Permissions granted directly, not through roles
    async fn permissions_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, Vec<Permission>>>;

    /// Every permission a user holds, through roles or directly
    async fn effective_permissions(&self, user_id: &str) -> Result<Vec<Permission>>;

    async fn set_user_roles(&self, user_id: &str, role_ids: &[String]) -> Result<()>;

    async fn set_user_permissions(&self, user_id: &str, permission_ids: &[String]) -> Result<()>;

    async fn add_user_role(&self, user_id: &str, role_id: &str) -> Result<()>;

    /// Number of users holding the named role
    async fn count_role_holders(&self, role_name: &str) -> Result<i64>;
}

pub struct SqlxRbacRepository {
    pool: DynDatabasePool,
}

impl SqlxRbacRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RbacRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: String,
    name: String,
    label: Option<String>,
    description: Option<String>,
    rule_action: String,
    rule_subject: String,
}

impl PermissionRow {
    fn into_permission(self) -> Result<Permission> {
        Ok(Permission {
            id: self.id,
            name: self.name,
            label: self.label,
            description: self.description,
            rule: PermissionRule::new(self.rule_action.parse()?, self.rule_subject),
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRoleRow {
    user_id: String,
    id: String,
    name: String,
    label: Option<String>,
    description: Option<String>,
    systemed: bool,
}

#[derive(sqlx::FromRow)]
struct UserPermissionRow {
    user_id: String,
    id: String,
    name: String,
    label: Option<String>,
    description: Option<String>,
    rule_action: String,
    rule_subject: String,
}

const PERMISSION_COLUMNS: &str = "p.id, p.name, p.label, p.description, p.rule_action, p.rule_subject";

#[async_trait]
impl RbacRepository for SqlxRbacRepository {
    async fn sync(&self, definition: &RbacDefinition) -> Result<SyncReport> {
        let role_names: Vec<String> = definition.roles.iter().map(|r| r.name.clone()).collect();
        let mut keep_permissions: Vec<String> =
            definition.permissions.iter().map(|p| p.name.clone()).collect();
        if !keep_permissions.iter().any(|n| n == SYSTEM_MANAGE) {
            keep_permissions.push(SYSTEM_MANAGE.to_string());
        }

        let mut stale_roles = SqlFilter::new();
        stale_roles.push("systemed = ?", [SqlValue::Bool(true)]);
        if !role_names.is_empty() {
            stale_roles.push(
                format!("name NOT IN ({})", placeholders(role_names.len())),
                role_names.iter().cloned().map(SqlValue::Text),
            );
        }
        let delete_roles_sql = format!("DELETE FROM roles{}", stale_roles.where_sql());
        let delete_permissions_sql = format!(
            "DELETE FROM permissions WHERE name NOT IN ({})",
            placeholders(keep_permissions.len())
        );

        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin RBAC sync")?;
            let mut report = SyncReport::default();

            for role in &definition.roles {
                let existing: Option<String> =
                    sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
                        .bind(&role.name)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to look up role")?;
                match existing {
                    Some(id) => {
                        sqlx::query(
                            "UPDATE roles SET label = ?, description = ?, systemed = ? WHERE id = ?",
                        )
                        .bind(&role.label)
                        .bind(&role.description)
                        .bind(true)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to update role")?;
                    }
                    None => {
                        sqlx::query(
                            "INSERT INTO roles (id, name, label, description, systemed) VALUES (?, ?, ?, ?, ?)",
                        )
                        .bind(Uuid::new_v4().to_string())
                        .bind(&role.name)
                        .bind(&role.label)
                        .bind(&role.description)
                        .bind(true)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to insert role")?;
                    }
                }
            }
            report.roles = definition.roles.len();

            report.removed_roles = bind_values!(sqlx::query(&delete_roles_sql), stale_roles.values())
                .execute(&mut *tx)
                .await
                .context("Failed to remove stale roles")?
                .rows_affected();

            for permission in &definition.permissions {
                let existing: Option<String> =
                    sqlx::query_scalar("SELECT id FROM permissions WHERE name = ?")
                        .bind(&permission.name)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to look up permission")?;
                match existing {
                    Some(id) => {
                        sqlx::query(
                            "UPDATE permissions SET label = ?, description = ?, rule_action = ?, rule_subject = ? WHERE id = ?",
                        )
                        .bind(&permission.label)
                        .bind(&permission.description)
                        .bind(permission.rule.action.to_string())
                        .bind(&permission.rule.subject)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to update permission")?;
                    }
                    None => {
                        sqlx::query(
                            "INSERT INTO permissions (id, name, label, description, rule_action, rule_subject) VALUES (?, ?, ?, ?, ?, ?)",
                        )
                        .bind(Uuid::new_v4().to_string())
                        .bind(&permission.name)
                        .bind(&permission.label)
                        .bind(&permission.description)
                        .bind(permission.rule.action.to_string())
                        .bind(&permission.rule.subject)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to insert permission")?;
                    }
                }
            }
            report.permissions = definition.permissions.len();

            let mut query = sqlx::query(&delete_permissions_sql);
            for name in &keep_permissions {
                query = query.bind(name);
            }
            report.removed_permissions = query
                .execute(&mut *tx)
                .await
                .context("Failed to remove stale permissions")?
                .rows_affected();

            for role in &definition.roles {
                let role_id: Option<String> =
                    sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
                        .bind(&role.name)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to look up role")?;
                let Some(role_id) = role_id else { continue };

                let granted: Vec<String> = if role.name == SystemRoles::SUPER_ADMIN {
                    vec![SYSTEM_MANAGE.to_string()]
                } else {
                    role.permissions.clone()
                };

                sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
                    .bind(&role_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear role permissions")?;

                for name in &granted {
                    let permission_id: Option<String> =
                        sqlx::query_scalar("SELECT id FROM permissions WHERE name = ?")
                            .bind(name)
                            .fetch_optional(&mut *tx)
                            .await
                            .context("Failed to look up permission")?;
                    match permission_id {
                        Some(permission_id) => {
                            sqlx::query(
                                "INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
                            )
                            .bind(&role_id)
                            .bind(permission_id)
                            .execute(&mut *tx)
                            .await
                            .context("Failed to grant role permission")?;
                        }
                        None => tracing::warn!(
                            "Role {} references unknown permission {}",
                            role.name,
                            name
                        ),
                    }
                }
            }

            let super_role: Option<String> =
                sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
                    .bind(SystemRoles::SUPER_ADMIN)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to look up super admin role")?;
            if let Some(super_role) = super_role {
                let holders: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role_id = ?")
                        .bind(&super_role)
                        .fetch_one(&mut *tx)
                        .await
                        .context("Failed to count super admins")?;
                if holders == 0 {
                    let first_user: Option<String> = sqlx::query_scalar(
                        "SELECT id FROM users WHERE deleted_at IS NULL ORDER BY created_at ASC LIMIT 1",
                    )
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to find first user")?;
                    match first_user {
                        Some(user_id) => {
                            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                                .bind(&user_id)
                                .bind(&super_role)
                                .execute(&mut *tx)
                                .await
                                .context("Failed to assign super admin")?;
                            report.super_admin_assigned = Some(user_id);
                        }
                        None => report.super_admin_skipped = true,
                    }
                }
            }

            tx.commit().await.context("Failed to commit RBAC sync")?;
            Ok(report)
        })
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Role>(
                "SELECT id, name, label, description, systemed FROM roles ORDER BY name",
            )
            .fetch_all(conn)
            .await
            .context("Failed to list roles")
        })
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let sql = format!("SELECT {} FROM permissions p ORDER BY p.name", PERMISSION_COLUMNS);
        let rows: Vec<PermissionRow> = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, PermissionRow>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list permissions")?
        });
        rows.into_iter().map(PermissionRow::into_permission).collect()
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Role>(
                "SELECT id, name, label, description, systemed FROM roles WHERE name = ?",
            )
            .bind(name)
            .fetch_optional(conn)
            .await
            .context("Failed to get role by name")
        })
    }

    async fn roles_by_ids(&self, ids: &[String]) -> Result<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, label, description, systemed FROM roles WHERE id IN ({})",
            placeholders(ids.len())
        );
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, Role>(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to get roles")
        })
    }

    async fn permissions_by_ids(&self, ids: &[String]) -> Result<Vec<Permission>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM permissions p WHERE p.id IN ({})",
            PERMISSION_COLUMNS,
            placeholders(ids.len())
        );
        let rows: Vec<PermissionRow> = with_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, PermissionRow>(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to get permissions")?
        });
        rows.into_iter().map(PermissionRow::into_permission).collect()
    }

    async fn roles_for_users(&self, user_ids: &[String]) -> Result<HashMap<String, Vec<Role>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            r#"
            SELECT ur.user_id, r.id, r.name, r.label, r.description, r.systemed
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id IN ({})
            ORDER BY r.name
            "#,
            placeholders(user_ids.len())
        );
        let rows: Vec<UserRoleRow> = with_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, UserRoleRow>(&sql);
            for id in user_ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to load user roles")?
        });

        let mut map: HashMap<String, Vec<Role>> = HashMap::new();
        for row in rows {
            map.entry(row.user_id).or_default().push(Role {
                id: row.id,
                name: row.name,
                label: row.label,
                description: row.description,
                systemed: row.systemed,
            });
        }
        Ok(map)
    }

    async fn permissions_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, Vec<Permission>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            r#"
            SELECT up.user_id, {}
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id IN ({})
            ORDER BY p.name
            "#,
            PERMISSION_COLUMNS,
            placeholders(user_ids.len())
        );
        let rows: Vec<UserPermissionRow> = with_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, UserPermissionRow>(&sql);
            for id in user_ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to load user permissions")?
        });

        let mut map: HashMap<String, Vec<Permission>> = HashMap::new();
        for row in rows {
            let permission = PermissionRow {
                id: row.id,
                name: row.name,
                label: row.label,
                description: row.description,
                rule_action: row.rule_action,
                rule_subject: row.rule_subject,
            }
            .into_permission()?;
            map.entry(row.user_id).or_default().push(permission);
        }
        Ok(map)
    }

    async fn effective_permissions(&self, user_id: &str) -> Result<Vec<Permission>> {
        let sql = format!(
            r#"
            SELECT {} FROM permissions p
            WHERE p.id IN (
                SELECT rp.permission_id FROM role_permissions rp
                JOIN user_roles ur ON ur.role_id = rp.role_id
                WHERE ur.user_id = ?
            )
            OR p.id IN (
                SELECT up.permission_id FROM user_permissions up WHERE up.user_id = ?
            )
            ORDER BY p.name
            "#,
            PERMISSION_COLUMNS
        );
        let rows: Vec<PermissionRow> = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, PermissionRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to load effective permissions")?
        });
        rows.into_iter().map(PermissionRow::into_permission).collect()
    }

    async fn set_user_roles(&self, user_id: &str, role_ids: &[String]) -> Result<()> {
        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await?;
            sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear user roles")?;
            for role_id in role_ids {
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(role_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to assign role")?;
            }
            tx.commit().await?;
        });
        Ok(())
    }

    async fn set_user_permissions(&self, user_id: &str, permission_ids: &[String]) -> Result<()> {
        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await?;
            sqlx::query("DELETE FROM user_permissions WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear user permissions")?;
            for permission_id in permission_ids {
                sqlx::query("INSERT INTO user_permissions (user_id, permission_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(permission_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to grant permission")?;
            }
            tx.commit().await?;
        });
        Ok(())
    }

    async fn add_user_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        with_pool!(self.pool, conn => {
            let exists: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM user_roles WHERE user_id = ? AND role_id = ?",
            )
            .bind(user_id)
            .bind(role_id)
            .fetch_one(conn)
            .await
            .context("Failed to check user role")?;
            if exists == 0 {
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(role_id)
                    .execute(conn)
                    .await
                    .context("Failed to assign role")?;
            }
        });
        Ok(())
    }

    async fn count_role_holders(&self, role_name: &str) -> Result<i64> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                JOIN users u ON u.id = ur.user_id
                WHERE r.name = ? AND u.deleted_at IS NULL
                "#,
            )
            .bind(role_name)
            .fetch_one(conn)
            .await
            .context("Failed to count role holders")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PermissionAction, PermissionDefinition, RoleDefinition};
    use chrono::{Duration, Utc};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxRbacRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxRbacRepository::new(pool.clone());
        (pool, repo)
    }

    async fn insert_user(pool: &DynDatabasePool, id: &str, age_secs: i64) {
        let created = Utc::now() - Duration::seconds(age_secs);
        sqlx::query(
            "INSERT INTO users (id, username, password, created_at, updated_at) VALUES (?, ?, 'x', ?, ?)",
        )
        .bind(id)
        .bind(id)
        .bind(created)
        .bind(created)
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to insert user");
    }

    fn permission(name: &str, action: PermissionAction, subject: &str) -> PermissionDefinition {
        PermissionDefinition {
            name: name.to_string(),
            label: None,
            description: None,
            rule: PermissionRule::new(action, subject),
        }
    }

    fn definition() -> RbacDefinition {
        RbacDefinition {
            roles: vec![
                RoleDefinition {
                    name: SystemRoles::USER.to_string(),
                    label: Some("普通用户".to_string()),
                    description: None,
                    permissions: vec!["post.create".to_string()],
                },
                RoleDefinition {
                    name: SystemRoles::SUPER_ADMIN.to_string(),
                    label: Some("超级管理员".to_string()),
                    description: None,
                    permissions: vec![],
                },
            ],
            permissions: vec![
                permission(SYSTEM_MANAGE, PermissionAction::Manage, "all"),
                permission("post.create", PermissionAction::Create, "Post"),
            ],
        }
    }

    #[tokio::test]
    async fn test_sync_creates_roles_and_permissions() {
        let (_pool, repo) = setup_test_repo().await;

        let report = repo.sync(&definition()).await.expect("Failed to sync");
        assert_eq!(report.roles, 2);
        assert!(report.super_admin_skipped);

        let roles = repo.list_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().all(|r| r.systemed));
        assert_eq!(repo.list_permissions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent_and_removes_stale_entries() {
        let (_pool, repo) = setup_test_repo().await;
        let mut def = definition();
        def.roles.push(RoleDefinition {
            name: "editor".to_string(),
            label: None,
            description: None,
            permissions: vec![],
        });
        def.permissions
            .push(permission("comment.owner", PermissionAction::Owner, "Comment"));
        repo.sync(&def).await.unwrap();

        let report = repo.sync(&definition()).await.unwrap();
        assert_eq!(report.removed_roles, 1);
        assert_eq!(report.removed_permissions, 1);
        assert_eq!(repo.list_roles().await.unwrap().len(), 2);
        assert!(repo.find_role_by_name("editor").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_promotes_earliest_user() {
        let (pool, repo) = setup_test_repo().await;
        insert_user(&pool, "newer", 10).await;
        insert_user(&pool, "older", 1000).await;

        let report = repo.sync(&definition()).await.unwrap();
        assert_eq!(report.super_admin_assigned.as_deref(), Some("older"));
        assert_eq!(repo.count_role_holders(SystemRoles::SUPER_ADMIN).await.unwrap(), 1);

        let report = repo.sync(&definition()).await.unwrap();
        assert_eq!(report.super_admin_assigned, None);
        assert!(!report.super_admin_skipped);
    }

    #[tokio::test]
    async fn test_effective_permissions_merge_roles_and_direct() {
        let (pool, repo) = setup_test_repo().await;
        insert_user(&pool, "u1", 0).await;
        repo.sync(&definition()).await.unwrap();

        let user_role = repo.find_role_by_name(SystemRoles::USER).await.unwrap().unwrap();
        repo.set_user_roles("u1", &[user_role.id.clone()]).await.unwrap();

        let manage = repo
            .list_permissions()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == SYSTEM_MANAGE)
            .unwrap();
        repo.set_user_permissions("u1", &[manage.id.clone()]).await.unwrap();

        let names: Vec<String> = repo
            .effective_permissions("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["post.create".to_string(), SYSTEM_MANAGE.to_string()]);

        let direct = repo.permissions_for_users(&["u1".to_string()]).await.unwrap();
        assert_eq!(direct["u1"].len(), 1);
        let roles = repo.roles_for_users(&["u1".to_string()]).await.unwrap();
        assert_eq!(roles["u1"][0].name, SystemRoles::USER);
    }

    #[tokio::test]
    async fn test_add_user_role_is_idempotent() {
        let (pool, repo) = setup_test_repo().await;
        insert_user(&pool, "u1", 0).await;
        repo.sync(&definition()).await.unwrap();
        let role = repo.find_role_by_name(SystemRoles::USER).await.unwrap().unwrap();

        repo.add_user_role("u1", &role.id).await.unwrap();
        repo.add_user_role("u1", &role.id).await.unwrap();

        assert_eq!(repo.count_role_holders(SystemRoles::USER).await.unwrap(), 1);
    }
}
