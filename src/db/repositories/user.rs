//! User repository
//!
//! Database operations for users. Roles and directly granted permissions are
//! attached to every user returned.

use crate::db::repositories::{RbacRepository, SqlxRbacRepository};
use crate::db::{bind_values, placeholders, with_pool, DynDatabasePool, SqlFilter, SqlValue};
use crate::models::{UniqueField, User, UserQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user with its role and permission links in one transaction
    async fn create(&self, user: &User, role_ids: &[String], permission_ids: &[String]) -> Result<User>;

    /// Get user by ID, optionally including trashed users
    async fn get_by_id(&self, id: &str, with_trashed: bool) -> Result<Option<User>>;

    /// Find a live user whose username, email or phone equals `credential`
    async fn get_by_credential(&self, credential: &str) -> Result<Option<User>>;

    /// True when another user already uses `value` for `field`
    async fn is_taken(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool>;

    /// Update scalar columns
    async fn update(&self, user: &User) -> Result<()>;

    /// List users matching the query, with the total count
    async fn list(&self, query: &UserQuery) -> Result<(Vec<User>, u64)>;

    /// Count users, including trashed ones
    async fn count(&self) -> Result<i64>;

    /// Set `deleted_at` on live users among `ids`
    async fn soft_delete(&self, ids: &[String]) -> Result<u64>;

    /// Remove users among `ids` that are already trashed
    async fn delete_trashed(&self, ids: &[String]) -> Result<u64>;

    /// Remove users among `ids` regardless of state
    async fn hard_delete(&self, ids: &[String]) -> Result<u64>;

    /// Clear `deleted_at` on users among `ids`
    async fn restore(&self, ids: &[String]) -> Result<u64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
    rbac: SqlxRbacRepository,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            rbac: SqlxRbacRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn attach_access(&self, mut users: Vec<User>) -> Result<Vec<User>> {
        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let mut roles = self.rbac.roles_for_users(&ids).await?;
        let mut permissions = self.rbac.permissions_for_users(&ids).await?;
        for user in users.iter_mut() {
            user.roles = roles.remove(&user.id).unwrap_or_default();
            user.permissions = permissions.remove(&user.id).unwrap_or_default();
        }
        Ok(users)
    }

    async fn attach_one(&self, user: Option<User>) -> Result<Option<User>> {
        match user {
            Some(user) => Ok(self.attach_access(vec![user]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn execute_for_ids(&self, sql: &str, ids: &[String], now: Option<DateTime<Utc>>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(now) = now {
            values.push(SqlValue::Time(now));
        }
        values.extend(ids.iter().cloned().map(SqlValue::Text));

        let result = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query(sql), &values)
                .execute(conn)
                .await
                .context("Failed to update users")?
                .rows_affected()
        });
        Ok(result)
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    nickname: Option<String>,
    password: String,
    phone: Option<String>,
    email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            nickname: row.nickname,
            password: row.password,
            phone: row.phone,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, nickname, password, phone, email, created_at, updated_at, deleted_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User, role_ids: &[String], permission_ids: &[String]) -> Result<User> {
        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin user insert")?;
            sqlx::query(
                r#"
                INSERT INTO users (id, username, nickname, password, phone, email, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.nickname)
            .bind(&user.password)
            .bind(&user.phone)
            .bind(&user.email)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&mut *tx)
            .await
            .context("Failed to create user")?;
            for role_id in role_ids {
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(&user.id)
                    .bind(role_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to assign role")?;
            }
            for permission_id in permission_ids {
                sqlx::query("INSERT INTO user_permissions (user_id, permission_id) VALUES (?, ?)")
                    .bind(&user.id)
                    .bind(permission_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to grant permission")?;
            }
            tx.commit().await.context("Failed to commit user insert")?;
        });

        self.get_by_id(&user.id, true)
            .await?
            .context("User not found after insert")
    }

    async fn get_by_id(&self, id: &str, with_trashed: bool) -> Result<Option<User>> {
        let sql = if with_trashed {
            format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL",
                USER_COLUMNS
            )
        };
        let row = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by id")?
        });
        self.attach_one(row.map(User::from)).await
    }

    async fn get_by_credential(&self, credential: &str) -> Result<Option<User>> {
        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE (username = ? OR email = ? OR phone = ?) AND deleted_at IS NULL
            "#,
            USER_COLUMNS
        );
        let row = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(credential)
                .bind(credential)
                .bind(credential)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by credential")?
        });
        self.attach_one(row.map(User::from)).await
    }

    async fn is_taken(
        &self,
        field: UniqueField,
        value: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let mut filter = SqlFilter::new();
        filter.push(format!("{} = ?", field.column()), [SqlValue::from(value)]);
        if let Some(id) = exclude_id {
            filter.push("id <> ?", [SqlValue::from(id)]);
        }
        let sql = format!("SELECT COUNT(*) FROM users{}", filter.where_sql());

        let count: i64 = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query_scalar(&sql), filter.values())
                .fetch_one(conn)
                .await
                .context("Failed to check uniqueness")?
        });
        Ok(count > 0)
    }

    async fn update(&self, user: &User) -> Result<()> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, nickname = ?, password = ?, phone = ?, email = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.nickname)
            .bind(&user.password)
            .bind(&user.phone)
            .bind(&user.email)
            .bind(Utc::now())
            .bind(&user.id)
            .execute(conn)
            .await
            .context("Failed to update user")?;
        });
        Ok(())
    }

    async fn list(&self, query: &UserQuery) -> Result<(Vec<User>, u64)> {
        let options = query.options();
        let mut filter = SqlFilter::new();
        if let Some(condition) = query.trashed.condition("deleted_at") {
            filter.push_clause(condition);
        }
        if let Some(role) = &query.role {
            filter.push(
                "EXISTS (SELECT 1 FROM user_roles ur WHERE ur.user_id = users.id AND ur.role_id = ?)",
                [SqlValue::from(role.as_str())],
            );
        }
        if let Some(permission) = &query.permission {
            filter.push(
                "EXISTS (SELECT 1 FROM user_permissions up WHERE up.user_id = users.id AND up.permission_id = ?)",
                [SqlValue::from(permission.as_str())],
            );
        }

        let count_sql = format!("SELECT COUNT(*) FROM users{}", filter.where_sql());
        let list_sql = format!(
            "SELECT {} FROM users{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            USER_COLUMNS,
            filter.where_sql()
        );

        let (rows, total) = with_pool!(self.pool, conn => {
            let total: i64 = bind_values!(sqlx::query_scalar(&count_sql), filter.values())
                .fetch_one(conn)
                .await
                .context("Failed to count users")?;
            let rows = bind_values!(sqlx::query_as::<_, UserRow>(&list_sql), filter.values())
                .bind(options.limit())
                .bind(options.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list users")?;
            (rows, total)
        });

        let users = self
            .attach_access(rows.into_iter().map(User::from).collect())
            .await?;
        Ok((users, total as u64))
    }

    async fn count(&self) -> Result<i64> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(conn)
                .await
                .context("Failed to count users")
        })
    }

    async fn soft_delete(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "UPDATE users SET deleted_at = ? WHERE deleted_at IS NULL AND id IN ({})",
            placeholders(ids.len())
        );
        self.execute_for_ids(&sql, ids, Some(Utc::now())).await
    }

    async fn delete_trashed(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "DELETE FROM users WHERE deleted_at IS NOT NULL AND id IN ({})",
            placeholders(ids.len())
        );
        self.execute_for_ids(&sql, ids, None).await
    }

    async fn hard_delete(&self, ids: &[String]) -> Result<u64> {
        let sql = format!("DELETE FROM users WHERE id IN ({})", placeholders(ids.len()));
        self.execute_for_ids(&sql, ids, None).await
    }

    async fn restore(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "UPDATE users SET deleted_at = NULL WHERE id IN ({})",
            placeholders(ids.len())
        );
        self.execute_for_ids(&sql, ids, None).await
    }
}
