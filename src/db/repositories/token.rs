//! Token repository
//!
//! Access tokens and their refresh tokens. Deleting an access token removes
//! its refresh token through the foreign key.

use crate::db::{with_pool, DynDatabasePool};
use crate::models::{AccessToken, RefreshToken};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store an access token and its refresh token in one transaction
    async fn create_pair(&self, access: &AccessToken, refresh: &RefreshToken) -> Result<()>;

    async fn find_access(&self, value: &str) -> Result<Option<AccessToken>>;

    async fn find_refresh(&self, value: &str) -> Result<Option<RefreshToken>>;

    /// Refresh token issued together with the given access token
    async fn find_refresh_for_access(&self, access_token_id: &str) -> Result<Option<RefreshToken>>;

    async fn find_access_by_id(&self, id: &str) -> Result<Option<AccessToken>>;

    async fn delete_access(&self, id: &str) -> Result<u64>;

    async fn delete_refresh(&self, id: &str) -> Result<u64>;

    /// Remove pairs whose refresh token expired before `now`, and access
    /// tokens without a refresh token that expired before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn create_pair(&self, access: &AccessToken, refresh: &RefreshToken) -> Result<()> {
        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin token transaction")?;
            sqlx::query(
                "INSERT INTO access_tokens (id, value, user_id, expired_at, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&access.id)
            .bind(&access.value)
            .bind(&access.user_id)
            .bind(access.expired_at)
            .bind(access.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to create access token")?;
            sqlx::query(
                "INSERT INTO refresh_tokens (id, value, access_token_id, expired_at, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&refresh.id)
            .bind(&refresh.value)
            .bind(&refresh.access_token_id)
            .bind(refresh.expired_at)
            .bind(refresh.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to create refresh token")?;
            tx.commit().await.context("Failed to commit token pair")?;
        });
        Ok(())
    }

    async fn find_access(&self, value: &str) -> Result<Option<AccessToken>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, AccessToken>(
                "SELECT id, value, user_id, expired_at, created_at FROM access_tokens WHERE value = ?",
            )
            .bind(value)
            .fetch_optional(conn)
            .await
            .context("Failed to get access token")
        })
    }

    async fn find_refresh(&self, value: &str) -> Result<Option<RefreshToken>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, RefreshToken>(
                "SELECT id, value, access_token_id, expired_at, created_at FROM refresh_tokens WHERE value = ?",
            )
            .bind(value)
            .fetch_optional(conn)
            .await
            .context("Failed to get refresh token")
        })
    }

    async fn find_refresh_for_access(&self, access_token_id: &str) -> Result<Option<RefreshToken>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, RefreshToken>(
                "SELECT id, value, access_token_id, expired_at, created_at FROM refresh_tokens WHERE access_token_id = ?",
            )
            .bind(access_token_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get refresh token for access token")
        })
    }

    async fn find_access_by_id(&self, id: &str) -> Result<Option<AccessToken>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, AccessToken>(
                "SELECT id, value, user_id, expired_at, created_at FROM access_tokens WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get access token by id")
        })
    }

    async fn delete_access(&self, id: &str) -> Result<u64> {
        with_pool!(self.pool, conn => {
            Ok(sqlx::query("DELETE FROM access_tokens WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete access token")?
                .rows_affected())
        })
    }

    async fn delete_refresh(&self, id: &str) -> Result<u64> {
        with_pool!(self.pool, conn => {
            Ok(sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete refresh token")?
                .rows_affected())
        })
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        with_pool!(self.pool, conn => {
            Ok(sqlx::query(
                r#"
                DELETE FROM access_tokens
                WHERE id IN (SELECT access_token_id FROM refresh_tokens WHERE expired_at <= ?)
                   OR (expired_at <= ? AND id NOT IN (SELECT access_token_id FROM refresh_tokens))
                "#,
            )
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to delete expired tokens")?
            .rows_affected())
        })
    }
}
