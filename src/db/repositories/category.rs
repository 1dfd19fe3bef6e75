//! Category repository
//!
//! Categories are stored as an adjacency list. Subtrees are resolved with a
//! recursive CTE, which both SQLite and MySQL 8 support.

use crate::db::{with_pool, DynDatabasePool};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Category>>;

    /// Every category, unordered
    async fn list_all(&self) -> Result<Vec<Category>>;

    /// True when another category already has `name`
    async fn name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool>;

    async fn update(&self, category: &Category) -> Result<()>;

    /// Delete categories, moving the children of each up to its parent
    async fn delete(&self, ids: &[String]) -> Result<u64>;

    /// `id` and all of its descendants
    async fn subtree_ids(&self, id: &str) -> Result<Vec<String>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO categories (id, name, custom_order, parent_id) VALUES (?, ?, ?, ?)",
            )
            .bind(&category.id)
            .bind(&category.name)
            .bind(category.custom_order)
            .bind(&category.parent_id)
            .execute(conn)
            .await
            .context("Failed to create category")?;
        });

        self.get_by_id(&category.id)
            .await?
            .context("Category not found after insert")
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Category>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Category>(
                "SELECT id, name, custom_order, parent_id FROM categories WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get category by id")
        })
    }

    async fn list_all(&self) -> Result<Vec<Category>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Category>("SELECT id, name, custom_order, parent_id FROM categories")
                .fetch_all(conn)
                .await
                .context("Failed to list categories")
        })
    }

    async fn name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count: i64 = with_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE name = ? AND id <> ?")
                .bind(name)
                .bind(exclude_id.unwrap_or_default())
                .fetch_one(conn)
                .await
                .context("Failed to check category name")?
        });
        Ok(count > 0)
    }

    async fn update(&self, category: &Category) -> Result<()> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE categories SET name = ?, custom_order = ?, parent_id = ? WHERE id = ?",
            )
            .bind(&category.name)
            .bind(category.custom_order)
            .bind(&category.parent_id)
            .bind(&category.id)
            .execute(conn)
            .await
            .context("Failed to update category")?;
        });
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin category delete")?;
            let mut deleted = 0;
            for id in ids {
                let parent: Option<Option<String>> =
                    sqlx::query_scalar("SELECT parent_id FROM categories WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to get category parent")?;
                let Some(parent) = parent else { continue };

                sqlx::query("UPDATE categories SET parent_id = ? WHERE parent_id = ?")
                    .bind(&parent)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to move child categories")?;
                deleted += sqlx::query("DELETE FROM categories WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete category")?
                    .rows_affected();
            }
            tx.commit().await.context("Failed to commit category delete")?;
            Ok(deleted)
        })
    }

    async fn subtree_ids(&self, id: &str) -> Result<Vec<String>> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar(
                r#"
                WITH RECURSIVE subtree (id) AS (
                    SELECT id FROM categories WHERE id = ?
                    UNION ALL
                    SELECT c.id FROM categories c JOIN subtree s ON c.parent_id = s.id
                )
                SELECT id FROM subtree
                "#,
            )
            .bind(id)
            .fetch_all(conn)
            .await
            .context("Failed to get category subtree")
        })
    }
}
