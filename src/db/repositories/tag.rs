//! Tag repository
//!
//! Tags and the post/tag join table.

use crate::db::{placeholders, with_pool, DynDatabasePool};
use crate::models::{PaginateOptions, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    /// Get tag by ID with its post count
    async fn get_by_id(&self, id: &str) -> Result<Option<Tag>>;

    /// Page of tags ordered by name, with the total count
    async fn list(&self, options: PaginateOptions) -> Result<(Vec<Tag>, u64)>;

    async fn name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool>;

    async fn update(&self, tag: &Tag) -> Result<()>;

    async fn delete(&self, ids: &[String]) -> Result<u64>;

    /// Ids among `ids` that exist
    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Tags of each post, keyed by post id
    async fn tags_for_posts(&self, post_ids: &[String]) -> Result<HashMap<String, Vec<Tag>>>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

const TAG_WITH_COUNT: &str = r#"
    SELECT t.id, t.name, t.description,
        (SELECT COUNT(*) FROM post_tags pt
         JOIN posts p ON p.id = pt.post_id
         WHERE pt.tag_id = t.id AND p.deleted_at IS NULL) AS post_count
    FROM tags t
"#;

#[derive(sqlx::FromRow)]
struct PostTagRow {
    post_id: String,
    id: String,
    name: String,
    description: Option<String>,
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        with_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO tags (id, name, description) VALUES (?, ?, ?)")
                .bind(&tag.id)
                .bind(&tag.name)
                .bind(&tag.description)
                .execute(conn)
                .await
                .context("Failed to create tag")?;
        });
        self.get_by_id(&tag.id)
            .await?
            .context("Tag not found after insert")
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Tag>> {
        let sql = format!("{} WHERE t.id = ?", TAG_WITH_COUNT);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Tag>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get tag by id")
        })
    }

    async fn list(&self, options: PaginateOptions) -> Result<(Vec<Tag>, u64)> {
        let sql = format!("{} ORDER BY t.name LIMIT ? OFFSET ?", TAG_WITH_COUNT);
        let (tags, total) = with_pool!(self.pool, conn => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
                .fetch_one(conn)
                .await
                .context("Failed to count tags")?;
            let tags = sqlx::query_as::<_, Tag>(&sql)
                .bind(options.limit())
                .bind(options.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list tags")?;
            (tags, total)
        });
        Ok((tags, total as u64))
    }

    async fn name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count: i64 = with_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = ? AND id <> ?")
                .bind(name)
                .bind(exclude_id.unwrap_or_default())
                .fetch_one(conn)
                .await
                .context("Failed to check tag name")?
        });
        Ok(count > 0)
    }

    async fn update(&self, tag: &Tag) -> Result<()> {
        with_pool!(self.pool, conn => {
            sqlx::query("UPDATE tags SET name = ?, description = ? WHERE id = ?")
                .bind(&tag.name)
                .bind(&tag.description)
                .bind(&tag.id)
                .execute(conn)
                .await
                .context("Failed to update tag")?;
        });
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM tags WHERE id IN ({})", placeholders(ids.len()));
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(id);
            }
            Ok(query
                .execute(conn)
                .await
                .context("Failed to delete tags")?
                .rows_affected())
        })
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT id FROM tags WHERE id IN ({})", placeholders(ids.len()));
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to check tags")
        })
    }

    async fn tags_for_posts(&self, post_ids: &[String]) -> Result<HashMap<String, Vec<Tag>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            r#"
            SELECT pt.post_id, t.id, t.name, t.description
            FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id IN ({})
            ORDER BY t.name
            "#,
            placeholders(post_ids.len())
        );
        let rows: Vec<PostTagRow> = with_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, PostTagRow>(&sql);
            for id in post_ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to load post tags")?
        });

        let mut map: HashMap<String, Vec<Tag>> = HashMap::new();
        for row in rows {
            map.entry(row.post_id).or_default().push(Tag {
                id: row.id,
                name: row.name,
                description: row.description,
                post_count: 0,
            });
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_tag(name: &str) -> Tag {
        Tag::new(name.to_string(), None)
    }

    #[tokio::test]
    async fn test_create_tag() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&create_test_tag("Rust")).await.expect("Failed to create tag");

        assert_eq!(created.name, "Rust");
        assert_eq!(created.post_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_by_schema() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_tag("Rust")).await.unwrap();
        assert!(repo.create(&create_test_tag("Rust")).await.is_err());
        assert!(repo.name_taken("Rust", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_paginates_by_name() {
        let (_pool, repo) = setup_test_repo().await;
        for name in ["c", "a", "b"] {
            repo.create(&create_test_tag(name)).await.unwrap();
        }

        let (tags, total) = repo.list(PaginateOptions::new(1, 2)).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_pool, repo) = setup_test_repo().await;
        let mut tag = repo.create(&create_test_tag("old")).await.unwrap();
        tag.name = "new".to_string();
        tag.description = Some("desc".to_string());
        repo.update(&tag).await.unwrap();

        let found = repo.get_by_id(&tag.id).await.unwrap().unwrap();
        assert_eq!(found.name, "new");
        assert_eq!(found.description.as_deref(), Some("desc"));

        assert_eq!(repo.delete(&[tag.id.clone()]).await.unwrap(), 1);
        assert!(repo.get_by_id(&tag.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_ids() {
        let (_pool, repo) = setup_test_repo().await;
        let tag = repo.create(&create_test_tag("Rust")).await.unwrap();

        let ids = repo
            .existing_ids(&[tag.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec![tag.id]);
    }
}
