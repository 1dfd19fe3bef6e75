//! Comment repository

use crate::db::{bind_values, placeholders, with_pool, DynDatabasePool, SqlFilter, SqlValue};
use crate::models::{Comment, CommentRecord, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, record: &CommentRecord) -> Result<Comment>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Comment>>;

    /// Flat list of comments, optionally limited to a post and/or author
    async fn list(&self, post_id: Option<&str>, author_id: Option<&str>) -> Result<Vec<Comment>>;

    /// Delete comments; replies go with their parent
    async fn delete(&self, ids: &[String]) -> Result<u64>;

    /// Author id of every existing comment among `ids`
    async fn author_ids(&self, ids: &[String]) -> Result<Vec<String>>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    body: String,
    created_at: DateTime<Utc>,
    parent_id: Option<String>,
    post_id: String,
    author_id: String,
    author_username: String,
    author_nickname: Option<String>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            body: row.body,
            created_at: row.created_at,
            parent_id: row.parent_id,
            post_id: row.post_id,
            author: UserSummary {
                id: row.author_id,
                username: row.author_username,
                nickname: row.author_nickname,
            },
            depth: 0,
            children: Vec::new(),
        }
    }
}

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.body, cm.created_at, cm.parent_id, cm.post_id,
        u.id AS author_id, u.username AS author_username, u.nickname AS author_nickname
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, record: &CommentRecord) -> Result<Comment> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO comments (id, body, created_at, parent_id, post_id, author_id) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(&record.body)
            .bind(record.created_at)
            .bind(&record.parent_id)
            .bind(&record.post_id)
            .bind(&record.author_id)
            .execute(conn)
            .await
            .context("Failed to create comment")?;
        });

        self.get_by_id(&record.id)
            .await?
            .context("Comment not found after insert")
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE cm.id = ?", COMMENT_SELECT);
        let row = with_pool!(self.pool, conn => {
            sqlx::query_as::<_, CommentRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get comment by id")?
        });
        Ok(row.map(Comment::from))
    }

    async fn list(&self, post_id: Option<&str>, author_id: Option<&str>) -> Result<Vec<Comment>> {
        let mut filter = SqlFilter::new();
        if let Some(post_id) = post_id {
            filter.push("cm.post_id = ?", [SqlValue::from(post_id)]);
        }
        if let Some(author_id) = author_id {
            filter.push("cm.author_id = ?", [SqlValue::from(author_id)]);
        }
        let sql = format!(
            "{}{} ORDER BY cm.created_at, cm.id",
            COMMENT_SELECT,
            filter.where_sql()
        );

        let rows = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query_as::<_, CommentRow>(&sql), filter.values())
                .fetch_all(conn)
                .await
                .context("Failed to list comments")?
        });
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM comments WHERE id IN ({})", placeholders(ids.len()));
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(id);
            }
            Ok(query
                .execute(conn)
                .await
                .context("Failed to delete comments")?
                .rows_affected())
        })
    }

    async fn author_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT author_id FROM comments WHERE id IN ({})",
            placeholders(ids.len())
        );
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to get comment authors")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{PostRepository, SqlxPostRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PostRecord, User};

    struct Fixture {
        repo: SqlxCommentRepository,
        post_id: String,
        author_id: String,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let author = SqlxUserRepository::new(pool.clone())
            .create(&User::new("reader".to_string(), "hash".to_string()), &[], &[])
            .await
            .expect("Failed to create user");
        let post = SqlxPostRepository::new(pool.clone())
            .create(&PostRecord::new("t".to_string(), "b".to_string(), author.id.clone()))
            .await
            .expect("Failed to create post");
        Fixture {
            repo: SqlxCommentRepository::new(pool),
            post_id: post.id,
            author_id: author.id,
        }
    }

    fn record(f: &Fixture, body: &str, parent: Option<&Comment>) -> CommentRecord {
        CommentRecord::new(
            body.to_string(),
            f.post_id.clone(),
            parent.map(|p| p.id.clone()),
            f.author_id.clone(),
        )
    }

    #[tokio::test]
    async fn test_create_loads_author() {
        let f = setup().await;
        let comment = f.repo.create(&record(&f, "hello", None)).await.unwrap();

        assert_eq!(comment.body, "hello");
        assert_eq!(comment.author.username, "reader");
        assert_eq!(comment.post_id, f.post_id);
    }

    #[tokio::test]
    async fn test_list_filters_by_post_and_author() {
        let f = setup().await;
        let root = f.repo.create(&record(&f, "root", None)).await.unwrap();
        f.repo.create(&record(&f, "reply", Some(&root))).await.unwrap();

        assert_eq!(f.repo.list(Some(&f.post_id), None).await.unwrap().len(), 2);
        assert_eq!(f.repo.list(None, Some(&f.author_id)).await.unwrap().len(), 2);
        assert!(f.repo.list(Some("other"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let f = setup().await;
        let root = f.repo.create(&record(&f, "root", None)).await.unwrap();
        let reply = f.repo.create(&record(&f, "reply", Some(&root))).await.unwrap();

        assert_eq!(
            f.repo.author_ids(&[reply.id.clone()]).await.unwrap(),
            vec![f.author_id.clone()]
        );
        f.repo.delete(&[root.id.clone()]).await.unwrap();
        assert!(f.repo.get_by_id(&reply.id).await.unwrap().is_none());
    }
}
