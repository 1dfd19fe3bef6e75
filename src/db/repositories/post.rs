//! Post repository
//!
//! Posts are loaded with their category, author, tags and comment count.
//! Keywords are stored as a JSON array in a text column.

use crate::db::repositories::{SqlxTagRepository, TagRepository};
use crate::db::{bind_values, like_pattern, placeholders, with_pool, DynDatabasePool, SqlFilter, SqlValue};
use crate::models::{
    BodyType, Category, PaginateOptions, Post, PostFilter, PostOrder, PostRecord, UserSummary,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post and its tag links
    async fn create(&self, record: &PostRecord) -> Result<Post>;

    /// Update a post and replace its tag links
    async fn update(&self, record: &PostRecord) -> Result<Post>;

    async fn get_by_id(&self, id: &str, with_trashed: bool) -> Result<Option<Post>>;

    /// Posts among `ids`, in no particular order
    async fn get_by_ids(&self, ids: &[String], with_trashed: bool) -> Result<Vec<Post>>;

    /// Page of posts matching the filter, with the total count
    async fn list(&self, filter: &PostFilter, options: PaginateOptions) -> Result<(Vec<Post>, u64)>;

    /// Set `deleted_at` on live posts among `ids`
    async fn soft_delete(&self, ids: &[String]) -> Result<u64>;

    /// Remove posts among `ids` regardless of state
    async fn hard_delete(&self, ids: &[String]) -> Result<u64>;

    /// Clear `deleted_at` on posts among `ids`
    async fn restore(&self, ids: &[String]) -> Result<u64>;

    /// Author id of every existing post among `ids`
    async fn author_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
    tags: SqlxTagRepository,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            tags: SqlxTagRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch(&self, sql: &str, values: &[SqlValue]) -> Result<Vec<Post>> {
        let rows = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query_as::<_, PostRow>(sql), values)
                .fetch_all(conn)
                .await
                .context("Failed to query posts")?
        });
        self.assemble(rows).await
    }

    async fn assemble(&self, rows: Vec<PostRow>) -> Result<Vec<Post>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut tags = self.tags.tags_for_posts(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let tags = tags.remove(&row.id).unwrap_or_default();
                row.into_post(tags)
            })
            .collect())
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

        let affected = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query(sql), &values)
                .execute(conn)
                .await
                .context("Failed to update posts")?
                .rows_affected()
        });
        Ok(affected)
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    title: String,
    body: String,
    summary: Option<String>,
    keywords: Option<String>,
    body_type: String,
    published_at: Option<DateTime<Utc>>,
    custom_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    category_id: Option<String>,
    category_name: Option<String>,
    category_order: Option<i32>,
    category_parent_id: Option<String>,
    author_id: String,
    author_username: String,
    author_nickname: Option<String>,
    comment_count: i64,
}

impl PostRow {
    fn into_post(self, tags: Vec<crate::models::Tag>) -> Post {
        let category = match (self.category_id, self.category_name) {
            (Some(id), Some(name)) => {
                let mut category =
                    Category::new(name, self.category_order.unwrap_or_default(), self.category_parent_id);
                category.id = id;
                Some(category)
            }
            _ => None,
        };

        Post {
            id: self.id,
            title: self.title,
            body: self.body,
            summary: self.summary,
            keywords: self
                .keywords
                .and_then(|k| serde_json::from_str(&k).ok())
                .unwrap_or_default(),
            body_type: self.body_type.parse().unwrap_or(BodyType::Markdown),
            published_at: self.published_at,
            custom_order: self.custom_order,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            category,
            tags,
            author: UserSummary {
                id: self.author_id,
                username: self.author_username,
                nickname: self.author_nickname,
            },
            comment_count: self.comment_count,
        }
    }
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.body, p.summary, p.keywords, p.body_type, p.published_at,
        p.custom_order, p.created_at, p.updated_at, p.deleted_at,
        c.id AS category_id, c.name AS category_name, c.custom_order AS category_order,
        c.parent_id AS category_parent_id,
        u.id AS author_id, u.username AS author_username, u.nickname AS author_nickname,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    LEFT JOIN categories c ON c.id = p.category_id
    JOIN users u ON u.id = p.author_id
"#;

const POST_FROM: &str = r#"
    FROM posts p
    LEFT JOIN categories c ON c.id = p.category_id
    JOIN users u ON u.id = p.author_id
"#;

fn build_filter(filter: &PostFilter) -> SqlFilter {
    let mut sql = SqlFilter::new();

    if let Some(condition) = filter.trashed.condition("p.deleted_at") {
        sql.push_clause(condition);
    }
    match filter.is_published {
        Some(true) => sql.push_clause("p.published_at IS NOT NULL"),
        Some(false) => sql.push_clause("p.published_at IS NULL"),
        None => {}
    }
    if let Some(ids) = &filter.category_ids {
        sql.push_in("p.category_id", ids);
    }
    if let Some(tag) = &filter.tag {
        sql.push(
            "EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ?)",
            [SqlValue::from(tag)],
        );
    }
    if let Some(author) = &filter.author {
        sql.push("p.author_id = ?", [SqlValue::from(author)]);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        sql.push(
            r#"(p.title LIKE ? OR p.body LIKE ? OR p.summary LIKE ?
                OR c.name LIKE ? OR u.username LIKE ? OR u.nickname LIKE ?
                OR EXISTS (SELECT 1 FROM post_tags st JOIN tags t ON t.id = st.tag_id
                           WHERE st.post_id = p.id AND t.name LIKE ?))"#,
            std::iter::repeat(SqlValue::Text(pattern)).take(7),
        );
    }

    sql
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, record: &PostRecord) -> Result<Post> {
        let keywords = serde_json::to_string(&record.keywords)?;
        let now = Utc::now();

        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin post insert")?;
            sqlx::query(
                r#"
                INSERT INTO posts (id, title, body, summary, keywords, body_type, published_at,
                    custom_order, created_at, updated_at, category_id, author_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.body)
            .bind(&record.summary)
            .bind(&keywords)
            .bind(record.body_type.to_string())
            .bind(record.published_at)
            .bind(record.custom_order)
            .bind(now)
            .bind(now)
            .bind(&record.category_id)
            .bind(&record.author_id)
            .execute(&mut *tx)
            .await
            .context("Failed to create post")?;

            for tag_id in &record.tag_ids {
                sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                    .bind(&record.id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link post tag")?;
            }
            tx.commit().await.context("Failed to commit post insert")?;
        });

        self.get_by_id(&record.id, true)
            .await?
            .context("Post not found after insert")
    }

    async fn update(&self, record: &PostRecord) -> Result<Post> {
        let keywords = serde_json::to_string(&record.keywords)?;

        with_pool!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin post update")?;
            sqlx::query(
                r#"
                UPDATE posts
                SET title = ?, body = ?, summary = ?, keywords = ?, body_type = ?, published_at = ?,
                    custom_order = ?, category_id = ?, author_id = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&record.title)
            .bind(&record.body)
            .bind(&record.summary)
            .bind(&keywords)
            .bind(record.body_type.to_string())
            .bind(record.published_at)
            .bind(record.custom_order)
            .bind(&record.category_id)
            .bind(&record.author_id)
            .bind(Utc::now())
            .bind(&record.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update post")?;

            sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                .bind(&record.id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear post tags")?;
            for tag_id in &record.tag_ids {
                sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                    .bind(&record.id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link post tag")?;
            }
            tx.commit().await.context("Failed to commit post update")?;
        });

        self.get_by_id(&record.id, true)
            .await?
            .context("Post not found after update")
    }

    async fn get_by_id(&self, id: &str, with_trashed: bool) -> Result<Option<Post>> {
        let sql = if with_trashed {
            format!("{} WHERE p.id = ?", POST_SELECT)
        } else {
            format!("{} WHERE p.id = ? AND p.deleted_at IS NULL", POST_SELECT)
        };
        let mut posts = self.fetch(&sql, &[SqlValue::from(id)]).await?;
        Ok(posts.pop())
    }

    async fn get_by_ids(&self, ids: &[String], with_trashed: bool) -> Result<Vec<Post>> {
        let mut filter = SqlFilter::new();
        filter.push_in("p.id", ids);
        if !with_trashed {
            filter.push_clause("p.deleted_at IS NULL");
        }
        let sql = format!("{}{}", POST_SELECT, filter.where_sql());
        self.fetch(&sql, filter.values()).await
    }

    async fn list(&self, filter: &PostFilter, options: PaginateOptions) -> Result<(Vec<Post>, u64)> {
        let conditions = build_filter(filter);
        let count_sql = format!("SELECT COUNT(*) {}{}", POST_FROM, conditions.where_sql());
        let list_sql = format!(
            "{}{} ORDER BY {}, p.id LIMIT ? OFFSET ?",
            POST_SELECT,
            conditions.where_sql(),
            PostOrder::order_sql(filter.order_by)
        );

        let total: i64 = with_pool!(self.pool, conn => {
            bind_values!(sqlx::query_scalar(&count_sql), conditions.values())
                .fetch_one(conn)
                .await
                .context("Failed to count posts")?
        });

        let mut values = conditions.values().to_vec();
        values.push(SqlValue::Int(options.limit()));
        values.push(SqlValue::Int(options.offset()));
        let posts = self.fetch(&list_sql, &values).await?;

        Ok((posts, total as u64))
    }

    async fn soft_delete(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "UPDATE posts SET deleted_at = ? WHERE deleted_at IS NULL AND id IN ({})",
            placeholders(ids.len())
        );
        self.execute_for_ids(&sql, ids, Some(Utc::now())).await
    }

    async fn hard_delete(&self, ids: &[String]) -> Result<u64> {
        let sql = format!("DELETE FROM posts WHERE id IN ({})", placeholders(ids.len()));
        self.execute_for_ids(&sql, ids, None).await
    }

    async fn restore(&self, ids: &[String]) -> Result<u64> {
        let sql = format!(
            "UPDATE posts SET deleted_at = NULL WHERE id IN ({})",
            placeholders(ids.len())
        );
        self.execute_for_ids(&sql, ids, None).await
    }

    async fn author_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT author_id FROM posts WHERE id IN ({})",
            placeholders(ids.len())
        );
        with_pool!(self.pool, conn => {
            let mut query = sqlx::query_scalar::<_, String>(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.fetch_all(conn).await.context("Failed to get post authors")
        })
    }

    async fn count(&self) -> Result<i64> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar("SELECT COUNT(*) FROM posts")
                .fetch_one(conn)
                .await
                .context("Failed to count posts")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CategoryRepository, SqlxCategoryRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Tag, TrashMode, User};
    use chrono::Duration;

    struct Fixture {
        pool: DynDatabasePool,
        repo: SqlxPostRepository,
        author: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let mut author = User::new("writer".to_string(), "hash".to_string());
        author.nickname = Some("Ink".to_string());
        let author = SqlxUserRepository::new(pool.clone())
            .create(&author, &[], &[])
            .await
            .expect("Failed to create author");
        Fixture {
            repo: SqlxPostRepository::new(pool.clone()),
            pool,
            author,
        }
    }

    fn record(f: &Fixture, title: &str) -> PostRecord {
        PostRecord::new(title.to_string(), format!("{} body", title), f.author.id.clone())
    }

    #[tokio::test]
    async fn test_create_post_with_relations() {
        let f = setup().await;
        let category = SqlxCategoryRepository::new(f.pool.clone())
            .create(&Category::new("Tech".to_string(), 0, None))
            .await
            .unwrap();
        let tag = SqlxTagRepository::new(f.pool.clone())
            .create(&Tag::new("rust".to_string(), None))
            .await
            .unwrap();

        let mut rec = record(&f, "Hello");
        rec.category_id = Some(category.id.clone());
        rec.tag_ids = vec![tag.id.clone()];
        rec.keywords = vec!["intro".to_string()];
        rec.published_at = Some(Utc::now());

        let post = f.repo.create(&rec).await.expect("Failed to create post");
        assert_eq!(post.category.as_ref().map(|c| c.name.as_str()), Some("Tech"));
        assert_eq!(post.tags.len(), 1);
        assert_eq!(post.keywords, vec!["intro".to_string()]);
        assert_eq!(post.author.username, "writer");
        assert_eq!(post.comment_count, 0);
        assert!(post.is_published());
    }

    #[tokio::test]
    async fn test_update_replaces_tags() {
        let f = setup().await;
        let tags = SqlxTagRepository::new(f.pool.clone());
        let a = tags.create(&Tag::new("a".to_string(), None)).await.unwrap();
        let b = tags.create(&Tag::new("b".to_string(), None)).await.unwrap();

        let mut rec = record(&f, "Post");
        rec.tag_ids = vec![a.id.clone()];
        let post = f.repo.create(&rec).await.unwrap();

        let mut rec = PostRecord::from_post(&post);
        rec.tag_ids = vec![b.id.clone()];
        rec.title = "Renamed".to_string();
        let post = f.repo.update(&rec).await.unwrap();

        assert_eq!(post.title, "Renamed");
        let names: Vec<_> = post.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let f = setup().await;
        let mut published = record(&f, "Rust async");
        published.published_at = Some(Utc::now());
        f.repo.create(&published).await.unwrap();
        f.repo.create(&record(&f, "Draft")).await.unwrap();

        let filter = PostFilter {
            is_published: Some(true),
            ..Default::default()
        };
        let (posts, total) = f.repo.list(&filter, PaginateOptions::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts[0].title, "Rust async");

        let filter = PostFilter {
            search: Some("draft".to_string()),
            ..Default::default()
        };
        let (_, total) = f.repo.list(&filter, PaginateOptions::default()).await.unwrap();
        assert_eq!(total, 1);

        let filter = PostFilter {
            search: Some("Ink".to_string()),
            ..Default::default()
        };
        let (_, total) = f.repo.list(&filter, PaginateOptions::default()).await.unwrap();
        assert_eq!(total, 2);

        let filter = PostFilter {
            category_ids: Some(vec![]),
            ..Default::default()
        };
        let (_, total) = f.repo.list(&filter, PaginateOptions::default()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_list_orders_by_custom_order() {
        let f = setup().await;
        for (title, order) in [("low", 1), ("high", 9), ("mid", 5)] {
            let mut rec = record(&f, title);
            rec.custom_order = order;
            f.repo.create(&rec).await.unwrap();
        }

        let filter = PostFilter {
            order_by: Some(PostOrder::Custom),
            ..Default::default()
        };
        let (posts, _) = f.repo.list(&filter, PaginateOptions::default()).await.unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_trash_and_restore() {
        let f = setup().await;
        let post = f.repo.create(&record(&f, "Trash")).await.unwrap();
        let ids = vec![post.id.clone()];

        assert_eq!(f.repo.soft_delete(&ids).await.unwrap(), 1);
        assert!(f.repo.get_by_id(&post.id, false).await.unwrap().is_none());

        let only = PostFilter {
            trashed: TrashMode::Only,
            ..Default::default()
        };
        assert_eq!(f.repo.list(&only, PaginateOptions::default()).await.unwrap().1, 1);

        f.repo.restore(&ids).await.unwrap();
        assert!(f.repo.get_by_id(&post.id, false).await.unwrap().is_some());

        f.repo.hard_delete(&ids).await.unwrap();
        assert_eq!(f.repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_author_ids_and_comment_count() {
        let f = setup().await;
        let post = f.repo.create(&record(&f, "Counted")).await.unwrap();
        let now = Utc::now();
        for i in 0..2 {
            sqlx::query(
                "INSERT INTO comments (id, body, created_at, post_id, author_id) VALUES (?, 'hi', ?, ?, ?)",
            )
            .bind(format!("c{}", i))
            .bind(now - Duration::seconds(i))
            .bind(&post.id)
            .bind(&f.author.id)
            .execute(f.pool.as_sqlite().unwrap())
            .await
            .unwrap();
        }

        let post = f.repo.get_by_id(&post.id, false).await.unwrap().unwrap();
        assert_eq!(post.comment_count, 2);
        assert_eq!(
            f.repo.author_ids(&[post.id.clone()]).await.unwrap(),
            vec![f.author.id.clone()]
        );
    }
}
