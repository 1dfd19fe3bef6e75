//! Song list repository

use crate::db::{bind_values, like_pattern, with_pool, DynDatabasePool, LastInsertId, SqlFilter, SqlValue};
use crate::models::{SongList, SongListInput, SongListQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SongListRepository: Send + Sync {
    async fn create(&self, input: &SongListInput) -> Result<SongList>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SongList>>;

    async fn list_all(&self) -> Result<Vec<SongList>>;

    async fn paginate(&self, query: &SongListQuery) -> Result<(Vec<SongList>, u64)>;

    async fn update(&self, id: i64, input: &SongListInput) -> Result<Option<SongList>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxSongListRepository {
    pool: DynDatabasePool,
}

impl SqlxSongListRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SongListRepository> {
        Arc::new(Self::new(pool))
    }
}

const SONG_LIST_COLUMNS: &str = "id, title, pic, introduction, style";

#[async_trait]
impl SongListRepository for SqlxSongListRepository {
    async fn create(&self, input: &SongListInput) -> Result<SongList> {
        let id = with_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO song_lists (title, pic, introduction, style) VALUES (?, ?, ?, ?)")
                .bind(&input.title)
                .bind(&input.pic)
                .bind(&input.introduction)
                .bind(&input.style)
                .execute(conn)
                .await
                .context("Failed to create song list")?
                .last_id()
        });

        self.get_by_id(id)
            .await?
            .context("Song list not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SongList>> {
        let sql = format!("SELECT {} FROM song_lists WHERE id = ?", SONG_LIST_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, SongList>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get song list by id")
        })
    }

    async fn list_all(&self) -> Result<Vec<SongList>> {
        let sql = format!("SELECT {} FROM song_lists ORDER BY id", SONG_LIST_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, SongList>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list song lists")
        })
    }

    async fn paginate(&self, query: &SongListQuery) -> Result<(Vec<SongList>, u64)> {
        let mut filter = SqlFilter::new();
        if let Some(title) = query.title.as_deref().filter(|t| !t.trim().is_empty()) {
            filter.push("title LIKE ?", [SqlValue::Text(like_pattern(title))]);
        }
        if let Some(style) = query.style.as_deref().filter(|s| !s.trim().is_empty()) {
            filter.push("style = ?", [SqlValue::from(style)]);
        }

        let options = query.options();
        let count_sql = format!("SELECT COUNT(*) FROM song_lists{}", filter.where_sql());
        let list_sql = format!(
            "SELECT {} FROM song_lists{} ORDER BY id LIMIT ? OFFSET ?",
            SONG_LIST_COLUMNS,
            filter.where_sql()
        );

        let (lists, total) = with_pool!(self.pool, conn => {
            let total: i64 = bind_values!(sqlx::query_scalar(&count_sql), filter.values())
                .fetch_one(conn)
                .await
                .context("Failed to count song lists")?;
            let lists = bind_values!(sqlx::query_as::<_, SongList>(&list_sql), filter.values())
                .bind(options.limit())
                .bind(options.offset())
                .fetch_all(conn)
                .await
                .context("Failed to page song lists")?;
            (lists, total)
        });
        Ok((lists, total as u64))
    }

    async fn update(&self, id: i64, input: &SongListInput) -> Result<Option<SongList>> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE song_lists SET title = ?, pic = ?, introduction = ?, style = ? WHERE id = ?",
            )
            .bind(&input.title)
            .bind(&input.pic)
            .bind(&input.introduction)
            .bind(&input.style)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update song list")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM song_lists WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete song list")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSongListRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSongListRepository::new(pool.clone());
        (pool, repo)
    }

    fn list(title: &str, style: &str) -> SongListInput {
        SongListInput {
            title: title.to_string(),
            style: Some(style.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_paginate_by_title_and_style() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&list("夏日流行", "华语")).await.unwrap();
        repo.create(&list("夏夜摇滚", "摇滚")).await.unwrap();
        repo.create(&list("冬日民谣", "华语")).await.unwrap();

        let query = SongListQuery {
            title: Some("夏".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.paginate(&query).await.unwrap().1, 2);

        let query = SongListQuery {
            style: Some("华语".to_string()),
            ..Default::default()
        };
        let (lists, total) = repo.paginate(&query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(lists[0].title, "夏日流行");
    }

    #[tokio::test]
    async fn test_crud() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&list("old", "x")).await.unwrap();
        assert_eq!(repo.list_all().await.unwrap().len(), 1);

        let updated = repo.update(created.id, &list("new", "y")).await.unwrap().unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.style.as_deref(), Some("y"));

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.update(created.id, &list("gone", "z")).await.unwrap().is_none());
    }
}
