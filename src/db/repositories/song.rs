//! Song repository

use crate::db::{bind_values, like_pattern, with_pool, DynDatabasePool, LastInsertId, SqlFilter, SqlValue};
use crate::models::{Song, SongInput, SongQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait SongRepository: Send + Sync {
    async fn create(&self, input: &SongInput) -> Result<Song>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Song>>;

    /// Every song ordered by id
    async fn list_all(&self) -> Result<Vec<Song>>;

    async fn paginate(&self, query: &SongQuery) -> Result<(Vec<Song>, u64)>;

    /// Returns `None` when the song does not exist
    async fn update(&self, id: i64, input: &SongInput) -> Result<Option<Song>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxSongRepository {
    pool: DynDatabasePool,
}

impl SqlxSongRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SongRepository> {
        Arc::new(Self::new(pool))
    }
}

const SONG_COLUMNS: &str =
    "id, singer_id, name, introduction, create_time, update_time, pic, lyric, url";

#[async_trait]
impl SongRepository for SqlxSongRepository {
    async fn create(&self, input: &SongInput) -> Result<Song> {
        let now = Utc::now();
        let id = with_pool!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO songs (singer_id, name, introduction, create_time, update_time, pic, lyric, url)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(input.singer_id)
            .bind(&input.name)
            .bind(&input.introduction)
            .bind(now)
            .bind(now)
            .bind(&input.pic)
            .bind(&input.lyric)
            .bind(&input.url)
            .execute(conn)
            .await
            .context("Failed to create song")?
            .last_id()
        });

        self.get_by_id(id)
            .await?
            .context("Song not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Song>> {
        let sql = format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Song>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get song by id")
        })
    }

    async fn list_all(&self) -> Result<Vec<Song>> {
        let sql = format!("SELECT {} FROM songs ORDER BY id", SONG_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Song>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list songs")
        })
    }

    async fn paginate(&self, query: &SongQuery) -> Result<(Vec<Song>, u64)> {
        let mut filter = SqlFilter::new();
        if let Some(name) = query.name.as_deref().filter(|n| !n.trim().is_empty()) {
            filter.push("name LIKE ?", [SqlValue::Text(like_pattern(name))]);
        }
        if let Some(singer_id) = query.singer_id {
            filter.push("singer_id = ?", [SqlValue::Int(singer_id)]);
        }

        let options = query.options();
        let count_sql = format!("SELECT COUNT(*) FROM songs{}", filter.where_sql());
        let list_sql = format!(
            "SELECT {} FROM songs{} ORDER BY id LIMIT ? OFFSET ?",
            SONG_COLUMNS,
            filter.where_sql()
        );

        let (songs, total) = with_pool!(self.pool, conn => {
            let total: i64 = bind_values!(sqlx::query_scalar(&count_sql), filter.values())
                .fetch_one(conn)
                .await
                .context("Failed to count songs")?;
            let songs = bind_values!(sqlx::query_as::<_, Song>(&list_sql), filter.values())
                .bind(options.limit())
                .bind(options.offset())
                .fetch_all(conn)
                .await
                .context("Failed to page songs")?;
            (songs, total)
        });
        Ok((songs, total as u64))
    }

    async fn update(&self, id: i64, input: &SongInput) -> Result<Option<Song>> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE songs
                SET singer_id = ?, name = ?, introduction = ?, update_time = ?, pic = ?, lyric = ?, url = ?
                WHERE id = ?
                "#,
            )
            .bind(input.singer_id)
            .bind(&input.name)
            .bind(&input.introduction)
            .bind(Utc::now())
            .bind(&input.pic)
            .bind(&input.lyric)
            .bind(&input.url)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update song")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM songs WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete song")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SingerRepository, SqlxSingerRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::SingerInput;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSongRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let singer = SqlxSingerRepository::new(pool.clone())
            .create(&SingerInput {
                name: "周杰伦".to_string(),
                ..Default::default()
            })
            .await
            .expect("Failed to create singer");
        let repo = SqlxSongRepository::new(pool.clone());
        (pool, repo, singer.id)
    }

    fn song(singer_id: i64, name: &str) -> SongInput {
        SongInput {
            singer_id,
            name: name.to_string(),
            url: format!("/song/{}.mp3", name),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_sets_timestamps() {
        let (_pool, repo, singer_id) = setup_test_repo().await;
        let created = repo.create(&song(singer_id, "晴天")).await.unwrap();

        assert_eq!(created.singer_id, singer_id);
        assert_eq!(created.create_time, created.update_time);
    }

    #[tokio::test]
    async fn test_unknown_singer_is_rejected() {
        let (_pool, repo, singer_id) = setup_test_repo().await;
        assert!(repo.create(&song(singer_id + 100, "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_paginate_by_name_and_singer() {
        let (_pool, repo, singer_id) = setup_test_repo().await;
        for name in ["晴天", "七里香", "晴天 live"] {
            repo.create(&song(singer_id, name)).await.unwrap();
        }

        let query = SongQuery {
            name: Some("晴天".to_string()),
            singer_id: Some(singer_id),
            ..Default::default()
        };
        assert_eq!(repo.paginate(&query).await.unwrap().1, 2);

        let query = SongQuery {
            singer_id: Some(singer_id + 1),
            ..Default::default()
        };
        assert_eq!(repo.paginate(&query).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn test_songs_removed_with_singer() {
        let (pool, repo, singer_id) = setup_test_repo().await;
        let created = repo.create(&song(singer_id, "晴天")).await.unwrap();

        SqlxSingerRepository::new(pool).delete(singer_id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_pool, repo, singer_id) = setup_test_repo().await;
        let created = repo.create(&song(singer_id, "old")).await.unwrap();

        let mut input = song(singer_id, "new");
        input.lyric = Some("[00:00.00] la".to_string());
        let updated = repo.update(created.id, &input).await.unwrap().unwrap();
        assert_eq!(updated.name, "new");
        assert!(updated.update_time >= created.update_time);

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
