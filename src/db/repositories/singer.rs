//! Singer repository

use crate::db::{bind_values, like_pattern, with_pool, DynDatabasePool, LastInsertId, SqlFilter, SqlValue};
use crate::models::{PaginateOptions, Singer, SingerInput, SingerQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait SingerRepository: Send + Sync {
    async fn create(&self, input: &SingerInput) -> Result<Singer>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Singer>>;

    /// Every singer ordered by id
    async fn list_all(&self) -> Result<Vec<Singer>>;

    /// Page of singers matching the query, with the total count
    async fn paginate(&self, query: &SingerQuery) -> Result<(Vec<Singer>, u64)>;

    /// Returns `None` when the singer does not exist
    async fn update(&self, id: i64, input: &SingerInput) -> Result<Option<Singer>>;

    /// Delete a singer and its songs
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxSingerRepository {
    pool: DynDatabasePool,
}

impl SqlxSingerRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SingerRepository> {
        Arc::new(Self::new(pool))
    }
}

const SINGER_COLUMNS: &str = "id, name, sex, pic, birth, location, introduction";

fn build_filter(query: &SingerQuery) -> SqlFilter {
    let mut filter = SqlFilter::new();
    if let Some(name) = query.name.as_deref().filter(|n| !n.trim().is_empty()) {
        filter.push("name LIKE ?", [SqlValue::Text(like_pattern(name))]);
    }
    if let Some(location) = query.location.as_deref().filter(|l| !l.trim().is_empty()) {
        filter.push("location = ?", [SqlValue::from(location)]);
    }
    if let Some(sex) = query.sex {
        filter.push("sex = ?", [SqlValue::Int(sex as i64)]);
    }
    filter
}

#[async_trait]
impl SingerRepository for SqlxSingerRepository {
    async fn create(&self, input: &SingerInput) -> Result<Singer> {
        let id = with_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO singers (name, sex, pic, birth, location, introduction) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&input.name)
            .bind(input.sex)
            .bind(&input.pic)
            .bind(input.birth)
            .bind(&input.location)
            .bind(&input.introduction)
            .execute(conn)
            .await
            .context("Failed to create singer")?
            .last_id()
        });

        self.get_by_id(id)
            .await?
            .context("Singer not found after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Singer>> {
        let sql = format!("SELECT {} FROM singers WHERE id = ?", SINGER_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Singer>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get singer by id")
        })
    }

    async fn list_all(&self) -> Result<Vec<Singer>> {
        let sql = format!("SELECT {} FROM singers ORDER BY id", SINGER_COLUMNS);
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, Singer>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list singers")
        })
    }

    async fn paginate(&self, query: &SingerQuery) -> Result<(Vec<Singer>, u64)> {
        let filter = build_filter(query);
        let options: PaginateOptions = query.options();
        let count_sql = format!("SELECT COUNT(*) FROM singers{}", filter.where_sql());
        let list_sql = format!(
            "SELECT {} FROM singers{} ORDER BY id LIMIT ? OFFSET ?",
            SINGER_COLUMNS,
            filter.where_sql()
        );

        let (singers, total) = with_pool!(self.pool, conn => {
            let total: i64 = bind_values!(sqlx::query_scalar(&count_sql), filter.values())
                .fetch_one(conn)
                .await
                .context("Failed to count singers")?;
            let singers = bind_values!(sqlx::query_as::<_, Singer>(&list_sql), filter.values())
                .bind(options.limit())
                .bind(options.offset())
                .fetch_all(conn)
                .await
                .context("Failed to page singers")?;
            (singers, total)
        });
        Ok((singers, total as u64))
    }

    async fn update(&self, id: i64, input: &SingerInput) -> Result<Option<Singer>> {
        with_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE singers SET name = ?, sex = ?, pic = ?, birth = ?, location = ?, introduction = ? WHERE id = ?",
            )
            .bind(&input.name)
            .bind(input.sex)
            .bind(&input.pic)
            .bind(input.birth)
            .bind(&input.location)
            .bind(&input.introduction)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update singer")?;
        });
        // rows_affected is 0 on MySQL for unchanged rows, so re-read instead
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM singers WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete singer")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSingerRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSingerRepository::new(pool.clone());
        (pool, repo)
    }

    fn singer(name: &str, sex: i32, location: &str) -> SingerInput {
        SingerInput {
            name: name.to_string(),
            sex,
            location: Some(location.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&singer("周杰伦", 1, "中国台湾")).await.unwrap();
        let b = repo.create(&singer("林俊杰", 1, "新加坡")).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paginate_filters() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&singer("周杰伦", 1, "中国台湾")).await.unwrap();
        repo.create(&singer("蔡依林", 0, "中国台湾")).await.unwrap();
        repo.create(&singer("林俊杰", 1, "新加坡")).await.unwrap();

        let query = SingerQuery {
            sex: Some(1),
            ..Default::default()
        };
        assert_eq!(repo.paginate(&query).await.unwrap().1, 2);

        let query = SingerQuery {
            location: Some("中国台湾".to_string()),
            name: Some("杰".to_string()),
            ..Default::default()
        };
        let (singers, total) = repo.paginate(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(singers[0].name, "周杰伦");

        let query = SingerQuery {
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let (singers, total) = repo.paginate(&query).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(singers.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&singer("old", 3, "x")).await.unwrap();

        let updated = repo
            .update(created.id, &singer("new", 2, "y"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(updated.sex, 2);
        assert!(repo.update(999, &singer("none", 0, "z")).await.unwrap().is_none());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }
}
