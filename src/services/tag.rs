//! Tag service
//!
//! Tag pages and single tags are cached; every write drops all tag entries.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::TagRepository;
use crate::models::{
    CreateTagInput, Paginated, Tag, TagQuery, UpdateTagInput, TAG_DESCRIPTION_MAX, TAG_NAME_MAX,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Tag name already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn paginate(&self, query: &TagQuery) -> Result<Paginated<Tag>, TagServiceError> {
        let options = query.options().normalized();
        let key = keys::tag_page(options.page, options.limit);
        if let Some(page) = self.cache.get::<Paginated<Tag>>(&key).await.ok().flatten() {
            return Ok(page);
        }

        let (tags, total) = self.repo.list(options).await?;
        let page = Paginated::from_page(tags, total, options);
        let _ = self.cache.set(&key, &page, self.cache.ttl()).await;
        Ok(page)
    }

    pub async fn detail(&self, id: &str) -> Result<Tag, TagServiceError> {
        let key = keys::tag(id);
        if let Some(tag) = self.cache.get::<Tag>(&key).await.ok().flatten() {
            return Ok(tag);
        }

        let tag = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(id.to_string()))?;
        let _ = self.cache.set(&key, &tag, self.cache.ttl()).await;
        Ok(tag)
    }

    pub async fn create(&self, input: CreateTagInput) -> Result<Tag, TagServiceError> {
        let name = validate_name(&input.name)?;
        validate_description(input.description.as_deref())?;
        if self.repo.name_taken(&name, None).await? {
            return Err(TagServiceError::Conflict(name));
        }

        let tag = self.repo.create(&Tag::new(name, input.description)).await?;
        self.invalidate_cache().await;
        Ok(tag)
    }

    pub async fn update(&self, input: UpdateTagInput) -> Result<Tag, TagServiceError> {
        let mut tag = self
            .repo
            .get_by_id(&input.id)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(input.id.clone()))?;

        if let Some(name) = &input.name {
            let name = validate_name(name)?;
            if self.repo.name_taken(&name, Some(&tag.id)).await? {
                return Err(TagServiceError::Conflict(name));
            }
            tag.name = name;
        }
        if let Some(description) = input.description {
            validate_description(Some(&description))?;
            tag.description = Some(description);
        }

        self.repo.update(&tag).await?;
        self.invalidate_cache().await;
        self.detail(&tag.id).await
    }

    pub async fn delete(&self, ids: &[String]) -> Result<u64, TagServiceError> {
        let deleted = self.repo.delete(ids).await?;
        self.invalidate_cache().await;
        Ok(deleted)
    }

    /// Drop cached tags; post writes call this too since they change counts
    pub async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::TAG_PATTERN).await {
            tracing::warn!("Failed to invalidate tag cache: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<String, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::ValidationError("Tag name cannot be empty".to_string()));
    }
    if name.chars().count() > TAG_NAME_MAX {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name exceeds {} characters",
            TAG_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

fn validate_description(description: Option<&str>) -> Result<(), TagServiceError> {
    match description {
        Some(d) if d.chars().count() > TAG_DESCRIPTION_MAX => Err(TagServiceError::ValidationError(
            format!("Tag description exceeds {} characters", TAG_DESCRIPTION_MAX),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, TagService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service = TagService::new(SqlxTagRepository::boxed(pool.clone()), cache);
        (pool, service)
    }

    #[tokio::test]
    async fn test_create_and_detail() {
        let (_pool, service) = setup_test_service().await;
        let mut input = CreateTagInput::new("rust");
        input.description = Some("systems".to_string());
        let tag = service.create(input).await.unwrap();

        let found = service.detail(&tag.id).await.unwrap();
        assert_eq!(found.name, "rust");
        assert_eq!(found.post_count, 0);
        assert!(matches!(
            service.detail("missing").await,
            Err(TagServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (_pool, service) = setup_test_service().await;
        service.create(CreateTagInput::new("rust")).await.unwrap();
        let other = service.create(CreateTagInput::new("go")).await.unwrap();

        assert!(matches!(
            service.create(CreateTagInput::new("rust")).await,
            Err(TagServiceError::Conflict(_))
        ));
        let rename = service
            .update(UpdateTagInput {
                id: other.id,
                name: Some("rust".to_string()),
                description: None,
            })
            .await;
        assert!(matches!(rename, Err(TagServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_validation() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.create(CreateTagInput::new("  ")).await,
            Err(TagServiceError::ValidationError(_))
        ));
        let mut long = CreateTagInput::new("long");
        long.description = Some("d".repeat(501));
        assert!(matches!(
            service.create(long).await,
            Err(TagServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_pages_follow_writes() {
        let (_pool, service) = setup_test_service().await;
        let first = service.create(CreateTagInput::new("one")).await.unwrap();
        assert_eq!(service.paginate(&TagQuery::default()).await.unwrap().meta.total_items, 1);

        service.create(CreateTagInput::new("two")).await.unwrap();
        assert_eq!(service.paginate(&TagQuery::default()).await.unwrap().meta.total_items, 2);

        let renamed = service
            .update(UpdateTagInput {
                id: first.id.clone(),
                name: Some("uno".to_string()),
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(renamed.name, "uno");
        assert_eq!(service.detail(&first.id).await.unwrap().name, "uno");

        service.delete(&[first.id.clone()]).await.unwrap();
        assert_eq!(service.paginate(&TagQuery::default()).await.unwrap().meta.total_items, 1);
    }
}
