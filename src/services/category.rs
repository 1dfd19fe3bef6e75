//! Category service
//!
//! The whole category tree is cached under one key and rebuilt after any
//! write. Pagination walks the flattened tree.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{
    build_category_tree, flatten_tree, paginate_slice, Category, CategoryQuery,
    CreateCategoryInput, Paginated, UpdateCategoryInput, CATEGORY_NAME_MAX,
};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Category name already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// Nested category forest, siblings ordered by `custom_order`
    pub async fn find_trees(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(tree) = self
            .cache
            .get::<Vec<Category>>(keys::CATEGORY_TREE)
            .await
            .ok()
            .flatten()
        {
            return Ok(tree);
        }

        let tree = build_category_tree(self.repo.list_all().await?);
        let _ = self.cache.set(keys::CATEGORY_TREE, &tree, self.cache.ttl()).await;
        Ok(tree)
    }

    pub async fn paginate(&self, query: &CategoryQuery) -> Result<Paginated<Category>, CategoryServiceError> {
        let flat = flatten_tree(self.find_trees().await?);
        Ok(paginate_slice(query.options(), flat))
    }

    /// Category with its parent attached
    pub async fn detail(&self, id: &str) -> Result<Category, CategoryServiceError> {
        let mut category = self.get(id).await?;
        if let Some(parent_id) = &category.parent_id {
            category.parent = self.repo.get_by_id(parent_id).await?.map(Box::new);
        }
        Ok(category)
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;
        let custom_order = validate_order(input.custom_order.unwrap_or(0))?;
        if self.repo.name_taken(&name, None).await? {
            return Err(CategoryServiceError::Conflict(name));
        }
        if let Some(parent) = &input.parent {
            self.get(parent).await.map_err(|_| {
                CategoryServiceError::ValidationError(format!("Parent category {} does not exist", parent))
            })?;
        }

        let category = self
            .repo
            .create(&Category::new(name, custom_order, input.parent))
            .await
            .context("Failed to create category")?;
        self.invalidate_cache().await;
        tracing::debug!("Created category {}", category.id);
        Ok(category)
    }

    pub async fn update(&self, input: UpdateCategoryInput) -> Result<Category, CategoryServiceError> {
        let mut category = self.get(&input.id).await?;

        if let Some(name) = &input.name {
            let name = validate_name(name)?;
            if self.repo.name_taken(&name, Some(&category.id)).await? {
                return Err(CategoryServiceError::Conflict(name));
            }
            category.name = name;
        }
        if let Some(order) = input.custom_order {
            category.custom_order = validate_order(order)?;
        }
        if let Some(parent) = input.parent {
            if let Some(parent_id) = &parent {
                self.check_parent(&category.id, parent_id).await?;
            }
            category.parent_id = parent;
        }

        self.repo.update(&category).await?;
        self.invalidate_cache().await;
        self.detail(&category.id).await
    }

    /// Children of deleted categories move up to the deleted category's parent
    pub async fn delete(&self, ids: &[String]) -> Result<u64, CategoryServiceError> {
        let deleted = self.repo.delete(ids).await?;
        self.invalidate_cache().await;
        Ok(deleted)
    }

    /// `id` together with every descendant
    pub async fn descendant_ids(&self, id: &str) -> Result<Vec<String>, CategoryServiceError> {
        self.repo
            .subtree_ids(id)
            .await
            .context("Failed to resolve category subtree")
            .map_err(Into::into)
    }

    async fn get(&self, id: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))
    }

    /// The new parent must exist and lie outside the category's own subtree
    async fn check_parent(&self, id: &str, parent_id: &str) -> Result<(), CategoryServiceError> {
        if parent_id == id {
            return Err(CategoryServiceError::ValidationError(
                "A category cannot be its own parent".to_string(),
            ));
        }
        self.get(parent_id).await.map_err(|_| {
            CategoryServiceError::ValidationError(format!("Parent category {} does not exist", parent_id))
        })?;
        if self.descendant_ids(id).await?.iter().any(|d| d == parent_id) {
            return Err(CategoryServiceError::ValidationError(
                "A category cannot move below its own descendant".to_string(),
            ));
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete(keys::CATEGORY_TREE).await {
            tracing::warn!("Failed to invalidate category cache: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > CATEGORY_NAME_MAX {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name exceeds {} characters",
            CATEGORY_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

fn validate_order(order: i32) -> Result<i32, CategoryServiceError> {
    if order < 0 {
        return Err(CategoryServiceError::ValidationError(
            "customOrder must not be negative".to_string(),
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service = CategoryService::new(SqlxCategoryRepository::boxed(pool.clone()), cache);
        (pool, service)
    }

    #[tokio::test]
    async fn test_create_and_find_trees() {
        let (_pool, service) = setup_test_service().await;
        let tech = service
            .create(CreateCategoryInput::new("Tech").with_order(2))
            .await
            .unwrap();
        service.create(CreateCategoryInput::new("Life").with_order(1)).await.unwrap();
        service
            .create(CreateCategoryInput::new("Rust").with_parent(tech.id.clone()))
            .await
            .unwrap();

        let tree = service.find_trees().await.unwrap();
        let names: Vec<_> = tree.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Life", "Tech"]);
        assert_eq!(tree[1].children[0].name, "Rust");
    }

    #[tokio::test]
    async fn test_tree_cache_is_invalidated_on_write() {
        let (_pool, service) = setup_test_service().await;
        service.create(CreateCategoryInput::new("First")).await.unwrap();
        assert_eq!(service.find_trees().await.unwrap().len(), 1);

        service.create(CreateCategoryInput::new("Second")).await.unwrap();
        assert_eq!(service.find_trees().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_paginate_flattens_with_depth() {
        let (_pool, service) = setup_test_service().await;
        let root = service.create(CreateCategoryInput::new("Root")).await.unwrap();
        service
            .create(CreateCategoryInput::new("Child").with_parent(root.id.clone()))
            .await
            .unwrap();

        let page = service
            .paginate(&CategoryQuery { page: 2, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.items[0].name, "Child");
        assert_eq!(page.items[0].depth, 1);
        assert_eq!(page.meta.total_items, 2);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_pool, service) = setup_test_service().await;

        let missing_parent = service
            .create(CreateCategoryInput::new("Orphan").with_parent("nope"))
            .await;
        assert!(matches!(missing_parent, Err(CategoryServiceError::ValidationError(_))));

        let long_name = service.create(CreateCategoryInput::new("x".repeat(26))).await;
        assert!(matches!(long_name, Err(CategoryServiceError::ValidationError(_))));

        let negative = service.create(CreateCategoryInput::new("Neg").with_order(-1)).await;
        assert!(matches!(negative, Err(CategoryServiceError::ValidationError(_))));

        service.create(CreateCategoryInput::new("Dup")).await.unwrap();
        let dup = service.create(CreateCategoryInput::new("Dup")).await;
        assert!(matches!(dup, Err(CategoryServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_cycles() {
        let (_pool, service) = setup_test_service().await;
        let root = service.create(CreateCategoryInput::new("Root")).await.unwrap();
        let child = service
            .create(CreateCategoryInput::new("Child").with_parent(root.id.clone()))
            .await
            .unwrap();

        let own_parent = service
            .update(UpdateCategoryInput {
                id: root.id.clone(),
                parent: Some(Some(root.id.clone())),
                ..Default::default()
            })
            .await;
        assert!(matches!(own_parent, Err(CategoryServiceError::ValidationError(_))));

        let below_child = service
            .update(UpdateCategoryInput {
                id: root.id.clone(),
                parent: Some(Some(child.id.clone())),
                ..Default::default()
            })
            .await;
        assert!(matches!(below_child, Err(CategoryServiceError::ValidationError(_))));

        let moved = service
            .update(UpdateCategoryInput {
                id: child.id.clone(),
                parent: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(moved.is_root());
        assert_eq!(service.find_trees().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_detail_and_delete() {
        let (_pool, service) = setup_test_service().await;
        let root = service.create(CreateCategoryInput::new("Root")).await.unwrap();
        let middle = service
            .create(CreateCategoryInput::new("Middle").with_parent(root.id.clone()))
            .await
            .unwrap();
        let leaf = service
            .create(CreateCategoryInput::new("Leaf").with_parent(middle.id.clone()))
            .await
            .unwrap();

        let detail = service.detail(&middle.id).await.unwrap();
        assert_eq!(detail.parent.unwrap().id, root.id);
        assert_eq!(service.descendant_ids(&root.id).await.unwrap().len(), 3);

        service.delete(&[middle.id.clone()]).await.unwrap();
        let leaf = service.detail(&leaf.id).await.unwrap();
        assert_eq!(leaf.parent_id.as_deref(), Some(root.id.as_str()));
        assert!(matches!(
            service.detail(&middle.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }
}
