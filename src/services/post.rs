//! Post service
//!
//! Posts move through draft, published and trashed states. Writes keep the
//! search index in step when one is configured; an index failure is logged
//! and never fails the write itself.

use crate::cache::{keys, Cache, CacheLayer};
use crate::config::{ContentConfig, SearchType};
use crate::db::repositories::{CategoryRepository, PostRepository, TagRepository, UserRepository};
use crate::models::{
    BodyType, CreatePostInput, Paginated, Post, PostFilter, PostQuery, PostRecord,
    UpdatePostInput, POST_KEYWORD_MAX, POST_SEARCH_MAX, POST_SUMMARY_MAX, POST_TITLE_MAX,
};
use crate::services::sanitize::sanitize_html;
use crate::services::search::{PostIndex, SearchQuery};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    tags: Arc<dyn TagRepository>,
    users: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
    index: Option<Arc<dyn PostIndex>>,
    content: ContentConfig,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<dyn TagRepository>,
        users: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
        content: ContentConfig,
    ) -> Self {
        Self {
            repo,
            categories,
            tags,
            users,
            cache,
            index: None,
            content,
        }
    }

    /// Attach a search index; queries use it when `search_type` is meilisearch
    pub fn with_index(mut self, index: Arc<dyn PostIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub async fn paginate(&self, query: &PostQuery) -> Result<Paginated<Post>, PostServiceError> {
        let options = query.options().normalized();
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(search) = search {
            if search.chars().count() > POST_SEARCH_MAX {
                return Err(PostServiceError::ValidationError(format!(
                    "Search term exceeds {} characters",
                    POST_SEARCH_MAX
                )));
            }
            if let Some(index) = self.search_index() {
                return self.search(index, search, query).await;
            }
        }

        let category_ids = match &query.category {
            Some(id) => Some(self.categories.subtree_ids(id).await?),
            None => None,
        };
        let filter = PostFilter {
            is_published: query.is_published,
            category_ids,
            tag: query.tag.clone(),
            author: query.author.clone(),
            search: search.map(String::from),
            trashed: query.trashed,
            order_by: query.order_by,
        };

        let (posts, total) = self.repo.list(&filter, options).await?;
        Ok(Paginated::from_page(posts, total, options))
    }

    pub async fn detail(&self, id: &str, with_trashed: bool) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id, with_trashed)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    /// A post visible to guests: published and not trashed
    pub async fn published_detail(&self, id: &str) -> Result<Post, PostServiceError> {
        let post = self.detail(id, false).await?;
        if !post.is_published() {
            return Err(PostServiceError::NotFound(id.to_string()));
        }
        Ok(post)
    }

    /// Create a post. `author_id` is the caller, used unless the input
    /// names another author.
    pub async fn create(&self, input: CreatePostInput, author_id: &str) -> Result<Post, PostServiceError> {
        let title = validate_title(&input.title)?;
        let mut record = PostRecord::new(title, input.body, author_id.to_string());
        record.summary = validate_summary(input.summary)?;
        record.keywords = validate_keywords(input.keywords.unwrap_or_default())?;
        record.body_type = input.body_type.unwrap_or_default();
        record.custom_order = validate_order(input.custom_order.unwrap_or(0))?;
        record.published_at = input.publish.unwrap_or(false).then(Utc::now);

        if let Some(author) = input.author {
            self.check_author(&author).await?;
            record.author_id = author;
        }
        if let Some(category) = input.category {
            self.check_category(&category).await?;
            record.category_id = Some(category);
        }
        record.tag_ids = self.check_tags(input.tags).await?;
        record.body = self.clean_body(record.body, record.body_type);

        let post = self.repo.create(&record).await?;
        tracing::debug!("Created post {} by {}", post.id, post.author.id);

        if let Some(index) = &self.index {
            if let Err(e) = index.create(std::slice::from_ref(&post)).await {
                tracing::warn!("Failed to index post {}: {}", post.id, e);
            }
        }
        self.invalidate_tags().await;
        Ok(post)
    }

    pub async fn update(&self, input: UpdatePostInput) -> Result<Post, PostServiceError> {
        let post = self.detail(&input.id, true).await?;
        let mut record = PostRecord::from_post(&post);

        if let Some(title) = &input.title {
            record.title = validate_title(title)?;
        }
        if let Some(body) = input.body {
            record.body = body;
        }
        if input.summary.is_some() {
            record.summary = validate_summary(input.summary)?;
        }
        if let Some(keywords) = input.keywords {
            record.keywords = validate_keywords(keywords)?;
        }
        if let Some(body_type) = input.body_type {
            record.body_type = body_type;
        }
        if let Some(order) = input.custom_order {
            record.custom_order = validate_order(order)?;
        }
        match input.publish {
            Some(true) => record.published_at = Some(Utc::now()),
            Some(false) => record.published_at = None,
            _ => {}
        }
        if let Some(author) = input.author {
            self.check_author(&author).await?;
            record.author_id = author;
        }
        if let Some(category) = input.category {
            if let Some(id) = &category {
                self.check_category(id).await?;
            }
            record.category_id = category;
        }
        if let Some(tags) = input.tags {
            record.tag_ids = self.check_tags(tags).await?;
        }
        record.body = self.clean_body(record.body, record.body_type);

        let post = self.repo.update(&record).await?;
        self.reindex(std::slice::from_ref(&post)).await;
        self.invalidate_tags().await;
        Ok(post)
    }

    /// With `trash`, trashed posts are removed and live posts trashed.
    /// Without it every post among `ids` is removed.
    pub async fn delete(&self, ids: &[String], trash: bool) -> Result<u64, PostServiceError> {
        let posts = self.repo.get_by_ids(ids, true).await?;
        let (trashed, live): (Vec<Post>, Vec<Post>) = posts.into_iter().partition(Post::is_trashed);

        let (removed_ids, soft_ids): (Vec<String>, Vec<String>) = if trash {
            (
                trashed.into_iter().map(|p| p.id).collect(),
                live.into_iter().map(|p| p.id).collect(),
            )
        } else {
            (
                trashed.into_iter().chain(live).map(|p| p.id).collect(),
                Vec::new(),
            )
        };

        let removed = self.repo.hard_delete(&removed_ids).await?;
        let soft = self.repo.soft_delete(&soft_ids).await?;
        tracing::debug!("Posts: {} trashed, {} removed", soft, removed);

        if let Some(index) = &self.index {
            if let Err(e) = index.delete(&removed_ids).await {
                tracing::warn!("Failed to remove posts from index: {}", e);
            }
        }
        if !soft_ids.is_empty() {
            let soft_posts = self.repo.get_by_ids(&soft_ids, true).await?;
            self.reindex(&soft_posts).await;
        }
        self.invalidate_tags().await;
        Ok(removed + soft)
    }

    pub async fn restore(&self, ids: &[String]) -> Result<u64, PostServiceError> {
        let restored = self.repo.restore(ids).await?;
        let posts = self.repo.get_by_ids(ids, true).await?;
        self.reindex(&posts).await;
        self.invalidate_tags().await;
        Ok(restored)
    }

    /// Author id of every existing post among `ids`
    pub async fn owner_ids(&self, ids: &[String]) -> Result<Vec<String>, PostServiceError> {
        Ok(self.repo.author_ids(ids).await?)
    }

    fn search_index(&self) -> Option<&Arc<dyn PostIndex>> {
        match self.content.search_type {
            SearchType::Meilisearch => self.index.as_ref(),
            SearchType::Database => None,
        }
    }

    async fn search(
        &self,
        index: &Arc<dyn PostIndex>,
        text: &str,
        query: &PostQuery,
    ) -> Result<Paginated<Post>, PostServiceError> {
        let options = query.options().normalized();
        let hits = index
            .search(&SearchQuery {
                text: text.to_string(),
                offset: options.offset() as u64,
                limit: options.limit() as u64,
                trashed: query.trashed,
                is_published: query.is_published,
            })
            .await?;

        let mut by_id: HashMap<String, Post> = self
            .repo
            .get_by_ids(&hits.ids, true)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let posts: Vec<Post> = hits.ids.iter().filter_map(|id| by_id.remove(id)).collect();
        Ok(Paginated::from_page(posts, hits.total, options))
    }

    async fn reindex(&self, posts: &[Post]) {
        if let Some(index) = &self.index {
            if let Err(e) = index.update(posts).await {
                tracing::warn!("Failed to update {} posts in index: {}", posts.len(), e);
            }
        }
    }

    /// Tag post counts change with post writes
    async fn invalidate_tags(&self) {
        if let Err(e) = self.cache.delete_pattern(keys::TAG_PATTERN).await {
            tracing::warn!("Failed to invalidate tag cache: {}", e);
        }
    }

    fn clean_body(&self, body: String, body_type: BodyType) -> String {
        if body_type == BodyType::Html && self.content.html_enabled {
            sanitize_html(&body)
        } else {
            body
        }
    }

    async fn check_author(&self, id: &str) -> Result<(), PostServiceError> {
        if self.users.get_by_id(id, false).await?.is_none() {
            return Err(PostServiceError::ValidationError(format!("Author {} does not exist", id)));
        }
        Ok(())
    }

    async fn check_category(&self, id: &str) -> Result<(), PostServiceError> {
        if self.categories.get_by_id(id).await?.is_none() {
            return Err(PostServiceError::ValidationError(format!(
                "Category {} does not exist",
                id
            )));
        }
        Ok(())
    }

    async fn check_tags(&self, ids: Vec<String>) -> Result<Vec<String>, PostServiceError> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        let existing = self.tags.existing_ids(&ids).await?;
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
            return Err(PostServiceError::ValidationError(format!("Tag {} does not exist", missing)));
        }
        Ok(ids)
    }
}

fn validate_title(title: &str) -> Result<String, PostServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PostServiceError::ValidationError("Title cannot be empty".to_string()));
    }
    if title.chars().count() > POST_TITLE_MAX {
        return Err(PostServiceError::ValidationError(format!(
            "Title exceeds {} characters",
            POST_TITLE_MAX
        )));
    }
    Ok(title.to_string())
}

fn validate_summary(summary: Option<String>) -> Result<Option<String>, PostServiceError> {
    match summary {
        Some(s) if s.chars().count() > POST_SUMMARY_MAX => Err(PostServiceError::ValidationError(
            format!("Summary exceeds {} characters", POST_SUMMARY_MAX),
        )),
        other => Ok(other),
    }
}

fn validate_keywords(keywords: Vec<String>) -> Result<Vec<String>, PostServiceError> {
    if let Some(long) = keywords.iter().find(|k| k.chars().count() > POST_KEYWORD_MAX) {
        return Err(PostServiceError::ValidationError(format!(
            "Keyword '{}' exceeds {} characters",
            long, POST_KEYWORD_MAX
        )));
    }
    Ok(keywords)
}

fn validate_order(order: i32) -> Result<i32, PostServiceError> {
    if order < 0 {
        return Err(PostServiceError::ValidationError(
            "customOrder must not be negative".to_string(),
        ));
    }
    Ok(order)
}
