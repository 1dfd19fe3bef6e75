//! Post search index
//!
//! [`PostIndex`] is the seam between the post service and a full-text
//! engine. [`MeilisearchIndex`] talks to the Meilisearch REST API directly.
//! Documents carry `deleted_at` and `published_at` as epoch seconds (or
//! null) so trash and publish state can be filtered in the engine.

use crate::config::MeilisearchConfig;
use crate::models::{Post, TrashMode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attributes queries may filter on
const FILTERABLE_ATTRIBUTES: &[&str] = &["deleted_at", "published_at"];

/// Flat post document as stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub author: String,
    pub custom_order: i32,
    pub published_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Post> for PostDocument {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            summary: post.summary.clone(),
            keywords: post.keywords.clone(),
            category: post.category.as_ref().map(|c| c.name.clone()),
            tags: post.tags.iter().map(|t| t.name.clone()).collect(),
            author: post
                .author
                .nickname
                .clone()
                .unwrap_or_else(|| post.author.username.clone()),
            custom_order: post.custom_order,
            published_at: post.published_at.map(|t| t.timestamp()),
            deleted_at: post.deleted_at.map(|t| t.timestamp()),
            created_at: post.created_at.timestamp(),
            updated_at: post.updated_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub offset: u64,
    pub limit: u64,
    pub trashed: TrashMode,
    pub is_published: Option<bool>,
}

impl SearchQuery {
    /// Engine filter expressions, combined with AND
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self.trashed.condition("deleted_at").into_iter().collect();
        match self.is_published {
            Some(true) => filters.push("published_at IS NOT NULL".to_string()),
            Some(false) => filters.push("published_at IS NULL".to_string()),
            None => {}
        }
        filters
    }
}

/// Ids of matching posts in relevance order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub ids: Vec<String>,
    pub total: u64,
}

#[async_trait]
pub trait PostIndex: Send + Sync {
    /// Add posts
    async fn create(&self, posts: &[Post]) -> Result<()>;

    /// Replace stored documents
    async fn update(&self, posts: &[Post]) -> Result<()>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchHits>;
}

pub struct MeilisearchIndex {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
    uid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    hits: Vec<Hit>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
}

#[derive(Deserialize)]
struct Hit {
    id: String,
}

impl MeilisearchIndex {
    pub fn new(config: &MeilisearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create Meilisearch client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            uid: config.index.clone(),
        })
    }

    /// Configure filterable attributes; creates the index when missing
    pub async fn setup(&self) -> Result<()> {
        let request = self
            .client
            .put(self.url("settings/filterable-attributes"))
            .json(&FILTERABLE_ATTRIBUTES);
        self.send(request, "configure index").await?;
        tracing::info!("Meilisearch index '{}' ready at {}", self.uid, self.host);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/indexes/{}/{}", self.host, self.uid, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request
            .send()
            .await
            .with_context(|| format!("Meilisearch {} request failed", action))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            anyhow::bail!("Meilisearch {} failed: {} - {}", action, status, body);
        }
        Ok(response)
    }

    async fn put_documents(&self, posts: &[Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let documents: Vec<PostDocument> = posts.iter().map(PostDocument::from).collect();
        let request = self
            .client
            .post(self.url("documents"))
            .query(&[("primaryKey", "id")])
            .json(&documents);
        self.send(request, "index documents").await?;
        Ok(())
    }
}

#[async_trait]
impl PostIndex for MeilisearchIndex {
    async fn create(&self, posts: &[Post]) -> Result<()> {
        self.put_documents(posts).await
    }

    async fn update(&self, posts: &[Post]) -> Result<()> {
        self.put_documents(posts).await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let request = self.client.post(self.url("documents/delete-batch")).json(ids);
        self.send(request, "delete documents").await?;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchHits> {
        let body = serde_json::json!({
            "q": query.text,
            "offset": query.offset,
            "limit": query.limit,
            "filter": query.filters(),
            "attributesToRetrieve": ["id"],
        });
        let response = self
            .send(self.client.post(self.url("search")).json(&body), "search")
            .await?;
        let result: SearchResponse = response
            .json()
            .await
            .context("Failed to decode Meilisearch response")?;

        let ids: Vec<String> = result.hits.into_iter().map(|h| h.id).collect();
        let total = result.estimated_total_hits.unwrap_or(ids.len() as u64);
        Ok(SearchHits { ids, total })
    }
}
