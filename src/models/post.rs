//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::pagination::{default_limit, default_page};
use super::{double_option, Category, PaginateOptions, Tag, TrashMode, UserSummary};

pub const POST_TITLE_MAX: usize = 255;
pub const POST_SUMMARY_MAX: usize = 500;
pub const POST_KEYWORD_MAX: usize = 20;
pub const POST_SEARCH_MAX: usize = 100;

/// How the body is authored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    Html,
    #[default]
    Markdown,
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyType::Html => write!(f, "html"),
            BodyType::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for BodyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(BodyType::Html),
            "markdown" => Ok(BodyType::Markdown),
            _ => Err(anyhow::anyhow!("Invalid body type: {}", s)),
        }
    }
}

/// A post with its relations loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    #[serde(rename = "type")]
    pub body_type: BodyType,
    pub published_at: Option<DateTime<Utc>>,
    pub custom_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub author: UserSummary,
    pub comment_count: i64,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Column values written by insert and update
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub body_type: BodyType,
    pub published_at: Option<DateTime<Utc>>,
    pub custom_order: i32,
    pub category_id: Option<String>,
    pub author_id: String,
    pub tag_ids: Vec<String>,
}

impl PostRecord {
    pub fn new(title: String, body: String, author_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            body,
            summary: None,
            keywords: Vec::new(),
            body_type: BodyType::default(),
            published_at: None,
            custom_order: 0,
            category_id: None,
            author_id,
            tag_ids: Vec::new(),
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            summary: post.summary.clone(),
            keywords: post.keywords.clone(),
            body_type: post.body_type,
            published_at: post.published_at,
            custom_order: post.custom_order,
            category_id: post.category.as_ref().map(|c| c.id.clone()),
            author_id: post.author.id.clone(),
            tag_ids: post.tags.iter().map(|t| t.id.clone()).collect(),
        }
    }
}

/// Sort orders for post lists. Every order is descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOrder {
    #[serde(rename = "createdAt")]
    Created,
    #[serde(rename = "updatedAt")]
    Updated,
    #[serde(rename = "publishedAt")]
    Published,
    #[serde(rename = "commentCount")]
    CommentCount,
    #[serde(rename = "custom")]
    Custom,
}

impl PostOrder {
    /// `ORDER BY` clause; `None` gives the combined default ordering
    pub fn order_sql(order: Option<PostOrder>) -> &'static str {
        match order {
            Some(PostOrder::Created) => "p.created_at DESC",
            Some(PostOrder::Updated) => "p.updated_at DESC",
            Some(PostOrder::Published) => "p.published_at DESC",
            Some(PostOrder::CommentCount) => "comment_count DESC",
            Some(PostOrder::Custom) => "p.custom_order DESC",
            None => {
                "p.created_at DESC, p.updated_at DESC, p.published_at DESC, comment_count DESC"
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `true` published only, `false` drafts only, absent for both
    pub is_published: Option<bool>,
    /// Category id; descendants are included
    pub category: Option<String>,
    /// Tag id
    pub tag: Option<String>,
    /// Author id
    pub author: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub trashed: TrashMode,
    pub order_by: Option<PostOrder>,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            is_published: None,
            category: None,
            tag: None,
            author: None,
            search: None,
            trashed: TrashMode::default(),
            order_by: None,
        }
    }
}

impl PostQuery {
    pub fn options(&self) -> PaginateOptions {
        PaginateOptions::new(self.page, self.limit)
    }
}

/// Filters after category expansion, as consumed by the repository
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub is_published: Option<bool>,
    /// Category plus descendants
    pub category_ids: Option<Vec<String>>,
    pub tag: Option<String>,
    pub author: Option<String>,
    pub search: Option<String>,
    pub trashed: TrashMode,
    pub order_by: Option<PostOrder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub keywords: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub body_type: Option<BodyType>,
    /// Publish immediately
    pub publish: Option<bool>,
    pub custom_order: Option<i32>,
    /// Category id
    pub category: Option<String>,
    /// Tag ids
    #[serde(default)]
    pub tags: Vec<String>,
    /// Author id, defaults to the caller
    pub author: Option<String>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    pub id: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub keywords: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub body_type: Option<BodyType>,
    pub publish: Option<bool>,
    pub custom_order: Option<i32>,
    /// `null` removes the category
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    /// Replaces the tag set when present
    pub tags: Option<Vec<String>>,
    pub author: Option<String>,
}
