//! Comment model
//!
//! Comments nest through `parent_id`. Deleting a parent or the post removes
//! the whole thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pagination::{build_tree, default_limit, default_page};
use super::{PaginateOptions, TreeNode, UserSummary};

pub const COMMENT_BODY_MAX: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<String>,
    pub post_id: String,
    pub author: UserSummary,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub children: Vec<Comment>,
}

impl TreeNode for Comment {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn take_children(&mut self) -> Vec<Self> {
        std::mem::take(&mut self.children)
    }

    fn set_children(&mut self, children: Vec<Self>) {
        self.children = children;
    }

    fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }
}

/// Assemble comments into threads, oldest first at every level
pub fn build_comment_tree(rows: Vec<Comment>) -> Vec<Comment> {
    build_tree(rows, |a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

/// Column values for a new comment
#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<String>,
    pub post_id: String,
    pub author_id: String,
}

impl CommentRecord {
    pub fn new(body: String, post_id: String, parent_id: Option<String>, author_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body,
            created_at: Utc::now(),
            parent_id,
            post_id,
            author_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCommentInput {
    pub body: String,
    /// Post id
    pub post: String,
    /// Parent comment id
    pub parent: Option<String>,
}

impl CreateCommentInput {
    pub fn new(body: impl Into<String>, post: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            post: post.into(),
            parent: None,
        }
    }

    pub fn reply_to(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Post id
    pub post: Option<String>,
    /// Author id
    pub author: Option<String>,
}

impl Default for CommentQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            post: None,
            author: None,
        }
    }
}

impl CommentQuery {
    pub fn options(&self) -> PaginateOptions {
        PaginateOptions::new(self.page, self.limit)
    }
}
