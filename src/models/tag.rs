//! Tag model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pagination::{default_limit, default_page};
use super::PaginateOptions;

pub const TAG_NAME_MAX: usize = 255;
pub const TAG_DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Number of live posts carrying this tag
    #[sqlx(default)]
    #[serde(default)]
    pub post_count: i64,
}

impl Tag {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            post_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTagInput {
    pub name: String,
    pub description: Option<String>,
}

impl CreateTagInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTagInput {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl TagQuery {
    pub fn options(&self) -> PaginateOptions {
        PaginateOptions::new(self.page, self.limit)
    }
}
