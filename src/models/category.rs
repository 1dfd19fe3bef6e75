//! Category model
//!
//! Categories form a tree through `parent_id`. Trees are returned nested;
//! paginated lists are flattened in pre-order with `depth` filled in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pagination::{build_tree, default_limit, default_page};
use super::{double_option, PaginateOptions, TreeNode};

pub const CATEGORY_NAME_MAX: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Sort key among siblings, ascending
    pub custom_order: i32,
    pub parent_id: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub depth: u32,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<Box<Category>>,
    #[sqlx(skip)]
    #[serde(default)]
    pub children: Vec<Category>,
}

impl Category {
    pub fn new(name: String, custom_order: i32, parent_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            custom_order,
            parent_id,
            depth: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl TreeNode for Category {
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

/// Assemble flat rows into a forest. Siblings are sorted by `custom_order`,
/// then name. Rows whose parent is missing become roots.
pub fn build_category_tree(rows: Vec<Category>) -> Vec<Category> {
    build_tree(rows, |a, b| a.custom_order.cmp(&b.custom_order).then(a.name.cmp(&b.name)))
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryInput {
    pub name: String,
    /// Parent category id
    pub parent: Option<String>,
    pub custom_order: Option<i32>,
}

impl CreateCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_order(mut self, custom_order: i32) -> Self {
        self.custom_order = Some(custom_order);
        self
    }
}

/// Input for updating a category.
///
/// `parent`: absent keeps the parent, `null` moves the category to the root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryInput {
    pub id: String,
    pub name: Option<String>,
    pub custom_order: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for CategoryQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl CategoryQuery {
    pub fn options(&self) -> PaginateOptions {
        PaginateOptions::new(self.page, self.limit)
    }
}
