//! Pagination types shared by every list endpoint
//!
//! Database-backed lists are paged with `LIMIT/OFFSET` and wrapped with
//! [`Paginated::from_page`]. Trees (categories, comments) are flattened first
//! and paged in memory with [`paginate_slice`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Page request, as sent in the query string (`?page=2&limit=20`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginateOptions {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub(crate) fn default_page() -> u32 {
    DEFAULT_PAGE
}

pub(crate) fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PaginateOptions {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// Clamp `page` to at least 1 and `limit` to `1..=MAX_LIMIT`
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Row offset of the first item on this page
    pub fn offset(&self) -> i64 {
        let options = self.normalized();
        (options.page as i64 - 1) * options.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.normalized().limit as i64
    }
}

/// Page metadata returned next to the items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginateMeta {
    pub total_items: u64,
    pub item_count: u64,
    pub per_page: u32,
    pub total_pages: u64,
    pub current_page: u32,
}

impl PaginateMeta {
    pub fn new(options: PaginateOptions, total_items: u64) -> Self {
        let options = options.normalized();
        let per_page = options.limit as u64;
        let total_pages = total_items.div_ceil(per_page);
        let skipped = (options.page as u64 - 1) * per_page;
        let item_count = total_items.saturating_sub(skipped).min(per_page);

        Self {
            total_items,
            item_count,
            per_page: options.limit,
            total_pages,
            current_page: options.page,
        }
    }
}

/// A page of items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PaginateMeta,
}

impl<T> Paginated<T> {
    /// Wrap a page already fetched with `LIMIT/OFFSET`
    pub fn from_page(items: Vec<T>, total_items: u64, options: PaginateOptions) -> Self {
        Self {
            items,
            meta: PaginateMeta::new(options, total_items),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// Page an in-memory list, used for flattened trees
pub fn paginate_slice<T>(options: PaginateOptions, items: Vec<T>) -> Paginated<T> {
    let options = options.normalized();
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(options.offset() as usize)
        .take(options.limit as usize)
        .collect();
    Paginated::from_page(items, total, options)
}

/// Which rows of a soft-deletable table a query sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrashMode {
    /// Live and trashed rows
    All,
    /// Trashed rows only
    Only,
    /// Live rows only
    #[default]
    None,
}

impl TrashMode {
    /// SQL condition on `deleted_at` for this mode, if any
    pub fn condition(&self, column: &str) -> Option<String> {
        match self {
            TrashMode::All => None,
            TrashMode::Only => Some(format!("{} IS NOT NULL", column)),
            TrashMode::None => Some(format!("{} IS NULL", column)),
        }
    }
}

/// A node that can be built into and walked as a tree
pub trait TreeNode: Sized {
    fn id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
    fn take_children(&mut self) -> Vec<Self>;
    fn set_children(&mut self, children: Vec<Self>);
    fn set_depth(&mut self, depth: u32);
}

/// Assemble flat rows into a forest with siblings sorted by `cmp`.
/// Rows whose parent is not among `rows` become roots.
pub fn build_tree<T, F>(rows: Vec<T>, cmp: F) -> Vec<T>
where
    T: TreeNode,
    F: Fn(&T, &T) -> Ordering,
{
    fn attach<T: TreeNode>(
        parent: Option<String>,
        by_parent: &mut HashMap<Option<String>, Vec<T>>,
        cmp: &dyn Fn(&T, &T) -> Ordering,
    ) -> Vec<T> {
        let mut nodes = by_parent.remove(&parent).unwrap_or_default();
        nodes.sort_by(|a, b| cmp(a, b));
        for node in nodes.iter_mut() {
            let children = attach(Some(node.id().to_string()), by_parent, cmp);
            node.set_children(children);
        }
        nodes
    }

    let ids: HashSet<String> = rows.iter().map(|n| n.id().to_string()).collect();
    let mut by_parent: HashMap<Option<String>, Vec<T>> = HashMap::new();
    for row in rows {
        let key = row
            .parent_id()
            .filter(|p| ids.contains(*p))
            .map(String::from);
        by_parent.entry(key).or_default().push(row);
    }
    attach(None, &mut by_parent, &cmp)
}

/// Flatten a forest into pre-order with `depth` set on every node
pub fn flatten_tree<T: TreeNode>(roots: Vec<T>) -> Vec<T> {
    fn walk<T: TreeNode>(nodes: Vec<T>, depth: u32, out: &mut Vec<T>) {
        for mut node in nodes {
            node.set_depth(depth);
            let children = node.take_children();
            out.push(node);
            walk(children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(roots, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Node {
        name: &'static str,
        parent: Option<&'static str>,
        depth: u32,
        children: Vec<Node>,
    }

    impl TreeNode for Node {
        fn id(&self) -> &str {
            self.name
        }

        fn parent_id(&self) -> Option<&str> {
            self.parent
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

    fn node(name: &'static str, children: Vec<Node>) -> Node {
        Node {
            name,
            parent: None,
            depth: 99,
            children,
        }
    }

    #[test]
    fn test_options_normalized() {
        assert_eq!(PaginateOptions::new(0, 0), PaginateOptions { page: 1, limit: 1 });
        assert_eq!(PaginateOptions::new(3, 500).limit, MAX_LIMIT);
        assert_eq!(PaginateOptions::default().limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: PaginateOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PaginateOptions::default());
    }

    #[test]
    fn test_meta_last_page_holds_remainder() {
        let meta = PaginateMeta::new(PaginateOptions::new(3, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.item_count, 5);
        assert_eq!(meta.current_page, 3);
    }

    #[test]
    fn test_meta_past_end_and_empty() {
        let meta = PaginateMeta::new(PaginateOptions::new(4, 10), 25);
        assert_eq!(meta.item_count, 0);

        let meta = PaginateMeta::new(PaginateOptions::default(), 0);
        assert_eq!(meta.item_count, 0);
        assert_eq!(meta.total_pages, 0);
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let json = serde_json::to_value(PaginateMeta::new(PaginateOptions::default(), 1)).unwrap();
        assert_eq!(json["totalItems"], 1);
        assert_eq!(json["itemCount"], 1);
        assert_eq!(json["perPage"], 10);
    }

    #[test]
    fn test_paginate_slice() {
        let page = paginate_slice(PaginateOptions::new(2, 2), vec![1, 2, 3, 4, 5]);
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.meta.total_items, 5);
        assert_eq!(page.meta.total_pages, 3);
    }

    #[test]
    fn test_trash_mode_condition() {
        assert_eq!(TrashMode::All.condition("p.deleted_at"), None);
        assert_eq!(
            TrashMode::Only.condition("deleted_at").as_deref(),
            Some("deleted_at IS NOT NULL")
        );
        let mode: TrashMode = serde_json::from_str("\"only\"").unwrap();
        assert_eq!(mode, TrashMode::Only);
    }

    #[test]
    fn test_flatten_tree_pre_order_with_depth() {
        let tree = vec![
            node("a", vec![node("a1", vec![node("a1x", vec![])]), node("a2", vec![])]),
            node("b", vec![]),
        ];

        let flat = flatten_tree(tree);
        let names: Vec<_> = flat.iter().map(|n| n.name).collect();
        let depths: Vec<_> = flat.iter().map(|n| n.depth).collect();

        assert_eq!(names, vec!["a", "a1", "a1x", "a2", "b"]);
        assert_eq!(depths, vec![0, 1, 2, 1, 0]);
        assert!(flat.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn test_build_tree_sorts_siblings_and_keeps_orphans() {
        let row = |name, parent| Node {
            name,
            parent,
            depth: 0,
            children: Vec::new(),
        };
        let tree = build_tree(
            vec![
                row("b", None),
                row("a2", Some("a")),
                row("a", None),
                row("a1", Some("a")),
                row("lost", Some("gone")),
            ],
            |x, y| x.name.cmp(y.name),
        );

        let roots: Vec<_> = tree.iter().map(|n| n.name).collect();
        assert_eq!(roots, vec!["a", "b", "lost"]);
        let children: Vec<_> = tree[0].children.iter().map(|n| n.name).collect();
        assert_eq!(children, vec!["a1", "a2"]);
    }

    proptest! {
        #[test]
        fn prop_item_count_never_exceeds_limit(total in 0u64..1000, page in 0u32..200, limit in 0u32..300) {
            let meta = PaginateMeta::new(PaginateOptions { page, limit }, total);
            prop_assert!(meta.item_count <= meta.per_page as u64);
            prop_assert!(meta.item_count <= total);
            prop_assert!(meta.per_page >= 1 && meta.per_page <= MAX_LIMIT);
        }

        #[test]
        fn prop_slice_matches_meta(len in 0usize..300, page in 1u32..40, limit in 1u32..50) {
            let page = paginate_slice(PaginateOptions::new(page, limit), (0..len).collect::<Vec<_>>());
            prop_assert_eq!(page.items.len() as u64, page.meta.item_count);
        }
    }
}
