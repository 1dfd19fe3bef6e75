//! Data models
//!
//! Entities, request inputs and list queries shared by repositories,
//! services and the HTTP layer.

mod category;
mod comment;
mod music;
pub mod pagination;
mod post;
mod rbac;
mod tag;
mod token;
mod user;

pub use category::{
    build_category_tree, Category, CategoryQuery, CreateCategoryInput, UpdateCategoryInput,
    CATEGORY_NAME_MAX,
};
pub use comment::{
    build_comment_tree, Comment, CommentQuery, CommentRecord, CreateCommentInput,
    COMMENT_BODY_MAX,
};
pub use music::{
    Singer, SingerInput, SingerQuery, Song, SongInput, SongList, SongListInput, SongListQuery,
    SongQuery, SINGER_NAME_MAX, SONG_NAME_MAX,
};
pub use pagination::{
    flatten_tree, paginate_slice, PaginateMeta, PaginateOptions, Paginated, TrashMode, TreeNode,
};
pub use post::{
    BodyType, CreatePostInput, Post, PostFilter, PostOrder, PostQuery, PostRecord,
    UpdatePostInput, POST_KEYWORD_MAX, POST_SEARCH_MAX, POST_SUMMARY_MAX, POST_TITLE_MAX,
};
pub use rbac::{
    Permission, PermissionAction, PermissionDefinition, PermissionRule, RbacDefinition, Role,
    RoleDefinition, SyncReport, SystemRoles, SUBJECT_ALL, SYSTEM_MANAGE,
};
pub use tag::{CreateTagInput, Tag, TagQuery, UpdateTagInput, TAG_DESCRIPTION_MAX, TAG_NAME_MAX};
pub use token::{AccessToken, RefreshToken, TokenPair};
pub use user::{CreateUserInput, UniqueField, UpdateUserInput, User, UserQuery, UserSummary};

use serde::{Deserialize, Deserializer};

/// Deserialize a nullable field so that `null` and "absent" differ:
/// absent is `None` (with `#[serde(default)]`), `null` is `Some(None)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Ids in a request body, used by batch delete and restore
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdsInput {
    pub ids: Vec<String>,
    /// Soft delete instead of removing rows
    #[serde(default)]
    pub trash: bool,
}
