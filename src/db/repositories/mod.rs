//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod category;
pub mod comment;
pub mod post;
pub mod rbac;
pub mod singer;
pub mod song;
pub mod song_list;
pub mod tag;
pub mod token;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use rbac::{RbacRepository, SqlxRbacRepository};
pub use singer::{SingerRepository, SqlxSingerRepository};
pub use song::{SongRepository, SqlxSongRepository};
pub use song_list::{SongListRepository, SqlxSongListRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use token::{SqlxTokenRepository, TokenRepository};
pub use user::{SqlxUserRepository, UserRepository};
