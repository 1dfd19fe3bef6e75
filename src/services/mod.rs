//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories and
//! the cache. Each one reports failures through its own error enum.

pub mod auth;
pub mod category;
pub mod comment;
pub mod music;
pub mod password;
pub mod post;
pub mod rbac;
pub mod sanitize;
pub mod search;
pub mod tag;
pub mod token;
pub mod user;

pub use auth::{
    AuthService, AuthServiceError, Authenticated, LoginInput, RegisterInput, UpdatePasswordInput,
    UpdateProfileInput,
};
pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use music::{MusicService, MusicServiceError};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use rbac::{Ability, RbacResolver};
pub use sanitize::sanitize_html;
pub use search::{MeilisearchIndex, PostIndex};
pub use tag::{TagService, TagServiceError};
pub use token::{IssuedToken, TokenClaims, TokenService};
pub use user::{UserService, UserServiceError};
