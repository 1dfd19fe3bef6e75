//! Application assembly
//!
//! Wires repositories, services and the search index into the state shared
//! by the HTTP layer.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;
use crate::cache::Cache;
use crate::config::{Config, SearchType};
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository, SqlxRbacRepository,
    SqlxSingerRepository, SqlxSongListRepository, SqlxSongRepository, SqlxTagRepository,
    SqlxTokenRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    AuthService, CategoryService, CommentService, MeilisearchIndex, MusicService, PostService,
    RbacResolver, TagService, TokenService, UserService,
};

/// How often expired tokens are pruned
pub const TOKEN_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Build every service over `pool` and `cache`.
///
/// With `search_type: meilisearch` the index settings are pushed before the
/// index is attached to the post service. A setup failure is only logged.
pub async fn build_state(config: &Config, pool: DynDatabasePool, cache: Arc<Cache>) -> Result<AppState> {
    let users = SqlxUserRepository::boxed(pool.clone());
    let rbac_repo = SqlxRbacRepository::boxed(pool.clone());
    let categories = SqlxCategoryRepository::boxed(pool.clone());
    let tags = SqlxTagRepository::boxed(pool.clone());
    let posts = SqlxPostRepository::boxed(pool.clone());

    let user_service = Arc::new(UserService::new(users.clone(), rbac_repo.clone()));
    let token_service = Arc::new(TokenService::new(
        SqlxTokenRepository::boxed(pool.clone()),
        config.auth.clone(),
    ));
    let auth_service = Arc::new(AuthService::new(user_service.clone(), token_service.clone()));

    let mut post_service = PostService::new(
        posts.clone(),
        categories.clone(),
        tags.clone(),
        users,
        cache.clone(),
        config.content.clone(),
    );
    if config.content.search_type == SearchType::Meilisearch {
        let index = MeilisearchIndex::new(&config.meilisearch)?;
        if let Err(e) = index.setup().await {
            tracing::warn!("Failed to configure Meilisearch index: {:#}", e);
        }
        post_service = post_service.with_index(Arc::new(index));
    }

    Ok(AppState {
        auth_service,
        token_service,
        user_service,
        rbac: Arc::new(RbacResolver::new(rbac_repo)),
        category_service: Arc::new(CategoryService::new(categories, cache.clone())),
        tag_service: Arc::new(TagService::new(tags, cache)),
        post_service: Arc::new(post_service),
        comment_service: Arc::new(CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            posts,
        )),
        music_service: Arc::new(MusicService::new(
            SqlxSingerRepository::boxed(pool.clone()),
            SqlxSongRepository::boxed(pool.clone()),
            SqlxSongListRepository::boxed(pool),
        )),
    })
}

/// Prune expired tokens every `interval`, forever
pub fn spawn_token_pruner(tokens: Arc<TokenService>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = tokens.delete_expired().await {
                tracing::warn!("Failed to prune expired tokens: {:#}", e);
            }
        }
    })
}
