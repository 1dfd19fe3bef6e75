//! Demo dataset
//!
//! Fills an empty database with a small, deterministic blog and music
//! catalog. Everything goes through the services so validation, caches and
//! the search index behave as they do for API writes.

use anyhow::Result;

use crate::api::AppState;
use crate::models::{
    CreateCategoryInput, CreateCommentInput, CreatePostInput, CreateTagInput, CreateUserInput,
    PostQuery, SingerInput, SongInput, SongListInput, TrashMode,
};

pub const DEMO_AUTHOR: &str = "demo-author";
pub const DEMO_PASSWORD: &str = "demo123456";

/// What a seeding run inserted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub tags: usize,
    pub posts: usize,
    pub comments: usize,
    pub singers: usize,
    pub songs: usize,
    pub song_lists: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Category tree as (name, children)
const CATEGORIES: &[(&str, &[&str])] = &[
    ("Programming", &["Rust", "TypeScript"]),
    ("Music", &["Pop", "Folk"]),
    ("Life", &[]),
];

const TAGS: &[(&str, &str)] = &[
    ("rust", "Systems programming"),
    ("web", "Servers and browsers"),
    ("mandopop", "Mandarin popular music"),
];

/// (title, category, tags, comment thread depth)
const POSTS: &[(&str, &str, &[&str], usize)] = &[
    ("Getting started with axum", "Rust", &["rust", "web"], 3),
    ("Typed APIs end to end", "TypeScript", &["web"], 2),
    ("Notes on Jay Chou's early albums", "Pop", &["mandopop"], 2),
    ("A quiet week", "Life", &[], 0),
];

/// (name, sex, location, songs)
const SINGERS: &[(&str, i32, &str, &[&str])] = &[
    ("周杰伦", 1, "Taiwan", &["晴天", "七里香", "稻香"]),
    ("陈绮贞", 0, "Taiwan", &["旅行的意义"]),
    ("五月天", 2, "Taiwan", &["倔强", "温柔"]),
];

const SONG_LISTS: &[(&str, &str)] = &[("Sunday Morning", "Folk"), ("Road Trip", "Pop")];

/// Insert the demo dataset unless posts already exist
pub async fn seed(state: &AppState) -> Result<SeedReport> {
    let existing = state
        .post_service
        .paginate(&PostQuery {
            limit: 1,
            trashed: TrashMode::All,
            ..Default::default()
        })
        .await?;
    if existing.meta.total_items > 0 {
        tracing::info!(
            "Database already has {} post(s), skipping seed",
            existing.meta.total_items
        );
        return Ok(SeedReport::default());
    }

    let mut report = SeedReport::default();
    let author = match state.user_service.find_by_credential(DEMO_AUTHOR).await? {
        Some(user) => user,
        None => {
            let mut input = CreateUserInput::new(DEMO_AUTHOR, DEMO_PASSWORD);
            input.nickname = Some("Demo Author".to_string());
            let user = state.user_service.create(input).await?;
            tracing::info!("Created demo author {}", user.username);
            user
        }
    };

    let mut category_ids = Vec::new();
    for (order, (name, children)) in CATEGORIES.iter().enumerate() {
        let parent = state
            .category_service
            .create(CreateCategoryInput::new(*name).with_order(order as i32))
            .await?;
        report.categories += 1;
        for (child_order, child) in children.iter().enumerate() {
            let created = state
                .category_service
                .create(
                    CreateCategoryInput::new(*child)
                        .with_parent(parent.id.clone())
                        .with_order(child_order as i32),
                )
                .await?;
            category_ids.push((*child, created.id));
            report.categories += 1;
        }
        category_ids.push((*name, parent.id));
    }

    let mut tag_ids = Vec::new();
    for (name, description) in TAGS {
        let mut input = CreateTagInput::new(*name);
        input.description = Some(description.to_string());
        let tag = state.tag_service.create(input).await?;
        tag_ids.push((*name, tag.id));
        report.tags += 1;
    }

    for (title, category, tags, depth) in POSTS {
        let mut input = CreatePostInput::new(*title, format!("# {}\n\nDemo content for {}.", title, title));
        input.summary = Some(format!("About {}", title.to_lowercase()));
        input.publish = Some(true);
        input.category = lookup(&category_ids, category);
        input.tags = tags.iter().filter_map(|t| lookup(&tag_ids, t)).collect();
        let post = state.post_service.create(input, &author.id).await?;
        report.posts += 1;

        // one reply chain per post
        let mut parent: Option<String> = None;
        for level in 0..*depth {
            let mut input = CreateCommentInput::new(format!("Comment level {}", level + 1), post.id.clone());
            if let Some(parent) = parent.take() {
                input = input.reply_to(parent);
            }
            let comment = state.comment_service.create(input, &author.id).await?;
            parent = Some(comment.id);
            report.comments += 1;
        }
    }

    for (name, sex, location, songs) in SINGERS {
        let singer = state
            .music_service
            .create_singer(SingerInput {
                name: name.to_string(),
                sex: *sex,
                location: Some(location.to_string()),
                ..Default::default()
            })
            .await?;
        report.singers += 1;
        for song in songs.iter() {
            state
                .music_service
                .create_song(SongInput {
                    singer_id: singer.id,
                    name: song.to_string(),
                    url: format!("/song/{}-{}.mp3", singer.id, song),
                    ..Default::default()
                })
                .await?;
            report.songs += 1;
        }
    }

    for (title, style) in SONG_LISTS {
        state
            .music_service
            .create_song_list(SongListInput {
                title: title.to_string(),
                style: Some(style.to_string()),
                ..Default::default()
            })
            .await?;
        report.song_lists += 1;
    }

    tracing::info!("Seeded {:?}", report);
    Ok(report)
}

fn lookup(pairs: &[(&str, String)], name: &str) -> Option<String> {
    pairs.iter().find(|(n, _)| *n == name).map(|(_, id)| id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_state;
    use crate::cache::{Cache, MemoryCache};
    use crate::config::Config;
    use crate::db::repositories::SqlxRbacRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::CommentQuery;
    use crate::services::RbacResolver;
    use std::sync::Arc;

    async fn setup_test_state() -> AppState {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        RbacResolver::new(SqlxRbacRepository::boxed(pool.clone()))
            .sync()
            .await
            .expect("Failed to sync rbac");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        build_state(&Config::default(), pool, cache)
            .await
            .expect("Failed to build state")
    }

    #[tokio::test]
    async fn test_seed_inserts_dataset_once() {
        let state = setup_test_state().await;

        let report = seed(&state).await.unwrap();
        assert_eq!(report.categories, 7);
        assert_eq!(report.tags, 3);
        assert_eq!(report.posts, 4);
        assert_eq!(report.comments, 7);
        assert_eq!(report.singers, 3);
        assert_eq!(report.songs, 6);
        assert_eq!(report.song_lists, 2);

        let tree = state.category_service.find_trees().await.unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(state.music_service.query_singer_list().await.unwrap().len(), 3);

        let again = seed(&state).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_seed_builds_reply_chain() {
        let state = setup_test_state().await;
        seed(&state).await.unwrap();

        let posts = state.post_service.paginate(&PostQuery::default()).await.unwrap();
        let post = posts
            .items
            .iter()
            .find(|p| p.title == "Getting started with axum")
            .unwrap();
        let trees = state.comment_service.find_trees(Some(&post.id)).await.unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].children.len(), 1);
        assert_eq!(trees[0].children[0].children.len(), 1);

        let all = state
            .comment_service
            .paginate(&CommentQuery {
                post: Some(post.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.meta.total_items, 3);
    }
}
