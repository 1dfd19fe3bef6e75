//! Comment service

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{
    build_comment_tree, flatten_tree, paginate_slice, Comment, CommentQuery, CommentRecord,
    CreateCommentInput, Paginated, COMMENT_BODY_MAX,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { repo, posts }
    }

    /// Comment threads, of one post or of all posts
    pub async fn find_trees(&self, post: Option<&str>) -> Result<Vec<Comment>, CommentServiceError> {
        let rows = self.repo.list(post, None).await?;
        Ok(build_comment_tree(rows))
    }

    /// Flattened threads with depth, paged in memory
    pub async fn paginate(&self, query: &CommentQuery) -> Result<Paginated<Comment>, CommentServiceError> {
        let rows = self
            .repo
            .list(query.post.as_deref(), query.author.as_deref())
            .await?;
        let flat = flatten_tree(build_comment_tree(rows));
        Ok(paginate_slice(query.options(), flat))
    }

    pub async fn detail(&self, id: &str) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(id.to_string()))
    }

    pub async fn create(
        &self,
        input: CreateCommentInput,
        author_id: &str,
    ) -> Result<Comment, CommentServiceError> {
        let body = input.body.trim();
        let len = body.chars().count();
        if len == 0 || len > COMMENT_BODY_MAX {
            return Err(CommentServiceError::ValidationError(format!(
                "Comment body must be 1 to {} characters",
                COMMENT_BODY_MAX
            )));
        }
        if self.posts.get_by_id(&input.post, false).await?.is_none() {
            return Err(CommentServiceError::ValidationError(format!(
                "Post {} does not exist",
                input.post
            )));
        }
        if let Some(parent_id) = &input.parent {
            let parent = self.repo.get_by_id(parent_id).await?.ok_or_else(|| {
                CommentServiceError::ValidationError(format!(
                    "Parent comment {} does not exist",
                    parent_id
                ))
            })?;
            if parent.post_id != input.post {
                return Err(CommentServiceError::Forbidden(
                    "Parent comment and child comment must belong same post!".to_string(),
                ));
            }
        }

        let record = CommentRecord::new(body.to_string(), input.post, input.parent, author_id.to_string());
        let comment = self.repo.create(&record).await?;
        tracing::debug!("Comment {} added to post {}", comment.id, comment.post_id);
        Ok(comment)
    }

    /// Replies are removed with their parents
    pub async fn delete(&self, ids: &[String]) -> Result<u64, CommentServiceError> {
        Ok(self.repo.delete(ids).await?)
    }

    pub async fn owner_ids(&self, ids: &[String]) -> Result<Vec<String>, CommentServiceError> {
        Ok(self.repo.author_ids(ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCommentRepository, SqlxPostRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{Post, PostRecord, User};

    struct Fixture {
        _pool: DynDatabasePool,
        service: CommentService,
        author: User,
        post: Post,
        other_post: Post,
    }

    async fn setup_test_service() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let author = SqlxUserRepository::new(pool.clone())
            .create(&User::new("reader".to_string(), "hash".to_string()), &[], &[])
            .await
            .unwrap();
        let posts = SqlxPostRepository::boxed(pool.clone());
        let post = posts
            .create(&PostRecord::new("First".to_string(), "body".to_string(), author.id.clone()))
            .await
            .unwrap();
        let other_post = posts
            .create(&PostRecord::new("Second".to_string(), "body".to_string(), author.id.clone()))
            .await
            .unwrap();

        Fixture {
            service: CommentService::new(SqlxCommentRepository::boxed(pool.clone()), posts),
            _pool: pool,
            author,
            post,
            other_post,
        }
    }

    #[tokio::test]
    async fn test_threads_and_pagination() {
        let f = setup_test_service().await;
        let root = f
            .service
            .create(CreateCommentInput::new("root", &f.post.id), &f.author.id)
            .await
            .unwrap();
        f.service
            .create(CreateCommentInput::new("reply", &f.post.id).reply_to(&root.id), &f.author.id)
            .await
            .unwrap();
        f.service
            .create(CreateCommentInput::new("elsewhere", &f.other_post.id), &f.author.id)
            .await
            .unwrap();

        let tree = f.service.find_trees(Some(&f.post.id)).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].body, "reply");
        assert_eq!(f.service.find_trees(None).await.unwrap().len(), 2);

        let page = f
            .service
            .paginate(&CommentQuery {
                post: Some(f.post.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        let flat: Vec<_> = page.items.iter().map(|c| (c.body.as_str(), c.depth)).collect();
        assert_eq!(flat, vec![("root", 0), ("reply", 1)]);
    }

    #[tokio::test]
    async fn test_parent_must_belong_to_same_post() {
        let f = setup_test_service().await;
        let root = f
            .service
            .create(CreateCommentInput::new("root", &f.post.id), &f.author.id)
            .await
            .unwrap();

        let result = f
            .service
            .create(
                CreateCommentInput::new("stray", &f.other_post.id).reply_to(&root.id),
                &f.author.id,
            )
            .await;
        match result {
            Err(CommentServiceError::Forbidden(msg)) => {
                assert_eq!(msg, "Parent comment and child comment must belong same post!")
            }
            other => panic!("expected Forbidden, got {:?}", other.map(|c| c.id)),
        }
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = setup_test_service().await;

        let empty = f
            .service
            .create(CreateCommentInput::new("   ", &f.post.id), &f.author.id)
            .await;
        assert!(matches!(empty, Err(CommentServiceError::ValidationError(_))));

        let long = f
            .service
            .create(CreateCommentInput::new("x".repeat(1001), &f.post.id), &f.author.id)
            .await;
        assert!(matches!(long, Err(CommentServiceError::ValidationError(_))));

        let no_post = f
            .service
            .create(CreateCommentInput::new("hi", "missing"), &f.author.id)
            .await;
        assert!(matches!(no_post, Err(CommentServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_delete_and_owner_ids() {
        let f = setup_test_service().await;
        let root = f
            .service
            .create(CreateCommentInput::new("root", &f.post.id), &f.author.id)
            .await
            .unwrap();
        let reply = f
            .service
            .create(CreateCommentInput::new("reply", &f.post.id).reply_to(&root.id), &f.author.id)
            .await
            .unwrap();

        assert_eq!(
            f.service.owner_ids(&[root.id.clone()]).await.unwrap(),
            vec![f.author.id.clone()]
        );
        f.service.delete(&[root.id.clone()]).await.unwrap();
        assert!(matches!(
            f.service.detail(&reply.id).await,
            Err(CommentServiceError::NotFound(_))
        ));
    }
}
