//! Persistence surface for users, posts and comments.
//!
//! Handlers and services only see [`ContentStore`]; the Postgres backend is
//! used in production and the memory backend for local runs and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    comment::{Comment, NewComment},
    pagination::Page,
    post::{NewPost, Post, PostChanges},
    user::{NewUser, User},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    /// A unique constraint was violated.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError>;

    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError>;

    async fn get_post(&self, id: i64) -> Result<Post, StoreError>;

    async fn get_post_by_slug(&self, slug: &str) -> Result<Post, StoreError>;

    /// Published posts, newest first, plus the total count.
    async fn list_published_posts(&self, page: Page) -> Result<(Vec<Post>, i64), StoreError>;

    /// Applies `changes` and bumps `updated_at`.
    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError>;

    /// Atomically adds one to `blocked_comment_count`.
    async fn increment_blocked_comments(&self, post_id: i64) -> Result<(), StoreError>;

    /// Deletes the post and, transitively, its comments.
    async fn delete_post(&self, id: i64) -> Result<(), StoreError>;

    async fn create_comment(&self, new: NewComment) -> Result<Comment, StoreError>;

    async fn get_comment(&self, id: i64) -> Result<Comment, StoreError>;

    /// All comments, newest first, plus the total count.
    async fn list_comments(&self, page: Page) -> Result<(Vec<Comment>, i64), StoreError>;

    async fn comments_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError>;

    /// Comments of a post with `from <= created_at < until`, newest first.
    async fn comments_created_between(
        &self,
        post_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Comment>, StoreError>;

    async fn update_comment_body(&self, id: i64, body: String) -> Result<Comment, StoreError>;

    /// Deletes the comment and, transitively, its replies.
    async fn delete_comment(&self, id: i64) -> Result<(), StoreError>;
}

pub(crate) fn post_not_found() -> StoreError {
    StoreError::NotFound("Post not found".to_string())
}

pub(crate) fn comment_not_found() -> StoreError {
    StoreError::NotFound("Comment not found".to_string())
}
