// src/models/post.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::comment::Comment;

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid")
});

/// Publication state, stored as the `post_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,

    /// Unique URL key.
    pub slug: String,

    pub author_id: Option<i64>,
    pub body: String,
    pub status: PostStatus,

    /// Canned reply posted under top-level comments. Empty disables it.
    pub auto_response_text: String,

    /// Minutes to wait before posting the canned reply.
    pub response_delay_minutes: i32,

    /// Number of comments rejected by the profanity gate.
    pub blocked_comment_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn auto_response_enabled(&self) -> bool {
        !self.auto_response_text.is_empty()
    }

    pub fn response_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.response_delay_minutes.max(0)))
    }
}

/// Insert payload for a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub author_id: Option<i64>,
    pub body: String,
    pub status: PostStatus,
    pub auto_response_text: String,
    pub response_delay_minutes: i32,
}

/// Partial update of a post. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub body: Option<String>,
    pub status: Option<PostStatus>,
    pub auto_response_text: Option<String>,
    pub response_delay_minutes: Option<i32>,
}

impl PostChanges {
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(slug) = &self.slug {
            post.slug = slug.clone();
        }
        if let Some(body) = &self.body {
            post.body = body.clone();
        }
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(text) = &self.auto_response_text {
            post.auto_response_text = text.clone();
        }
        if let Some(delay) = self.response_delay_minutes {
            post.response_delay_minutes = delay;
        }
    }
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 250,
        message = "Title length must be between 1 and 250 chars"
    ))]
    pub title: String,

    /// Derived from the title when omitted.
    #[validate(length(min = 1, max = 250), custom(function = validate_slug))]
    pub slug: Option<String>,

    #[validate(length(min = 1, message = "Body must not be empty"))]
    pub body: String,

    pub status: Option<PostStatus>,

    #[validate(length(max = 10000))]
    pub auto_response_text: Option<String>,

    #[validate(range(min = 0, max = 525_600))]
    pub response_delay_minutes: Option<i32>,
}

/// DTO for a partial post update.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(
        min = 1,
        max = 250,
        message = "Title length must be between 1 and 250 chars"
    ))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 250), custom(function = validate_slug))]
    pub slug: Option<String>,

    #[validate(length(min = 1, message = "Body must not be empty"))]
    pub body: Option<String>,

    pub status: Option<PostStatus>,

    #[validate(length(max = 10000))]
    pub auto_response_text: Option<String>,

    #[validate(range(min = 0, max = 525_600))]
    pub response_delay_minutes: Option<i32>,
}

impl From<UpdatePostRequest> for PostChanges {
    fn from(req: UpdatePostRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            body: req.body,
            status: req.status,
            auto_response_text: req.auto_response_text,
            response_delay_minutes: req.response_delay_minutes,
        }
    }
}

/// A post together with every comment on it.
#[derive(Debug, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Restricts slugs to letters, digits, hyphens and underscores.
fn validate_slug(slug: &str) -> Result<(), validator::ValidationError> {
    if !SLUG_RE.is_match(slug) {
        return Err(validator::ValidationError::new("invalid_slug"));
    }
    Ok(())
}

/// Builds a slug from free text: lowercase ASCII words joined by hyphens.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_joins_words() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   2024 edition "), "rust-2024-edition");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slug_validation() {
        assert!(validate_slug("new-post_1").is_ok());
        assert!(validate_slug("new post").is_err());
    }

    #[test]
    fn delay_never_negative() {
        let now = Utc::now();
        let post = Post {
            id: 1,
            title: "t".into(),
            slug: "t".into(),
            author_id: None,
            body: "b".into(),
            status: PostStatus::Draft,
            auto_response_text: String::new(),
            response_delay_minutes: -5,
            blocked_comment_count: 0,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(post.response_delay(), chrono::Duration::zero());
        assert!(!post.auto_response_enabled());
    }
}
