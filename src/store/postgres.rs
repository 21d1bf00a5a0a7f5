use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ContentStore, StoreError, comment_not_found, post_not_found};
use crate::models::{
    comment::{Comment, NewComment},
    pagination::Page,
    post::{NewPost, Post, PostChanges},
    user::{NewUser, User},
};

const POST_COLUMNS: &str = "id, title, slug, author_id, body, status, auto_response_text, \
     response_delay_minutes, blocked_comment_count, created_at, updated_at";

/// Unique index on `lower(email)`, see the init migration.
const USERS_EMAIL_INDEX: &str = "users_email_lower_idx";

const COMMENT_COLUMNS: &str = "id, post_id, author_id, body, parent_id, created_at";

/// [`ContentStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps unique violations to `Conflict` with a caller-supplied message.
fn conflict_or(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message()),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password, role, created_at
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password)
        .bind(&new.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let email_taken = matches!(
                &e,
                sqlx::Error::Database(db) if db.constraint() == Some(USERS_EMAIL_INDEX)
            );
            conflict_or(e, || {
                if email_taken {
                    "Email already registered.".to_string()
                } else {
                    format!("Username '{}' already exists", new.username)
                }
            })
        })
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(taken)
    }

    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO posts (title, slug, author_id, body, status, auto_response_text, response_delay_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {POST_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Post>(&sql)
            .bind(&new.title)
            .bind(&new.slug)
            .bind(new.author_id)
            .bind(&new.body)
            .bind(new.status)
            .bind(&new.auto_response_text)
            .bind(new.response_delay_minutes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, || format!("Slug '{}' already exists", new.slug)))
    }

    async fn get_post(&self, id: i64) -> Result<Post, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");

        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(post_not_found)
    }

    async fn get_post_by_slug(&self, slug: &str) -> Result<Post, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1");

        sqlx::query_as::<_, Post>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(post_not_found)
    }

    async fn list_published_posts(&self, page: Page) -> Result<(Vec<Post>, i64), StoreError> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE status = 'published'
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        );

        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE status = 'published'")
            .fetch_one(&self.pool)
            .await?;

        Ok((posts, count))
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError> {
        let sql = format!(
            r#"
            UPDATE posts SET
                title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                body = COALESCE($4, body),
                status = COALESCE($5, status),
                auto_response_text = COALESCE($6, auto_response_text),
                response_delay_minutes = COALESCE($7, response_delay_minutes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );

        let slug = changes.slug.clone();
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.slug)
            .bind(changes.body)
            .bind(changes.status)
            .bind(changes.auto_response_text)
            .bind(changes.response_delay_minutes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!("Slug '{}' already exists", slug.unwrap_or_default())
                })
            })?
            .ok_or_else(post_not_found)
    }

    async fn increment_blocked_comments(&self, post_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE posts SET blocked_comment_count = blocked_comment_count + 1 WHERE id = $1",
        )
        .bind(post_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(post_not_found());
        }
        Ok(())
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(post_not_found());
        }
        Ok(())
    }

    async fn create_comment(&self, new: NewComment) -> Result<Comment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO comments (post_id, author_id, body, parent_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );

        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(new.post_id)
            .bind(new.author_id)
            .bind(&new.body)
            .bind(new.parent_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(comment)
    }

    async fn get_comment(&self, id: i64) -> Result<Comment, StoreError> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");

        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(comment_not_found)
    }

    async fn list_comments(&self, page: Page) -> Result<(Vec<Comment>, i64), StoreError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );

        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;

        Ok((comments, count))
    }

    async fn comments_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at DESC, id DESC"
        );

        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(comments)
    }

    async fn comments_created_between(
        &self,
        post_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Comment>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE post_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at DESC, id DESC
            "#
        );

        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;

        Ok(comments)
    }

    async fn update_comment_body(&self, id: i64, body: String) -> Result<Comment, StoreError> {
        let sql = format!("UPDATE comments SET body = $2 WHERE id = $1 RETURNING {COMMENT_COLUMNS}");

        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(body)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(comment_not_found)
    }

    async fn delete_comment(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(comment_not_found());
        }
        Ok(())
    }
}
