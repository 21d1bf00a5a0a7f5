//! Post and comment write path plus the read queries behind the API.
//!
//! Every post and comment write goes through the profanity gate. A rejected
//! comment still costs its post one `blocked_comment_count`; a committed
//! top-level comment on a post with an auto-response schedules the reply.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use validator::Validate;

use crate::error::AppError;
use crate::jobs::DeferredReplyScheduler;
use crate::models::{
    comment::{Comment, CommentsInRange, NewComment},
    pagination::{Page, Paginated},
    post::{CreatePostRequest, NewPost, Post, PostChanges, PostDetail, slugify},
};
use crate::moderation::ProfanityGate;
use crate::store::{ContentStore, StoreError};

pub const PROFANITY_MESSAGE: &str = "You cannot use swearing words in the title or body.";

/// A comment write that has not been checked yet.
#[derive(Debug, Clone)]
pub enum PendingComment {
    New(NewComment),
    Edit { id: i64, post_id: i64, body: String },
}

impl PendingComment {
    fn body(&self) -> &str {
        match self {
            PendingComment::New(new) => &new.body,
            PendingComment::Edit { body, .. } => body,
        }
    }

    fn post_id(&self) -> i64 {
        match self {
            PendingComment::New(new) => new.post_id,
            PendingComment::Edit { post_id, .. } => *post_id,
        }
    }
}

/// Result of [`ContentService::attempt_comment_write`].
#[derive(Debug, Clone)]
pub enum CommentWrite {
    Committed(Comment),
    /// Nothing was written; the caller owes the post a blocked-comment count.
    RejectedProfane { post_id: i64 },
}

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn ContentStore>,
    gate: Arc<ProfanityGate>,
    scheduler: DeferredReplyScheduler,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        gate: Arc<ProfanityGate>,
        scheduler: DeferredReplyScheduler,
    ) -> Self {
        Self {
            store,
            gate,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    fn ensure_clean_post(&self, title: &str, body: &str) -> Result<(), AppError> {
        if self.gate.check(title) || self.gate.check(body) {
            return Err(AppError::Validation(PROFANITY_MESSAGE.to_string()));
        }
        Ok(())
    }

    // ---- posts -----------------------------------------------------------

    pub async fn create_post(
        &self,
        author_id: Option<i64>,
        req: CreatePostRequest,
    ) -> Result<Post, AppError> {
        req.validate()?;

        let slug = req.slug.unwrap_or_else(|| slugify(&req.title));
        if slug.is_empty() {
            return Err(AppError::BadRequest(
                "A slug is required when the title has no letters or digits".to_string(),
            ));
        }

        self.ensure_clean_post(&req.title, &req.body)?;

        let post = self
            .store
            .create_post(NewPost {
                title: req.title,
                slug,
                author_id,
                body: req.body,
                status: req.status.unwrap_or_default(),
                auto_response_text: req.auto_response_text.unwrap_or_default(),
                response_delay_minutes: req.response_delay_minutes.unwrap_or(0),
            })
            .await?;

        tracing::info!(post_id = post.id, slug = %post.slug, "post created");
        Ok(post)
    }

    /// Applies `changes` to `post` if the resulting title and body are clean.
    pub async fn update_post(&self, post: &Post, changes: PostChanges) -> Result<Post, AppError> {
        let mut preview = post.clone();
        changes.apply_to(&mut preview);
        self.ensure_clean_post(&preview.title, &preview.body)?;

        Ok(self.store.update_post(post.id, changes).await?)
    }

    pub async fn delete_post(&self, post: &Post) -> Result<(), AppError> {
        self.store.delete_post(post.id).await?;
        tracing::info!(post_id = post.id, "post deleted");
        Ok(())
    }

    pub async fn post_by_slug(&self, slug: &str) -> Result<Post, AppError> {
        Ok(self.store.get_post_by_slug(slug).await?)
    }

    pub async fn post_detail(&self, slug: &str) -> Result<PostDetail, AppError> {
        let post = self.store.get_post_by_slug(slug).await?;
        let comments = self.store.comments_for_post(post.id).await?;
        Ok(PostDetail { post, comments })
    }

    pub async fn published_posts(&self, page: Page) -> Result<Paginated<Post>, AppError> {
        let (posts, count) = self.store.list_published_posts(page).await?;
        Ok(Paginated::new(page, count, posts))
    }

    /// Comments of the post created on any UTC day in `from..=to`.
    pub async fn comments_in_range(
        &self,
        slug: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CommentsInRange, AppError> {
        let post = self.store.get_post_by_slug(slug).await?;

        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to
            .succ_opt()
            .map(|day| day.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let comments = self
            .store
            .comments_created_between(post.id, start, end)
            .await?;

        Ok(CommentsInRange {
            comments_count: comments.len(),
            comments,
            blocked_comment_count: post.blocked_comment_count,
        })
    }

    // ---- comments --------------------------------------------------------

    /// Runs the gate and writes the comment only if it passes.
    pub async fn attempt_comment_write(
        &self,
        pending: PendingComment,
    ) -> Result<CommentWrite, AppError> {
        if self.gate.check(pending.body()) {
            return Ok(CommentWrite::RejectedProfane {
                post_id: pending.post_id(),
            });
        }

        let comment = match pending {
            PendingComment::New(new) => self.store.create_comment(new).await?,
            PendingComment::Edit { id, body, .. } => {
                self.store.update_comment_body(id, body).await?
            }
        };
        Ok(CommentWrite::Committed(comment))
    }

    /// Creates a comment. Schedules the post's auto-response when the comment
    /// is top-level and the post has one configured.
    pub async fn submit_comment(&self, new: NewComment) -> Result<Comment, AppError> {
        let post = self.store.get_post(new.post_id).await?;

        if let Some(parent_id) = new.parent_id {
            let parent = self.store.get_comment(parent_id).await.map_err(|e| match e {
                StoreError::NotFound(_) => {
                    AppError::NotFound("Parent comment not found".to_string())
                }
                other => other.into(),
            })?;
            if parent.post_id != post.id {
                return Err(AppError::BadRequest(
                    "Parent comment belongs to a different post".to_string(),
                ));
            }
        }

        match self.attempt_comment_write(PendingComment::New(new)).await? {
            CommentWrite::Committed(comment) => {
                self.schedule_auto_response(&post, &comment).await;
                Ok(comment)
            }
            CommentWrite::RejectedProfane { post_id } => Err(self.reject_comment(post_id).await),
        }
    }

    /// Replaces a comment's body. Edits never schedule an auto-response.
    pub async fn edit_comment(&self, comment: &Comment, body: String) -> Result<Comment, AppError> {
        let pending = PendingComment::Edit {
            id: comment.id,
            post_id: comment.post_id,
            body,
        };

        match self.attempt_comment_write(pending).await? {
            CommentWrite::Committed(comment) => Ok(comment),
            CommentWrite::RejectedProfane { post_id } => Err(self.reject_comment(post_id).await),
        }
    }

    /// Counts the rejection against the post and builds the caller's error.
    async fn reject_comment(&self, post_id: i64) -> AppError {
        if let Err(e) = self.store.increment_blocked_comments(post_id).await {
            tracing::error!(post_id, error = %e, "failed to count blocked comment");
        } else {
            tracing::info!(post_id, "comment blocked by profanity gate");
        }
        AppError::Validation(PROFANITY_MESSAGE.to_string())
    }

    /// Fire-and-forget: a failed enqueue is logged, the comment stays.
    async fn schedule_auto_response(&self, post: &Post, comment: &Comment) {
        if !post.auto_response_enabled() || !comment.is_top_level() {
            return;
        }

        let run_at = Utc::now() + post.response_delay();
        if let Err(e) = self.scheduler.schedule(comment.id, run_at).await {
            tracing::error!(
                comment_id = comment.id,
                post_id = post.id,
                error = %e,
                "failed to schedule auto-response"
            );
        }
    }

    pub async fn get_comment(&self, id: i64) -> Result<Comment, AppError> {
        Ok(self.store.get_comment(id).await?)
    }

    pub async fn list_comments(&self, page: Page) -> Result<Paginated<Comment>, AppError> {
        let (comments, count) = self.store.list_comments(page).await?;
        Ok(Paginated::new(page, count, comments))
    }

    pub async fn delete_comment(&self, comment: &Comment) -> Result<(), AppError> {
        self.store.delete_comment(comment.id).await?;
        Ok(())
    }
}
