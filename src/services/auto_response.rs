//! The deferred auto-response job.
//!
//! Runs some minutes after a top-level comment was created and posts the
//! post's canned reply underneath it, authored by the post's author.

use async_trait::async_trait;

use crate::error::AppError;
use crate::jobs::scheduler::AutoResponsePayload;
use crate::jobs::{JobFailure, JobHandler};
use crate::models::comment::{Comment, NewComment};
use crate::store::StoreError;

use super::ContentService;

#[derive(Debug, thiserror::Error)]
pub enum AutoResponseError {
    #[error("comment {0} not found")]
    CommentNotFound(i64),

    #[error("post {0} not found")]
    PostNotFound(i64),

    /// The post's auto-response was cleared after the job was scheduled.
    #[error("post {0} has no auto-response configured")]
    Disabled(i64),

    /// The reply text did not pass the profanity gate.
    #[error("auto-response rejected: {0}")]
    Rejected(String),

    #[error("store failure: {0}")]
    Store(String),
}

impl AutoResponseError {
    /// Only infrastructure failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AutoResponseError::Store(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AutoResponseError::CommentNotFound(_) | AutoResponseError::PostNotFound(_)
        )
    }
}

pub struct AutoResponseWorker {
    content: ContentService,
}

impl AutoResponseWorker {
    pub fn new(content: ContentService) -> Self {
        Self { content }
    }

    /// Posts the auto-response under `comment_id`.
    pub async fn run(&self, comment_id: i64) -> Result<Comment, AutoResponseError> {
        let store = self.content.store();

        let comment = store.get_comment(comment_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => AutoResponseError::CommentNotFound(comment_id),
            other => AutoResponseError::Store(other.to_string()),
        })?;

        let post = store.get_post(comment.post_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => AutoResponseError::PostNotFound(comment.post_id),
            other => AutoResponseError::Store(other.to_string()),
        })?;

        if !post.auto_response_enabled() {
            return Err(AutoResponseError::Disabled(post.id));
        }

        // Parented to the trigger, so the reply cannot schedule another one.
        let reply = self
            .content
            .submit_comment(NewComment {
                post_id: post.id,
                author_id: post.author_id,
                body: post.auto_response_text.clone(),
                parent_id: Some(comment.id),
            })
            .await
            .map_err(|e| match e {
                AppError::Validation(msg) => AutoResponseError::Rejected(msg),
                AppError::NotFound(_) => AutoResponseError::CommentNotFound(comment_id),
                AppError::InternalServerError(msg) => AutoResponseError::Store(msg),
                other => AutoResponseError::Rejected(other.to_string()),
            })?;

        tracing::info!(
            comment_id,
            post_id = post.id,
            reply_id = reply.id,
            "auto-response posted"
        );
        Ok(reply)
    }
}

#[async_trait]
impl JobHandler for AutoResponseWorker {
    async fn handle(&self, args: &serde_json::Value) -> Result<(), JobFailure> {
        let payload: AutoResponsePayload = serde_json::from_value(args.clone())
            .map_err(|e| JobFailure::Permanent(format!("invalid payload: {e}")))?;

        match self.run(payload.comment_id).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => Err(JobFailure::Transient(e.to_string())),
            Err(e) => Err(JobFailure::Permanent(e.to_string())),
        }
    }
}
