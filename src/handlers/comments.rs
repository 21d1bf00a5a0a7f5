// src/handlers/comments.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        comment::{CreateCommentRequest, NewComment, UpdateCommentRequest},
        pagination::PageParams,
    },
    services::ContentService,
    utils::jwt::Claims,
};

/// List all comments, newest first.
pub async fn list_comments(
    State(content): State<ContentService>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(content.list_comments(params.page()).await?))
}

pub async fn get_comment(
    State(content): State<ContentService>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(content.get_comment(id).await?))
}

/// Post a comment (or a reply, with `parent_id`) as the caller.
pub async fn create_comment(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let comment = content
        .submit_comment(NewComment {
            post_id: payload.post_id,
            author_id: Some(claims.user_id()?),
            body: payload.body,
            parent_id: payload.parent_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Replace a comment's body. Author or admin only.
pub async fn update_comment(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let comment = content.get_comment(id).await?;
    if !claims.can_modify(comment.author_id) {
        return Err(AppError::Forbidden(
            "You can only edit your own comments.".to_string(),
        ));
    }

    Ok(Json(content.edit_comment(&comment, payload.body).await?))
}

/// Delete a comment and its replies. Author or admin only.
pub async fn delete_comment(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comment = content.get_comment(id).await?;
    if !claims.can_modify(comment.author_id) {
        return Err(AppError::Forbidden(
            "You can only delete your own comments.".to_string(),
        ));
    }

    content.delete_comment(&comment).await?;
    Ok(StatusCode::NO_CONTENT)
}
