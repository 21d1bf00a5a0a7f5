// src/handlers/posts.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        pagination::PageParams,
        post::{CreatePostRequest, UpdatePostRequest},
    },
    services::ContentService,
    utils::jwt::Claims,
};

/// List published posts, newest first.
pub async fn list_posts(
    State(content): State<ContentService>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(content.published_posts(params.page()).await?))
}

/// Create a new post authored by the caller.
pub async fn create_post(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let author_id = claims.user_id()?;
    let post = content.create_post(Some(author_id), payload).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// Get a post with all of its comments.
pub async fn get_post(
    State(content): State<ContentService>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(content.post_detail(&slug).await?))
}

/// Partially update a post. Author or admin only.
pub async fn update_post(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let post = content.post_by_slug(&slug).await?;
    if !claims.can_modify(post.author_id) {
        return Err(AppError::Forbidden(
            "You can only edit your own posts.".to_string(),
        ));
    }

    let updated = content.update_post(&post, payload.into()).await?;
    Ok(Json(updated))
}

/// Delete a post and its comments. Author or admin only.
pub async fn delete_post(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = content.post_by_slug(&slug).await?;
    if !claims.can_modify(post.author_id) {
        return Err(AppError::Forbidden(
            "You can only delete your own posts.".to_string(),
        ));
    }

    content.delete_post(&post).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Comments created between two dates (inclusive) plus the blocked count.
/// Admin only.
pub async fn comments_range(
    State(content): State<ContentService>,
    Extension(claims): Extension<Claims>,
    Path((slug, date_from, date_to)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins can view comment statistics.".to_string(),
        ));
    }

    let from = parse_date(&date_from)?;
    let to = parse_date(&date_to)?;

    Ok(Json(content.comments_in_range(&slug, from, to).await?))
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("Invalid date format. Use YYYY-MM-DD.".to_string()))
}
