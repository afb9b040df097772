use axum::{
    Extension, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use chrono::Utc;
use tracing::debug;

use agora_db::models::NewComment;
use agora_db::queries::short_id;
use agora_types::api::Claims;
use agora_types::api::posts::{CommentCreate, CommentUpdate, LikeToggle};

use crate::convert::{comment_response, comment_tree};
use crate::error::{ApiError, ApiResult};
use crate::extract::ValidJson;
use crate::middleware::{MaybeClaims, require_auth};
use crate::posts::active_post;
use crate::response::{created, created_or_ok, ok, ok_with};
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new().route("/posts/{post_id}/comments", get(list));

    let protected = Router::new()
        .route("/posts/{post_id}/comments/create", post(create))
        .route("/comments/{comment_id}/update", patch(update))
        .route("/comments/{comment_id}/delete", delete(remove))
        .route("/comments/{comment_id}/like", post(toggle_like))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

pub async fn list(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (top, replies) = state
        .blocking(move |db| {
            active_post(db, &post_id)?;
            Ok((db.top_level_comments(&post_id, viewer)?, db.comment_replies(&post_id, viewer)?))
        })
        .await?;
    Ok(ok(comment_tree(&top, &replies, &state.storage, Utc::now())))
}

pub async fn create(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<CommentCreate>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let comment = state
        .blocking(move |db| {
            active_post(db, &post_id)?;

            let parent_id = match body.parent.filter(|p| !p.trim().is_empty()) {
                Some(parent_id) => {
                    let parent = db
                        .comment_by_id(&parent_id, None)?
                        .filter(|c| c.is_active)
                        .ok_or_else(|| ApiError::Validation("Parent comment not found.".into()))?;
                    if parent.post_id != post_id {
                        return Err(ApiError::Validation(
                            "Parent comment must belong to the same post.".into(),
                        ));
                    }
                    if parent.parent_id.is_some() {
                        return Err(ApiError::Validation("Replies cannot be nested.".into()));
                    }
                    Some(parent_id)
                }
                None => None,
            };

            let comment_id = short_id();
            db.create_comment(&NewComment {
                comment_id: comment_id.clone(),
                post_id,
                user_id: me,
                parent_id,
                content: body.content.trim().to_string(),
            })?;
            db.comment_by_id(&comment_id, Some(me))?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("comment {} vanished after insert", comment_id)))
        })
        .await?;

    debug!("{} commented on {}", claims.email, comment.post_id);
    Ok(created(
        comment_response(&comment, Vec::new(), &state.storage, Utc::now()),
        "Comment created successfully.",
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ValidJson(body): ValidJson<CommentUpdate>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let comment = state
        .blocking(move |db| {
            let comment = db
                .comment_by_id(&comment_id, Some(me))?
                .filter(|c| c.is_active)
                .ok_or_else(|| ApiError::not_found("Comment not found."))?;
            if comment.user.id != me {
                return Err(ApiError::forbidden("You can only edit your own comments."));
            }
            db.update_comment(&comment_id, body.content.trim())?;
            db.comment_by_id(&comment_id, Some(me))?
                .ok_or_else(|| ApiError::not_found("Comment not found."))
        })
        .await?;
    Ok(ok_with(
        comment_response(&comment, Vec::new(), &state.storage, Utc::now()),
        "Comment updated successfully.",
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    state
        .blocking(move |db| {
            let comment = db
                .comment_by_id(&comment_id, None)?
                .filter(|c| c.is_active)
                .ok_or_else(|| ApiError::not_found("Comment not found."))?;
            // The post owner may moderate comments on their post.
            let post_owner = db.post_by_id(&comment.post_id)?.map(|p| p.author.id);
            if comment.user.id != me && post_owner != Some(me) {
                return Err(ApiError::forbidden("You can only delete your own comments."));
            }
            Ok(db.deactivate_comment(&comment_id)?)
        })
        .await?;
    Ok(ok_with(serde_json::Value::Null, "Comment deleted successfully."))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (is_liked, likes_count) = state
        .blocking(move |db| {
            db.comment_by_id(&comment_id, None)?
                .filter(|c| c.is_active)
                .ok_or_else(|| ApiError::not_found("Comment not found."))?;
            Ok(db.toggle_comment_like(&comment_id, me)?)
        })
        .await?;

    let message = if is_liked {
        "Comment liked successfully"
    } else {
        "Comment unliked successfully"
    };
    Ok(created_or_ok(is_liked, LikeToggle { is_liked, likes_count }, message))
}
