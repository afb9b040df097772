use axum::{
    Extension, Router,
    extract::{Multipart, Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use agora_db::Database;
use agora_db::models::{NewPost, PostChanges, PostQuery, PostRow};
use agora_db::queries::short_id;
use agora_types::api::posts::{
    LATEST_LISTING_SIZE, LikeToggle, MAX_POST_IMAGES, PostDetail, PostFields, PostFilter,
    PostStats, PostViews, PostWithImages, ViewRecorded,
};
use agora_types::api::{Claims, DEFAULT_PAGE_SIZE, Page, PageQuery};

use crate::convert::{
    comment_tree, like_response, post_category, post_image, post_summary, view_response,
};
use crate::error::{ApiError, ApiResult};
use crate::extract::ClientMeta;
use crate::middleware::{MaybeClaims, require_auth};
use crate::response::{created, created_or_ok, ok, ok_with};
use crate::state::AppState;
use crate::upload::{Form, UploadedFile};
use crate::{comments, shares};

const RECENT_VIEWS: u32 = 50;

/// `/api/v1.0`
pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/post-categories", get(categories))
        .route("/posts", get(list))
        .route("/posts/latest-listing", get(latest))
        .route("/posts/{post_id}", get(detail))
        .route("/posts/{post_id}/likes", get(likes))
        .route("/posts/{post_id}/view", post(record_view))
        .route("/posts/{post_id}/views", get(views))
        .route("/posts/{post_id}/stats", get(stats));

    let protected = Router::new()
        .route("/posts/my-posts", get(my_posts))
        .route("/posts/create", post(create))
        .route("/posts/{post_id}/update", patch(update).put(update))
        .route("/posts/{post_id}/delete", delete(remove))
        .route("/posts/{post_id}/upload-images", post(upload_images))
        .route("/posts/{post_id}/images/{image_id}/delete", delete(delete_image))
        .route("/posts/{post_id}/images/{image_id}/set-primary", patch(set_primary))
        .route("/posts/{post_id}/like", post(toggle_like))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .merge(comments::routes(state))
        .merge(shares::routes(state))
}

/// An active post, or 404.
pub fn active_post(db: &Database, post_id: &str) -> ApiResult<PostRow> {
    db.post_by_id(post_id)?
        .filter(|post| post.is_active)
        .ok_or_else(|| ApiError::not_found("Post not found."))
}

/// An active post owned by `user`; 403 for anyone else.
pub fn owned_post(db: &Database, post_id: &str, user: Uuid) -> ApiResult<PostRow> {
    let post = active_post(db, post_id)?;
    if post.author.id != user {
        return Err(ApiError::forbidden("You can only manage your own posts."));
    }
    Ok(post)
}

fn post_fields(form: &Form) -> ApiResult<PostFields> {
    let category = form
        .text("category")
        .map(|c| c.parse::<Uuid>())
        .transpose()
        .map_err(|_| ApiError::Validation("Category must be a valid id.".into()))?;
    let fields = PostFields {
        title: form.text("title"),
        category,
        location: form.text("location"),
        price: form.text("price"),
        description: form.text("description"),
    };
    fields.validate()?;
    Ok(fields)
}

fn post_images<'a>(form: &'a Form) -> ApiResult<Vec<&'a UploadedFile>> {
    let images: Vec<_> = form
        .files
        .iter()
        .filter(|f| f.field == "images" || f.field == "image")
        .collect();
    if images.len() > MAX_POST_IMAGES {
        return Err(ApiError::Validation(format!(
            "You can upload at most {} images at a time.",
            MAX_POST_IMAGES
        )));
    }
    for image in &images {
        image.require_image()?;
    }
    Ok(images)
}

async fn store_images(state: &AppState, images: &[&UploadedFile]) -> ApiResult<Vec<String>> {
    let mut names = Vec::with_capacity(images.len());
    for image in images {
        names.push(state.storage.save("post_images", &image.file_name, &image.bytes).await?);
    }
    Ok(names)
}

async fn discard_files(state: &AppState, names: &[String]) {
    for name in names {
        if let Err(e) = state.storage.delete(name).await {
            warn!("Failed to delete post image {}: {}", name, e);
        }
    }
}

// -- Listing --

pub async fn categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = state.blocking(|db| Ok(db.post_categories()?)).await?;
    Ok(ok(rows.iter().map(post_category).collect::<Vec<_>>()))
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let query = PostQuery {
        category_slug: filter.category.filter(|c| !c.trim().is_empty()),
        location: filter.location.filter(|l| !l.trim().is_empty()),
        search: filter.search.filter(|s| !s.trim().is_empty()),
        author: None,
    };
    let (rows, total) = state.blocking(move |db| Ok(db.list_posts(&query, limit, offset)?)).await?;
    let results = rows.iter().map(|r| post_summary(r, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

pub async fn latest(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let (rows, _) = state
        .blocking(|db| Ok(db.list_posts(&PostQuery::default(), LATEST_LISTING_SIZE, 0)?))
        .await?;
    Ok(ok(rows.iter().map(|r| post_summary(r, &state.storage)).collect::<Vec<_>>()))
}

pub async fn my_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let (limit, offset) = page.window(DEFAULT_PAGE_SIZE);
    let query = PostQuery {
        author: Some(claims.sub),
        ..PostQuery::default()
    };
    let (rows, total) = state.blocking(move |db| Ok(db.list_posts(&query, limit, offset)?)).await?;
    let results = rows.iter().map(|r| post_summary(r, &state.storage)).collect();
    Ok(ok(Page::new(results, total, page.page(), limit)))
}

// -- Create / update / delete --

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart).await?;
    let fields = post_fields(&form)?;
    let title = fields
        .title
        .clone()
        .ok_or_else(|| ApiError::Validation("Title is required.".into()))?;
    let images = post_images(&form)?;
    let stored = store_images(&state, &images).await?;

    let me = claims.sub;
    let post_id = short_id();
    let id = post_id.clone();
    let names = stored.clone();
    let result = state
        .blocking(move |db| {
            if let Some(category) = fields.category {
                if !db.post_category_exists(category)? {
                    return Err(ApiError::Validation("Category does not exist.".into()));
                }
            }
            // Location defaults to the author's profile location.
            let location = match fields.location {
                Some(location) => Some(location),
                None => db.profile_by_account(me)?.and_then(|p| p.location),
            };
            db.create_post(
                &NewPost {
                    post_id: id.clone(),
                    user_id: me,
                    title,
                    category_id: fields.category,
                    location,
                    price: fields.price,
                    description: fields.description,
                },
                &names,
            )?;
            db.post_by_id(&id)?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("post {} vanished after insert", id)))
        })
        .await;

    let post = match result {
        Ok(post) => post,
        Err(e) => {
            discard_files(&state, &stored).await;
            return Err(e);
        }
    };
    info!("{} created post {}", claims.email, post_id);
    Ok(created(post_summary(&post, &state.storage), "Post created successfully."))
}

pub async fn update(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart).await?;
    let fields = post_fields(&form)?;
    let remove: Vec<i64> = match form.text("remove_images") {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| id.parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ApiError::Validation("remove_images must be a comma separated list of ids.".into()))?,
        None => Vec::new(),
    };
    let images = post_images(&form)?;

    let me = claims.sub;
    let id = post_id.clone();
    state.blocking(move |db| owned_post(db, &id, me).map(|_| ())).await?;

    let stored = store_images(&state, &images).await?;
    let id = post_id.clone();
    let names = stored.clone();
    let result = state
        .blocking(move |db| {
            if let Some(category) = fields.category {
                if !db.post_category_exists(category)? {
                    return Err(ApiError::Validation("Category does not exist.".into()));
                }
            }
            db.update_post(
                &id,
                &PostChanges {
                    title: fields.title,
                    category_id: fields.category,
                    location: fields.location,
                    price: fields.price,
                    description: fields.description,
                },
            )?;
            let removed = db.remove_post_images(&id, &remove)?;
            db.add_post_images(&id, &names)?;
            let post = active_post(db, &id)?;
            let images = db.post_images(&id)?;
            Ok((post, images, removed))
        })
        .await;

    let (post, images, removed) = match result {
        Ok(updated) => updated,
        Err(e) => {
            discard_files(&state, &stored).await;
            return Err(e);
        }
    };
    discard_files(&state, &removed).await;

    Ok(ok_with(
        PostWithImages {
            post: post_summary(&post, &state.storage),
            images: images.iter().map(|i| post_image(i, &state.storage)).collect(),
        },
        "Post updated successfully.",
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    state
        .blocking(move |db| {
            owned_post(db, &post_id, me)?;
            Ok(db.deactivate_post(&post_id)?)
        })
        .await?;
    Ok(ok_with(serde_json::Value::Null, "Post deleted successfully."))
}

// -- Images --

pub async fn upload_images(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart).await?;
    let images = post_images(&form)?;
    if images.is_empty() {
        return Err(ApiError::Validation("No image provided.".into()));
    }

    let me = claims.sub;
    let id = post_id.clone();
    state.blocking(move |db| owned_post(db, &id, me).map(|_| ())).await?;

    let stored = store_images(&state, &images).await?;
    let names = stored.clone();
    let result = state.blocking(move |db| Ok(db.add_post_images(&post_id, &names)?)).await;
    let rows = match result {
        Ok(rows) => rows,
        Err(e) => {
            discard_files(&state, &stored).await;
            return Err(e);
        }
    };
    Ok(created(
        rows.iter().map(|i| post_image(i, &state.storage)).collect::<Vec<_>>(),
        "Images uploaded successfully.",
    ))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Path((post_id, image_id)): Path<(String, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let removed = state
        .blocking(move |db| {
            owned_post(db, &post_id, me)?;
            let removed = db.remove_post_images(&post_id, &[image_id])?;
            if removed.is_empty() {
                return Err(ApiError::not_found("Image not found."));
            }
            Ok(removed)
        })
        .await?;
    discard_files(&state, &removed).await;
    Ok(ok_with(serde_json::Value::Null, "Image deleted successfully."))
}

pub async fn set_primary(
    State(state): State<AppState>,
    Path((post_id, image_id)): Path<(String, i64)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let images = state
        .blocking(move |db| {
            owned_post(db, &post_id, me)?;
            if !db.set_primary_image(&post_id, image_id)? {
                return Err(ApiError::not_found("Image not found."));
            }
            Ok(db.post_images(&post_id)?)
        })
        .await?;
    Ok(ok_with(
        images.iter().map(|i| post_image(i, &state.storage)).collect::<Vec<_>>(),
        "Primary image updated successfully.",
    ))
}

// -- Detail --

pub async fn detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (post, images, shares_count, is_liked, top, replies) = state
        .blocking(move |db| {
            let post = active_post(db, &post_id)?;
            let images = db.post_images(&post_id)?;
            let shares_count = db.shares_count(&post_id)?;
            let is_liked = match viewer {
                Some(viewer) => db.has_liked_post(&post_id, viewer)?,
                None => false,
            };
            let top = db.top_level_comments(&post_id, viewer)?;
            let replies = db.comment_replies(&post_id, viewer)?;
            Ok((post, images, shares_count, is_liked, top, replies))
        })
        .await?;

    let now = Utc::now();
    Ok(ok(PostDetail {
        post: post_summary(&post, &state.storage),
        images: images.iter().map(|i| post_image(i, &state.storage)).collect(),
        shares_count,
        is_liked,
        comments: comment_tree(&top, &replies, &state.storage, now),
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let stats = state
        .blocking(move |db| {
            let post = active_post(db, &post_id)?;
            let (top_level, all) = db.comment_counts(&post_id)?;
            let is_liked = match viewer {
                Some(viewer) => db.has_liked_post(&post_id, viewer)?,
                None => false,
            };
            Ok(PostStats {
                likes_count: post.likes_count,
                views_count: post.views_count,
                comments_count: top_level,
                total_comments_count: all,
                shares_count: db.shares_count(&post_id)?,
                is_liked,
                post_id,
            })
        })
        .await?;
    Ok(ok(stats))
}

// -- Likes --

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let me = claims.sub;
    let (is_liked, likes_count) = state
        .blocking(move |db| {
            active_post(db, &post_id)?;
            Ok(db.toggle_post_like(&post_id, me)?)
        })
        .await?;

    let message = if is_liked {
        "Post liked successfully"
    } else {
        "Post unliked successfully"
    };
    Ok(created_or_ok(is_liked, LikeToggle { is_liked, likes_count }, message))
}

pub async fn likes(State(state): State<AppState>, Path(post_id): Path<String>) -> ApiResult<impl IntoResponse> {
    let rows = state
        .blocking(move |db| {
            active_post(db, &post_id)?;
            Ok(db.post_likes(&post_id)?)
        })
        .await?;
    Ok(ok(rows.iter().map(|r| like_response(r, &state.storage)).collect::<Vec<_>>()))
}

// -- Views --

pub async fn record_view(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
    meta: ClientMeta,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (recorded, views_count) = state
        .blocking(move |db| {
            active_post(db, &post_id)?;
            let recorded = db.record_post_view(
                &post_id,
                viewer,
                meta.ip.as_deref(),
                meta.user_agent.as_deref(),
                Utc::now(),
            )?;
            let views_count = active_post(db, &post_id)?.views_count;
            Ok((recorded, views_count))
        })
        .await?;

    let message = if recorded {
        "View recorded successfully"
    } else {
        "View already recorded recently"
    };
    Ok(created_or_ok(recorded, ViewRecorded { recorded, views_count }, message))
}

pub async fn views(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    viewer: MaybeClaims,
) -> ApiResult<impl IntoResponse> {
    let viewer = viewer.user_id();
    let (views_count, recent) = state
        .blocking(move |db| {
            let post = active_post(db, &post_id)?;
            let recent = if viewer == Some(post.author.id) {
                Some(db.recent_post_views(&post_id, RECENT_VIEWS)?)
            } else {
                None
            };
            Ok((post.views_count, recent))
        })
        .await?;
    Ok(ok(PostViews {
        views_count,
        recent_views: recent.map(|rows| rows.iter().map(|r| view_response(r, &state.storage)).collect()),
    }))
}
