//! Database rows to wire shapes.

use chrono::{DateTime, NaiveDate, Utc};

use agora_db::models::{
    AdCategoryRow, AdEventRow, ArticleRow, CommentRow, FollowRow, LikeRow, NewsCategoryRow,
    NewsSourceRow, PostCategoryRow, PostImageRow, PostRow, ProfileRow, RatingRow,
    ReportCategoryRow, ReportRow, ShareRow, UserRef, ViewRow,
};
use agora_media::Storage;
use agora_types::api::UserSummary;
use agora_types::api::ads::{AdCategoryResponse, AdEventResponse};
use agora_types::api::news::{ArticleDetail, ArticleSummary, CategoryRef, NewsCategoryResponse, NewsSourceResponse};
use agora_types::api::posts::{
    CommentResponse, LikeResponse, PostCategoryResponse, PostImageResponse, PostSummary,
    ShareResponse, ViewResponse,
};
use agora_types::api::profiles::{FollowResponse, ProfileResponse, RatingResponse};
use agora_types::api::reports::{ReportCategoryResponse, ReportResponse};
use agora_types::time::{short_time_ago, time_ago};

/// Shown for posts without any uploaded image.
pub const DEFAULT_POST_IMAGE: &str = "defaults/default-post.jpg";

pub fn user_summary(user: &UserRef, storage: &Storage) -> UserSummary {
    UserSummary {
        acc_id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        display_name: user.display_name(),
        profile_picture: user.profile_picture.as_deref().map(|p| storage.url(p)),
        badge: user.badge.clone(),
        is_verified: user.is_verified,
    }
}

// -- Profiles --

/// Follow counts and the average rating travel with every profile.
pub struct ProfileExtras {
    pub followers_count: u64,
    pub following_count: u64,
    pub average_rating: f64,
    pub is_following: Option<bool>,
}

pub fn profile_response(profile: &ProfileRow, extras: ProfileExtras, storage: &Storage) -> ProfileResponse {
    let account = &profile.account;
    ProfileResponse {
        profile_id: profile.profile_id,
        acc_id: account.id,
        email: account.email.clone(),
        full_name: account.full_name.clone(),
        display_name: account.display_name(),
        is_verified: account.is_verified,
        company_name: account.company_name.clone(),
        profile_picture: account.profile_picture.as_deref().map(|p| storage.url(p)),
        background_picture: profile.background_picture.as_deref().map(|p| storage.url(p)),
        about_bio: profile.about_bio.clone(),
        location: profile.location.clone(),
        country: profile.country.clone(),
        city: profile.city.clone(),
        interest: profile.interest.clone(),
        language_preference: profile.language_preference.clone(),
        timezone: profile.timezone.clone(),
        is_omc: profile.is_omc,
        badge: account.badge.clone(),
        verification_documents: profile
            .verification_documents
            .iter()
            .map(|doc| storage.url(doc))
            .collect(),
        followers_count: extras.followers_count,
        following_count: extras.following_count,
        average_rating: round2(extras.average_rating),
        is_following: extras.is_following,
        created_at: profile.created_at,
        updated_at: profile.updated_at,
    }
}

pub fn follow_response(row: &FollowRow, storage: &Storage) -> FollowResponse {
    FollowResponse {
        follow_id: row.follow_id,
        follower: user_summary(&row.follower, storage),
        following: user_summary(&row.following, storage),
        created_at: row.created_at,
    }
}

pub fn rating_response(row: &RatingRow, storage: &Storage) -> RatingResponse {
    RatingResponse {
        rating_id: row.rating_id,
        rater: user_summary(&row.rater, storage),
        rated: user_summary(&row.rated, storage),
        rating_count: row.rating_count,
        review_content: row.review_content.clone(),
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

// -- Posts --

pub fn post_category(row: &PostCategoryRow) -> PostCategoryResponse {
    PostCategoryResponse {
        category_id: row.category_id,
        name: row.name.clone(),
        slug: row.slug.clone(),
        description: row.description.clone(),
        is_active: row.is_active,
    }
}

pub fn post_summary(row: &PostRow, storage: &Storage) -> PostSummary {
    PostSummary {
        post_id: row.post_id.clone(),
        title: row.title.clone(),
        category: row.category.as_ref().map(post_category),
        location: row.location.clone(),
        price: row.price.clone(),
        description: row.description.clone(),
        is_active: row.is_active,
        primary_image: storage.url(row.primary_image.as_deref().unwrap_or(DEFAULT_POST_IMAGE)),
        author: user_summary(&row.author, storage),
        likes_count: row.likes_count,
        comments_count: row.comments_count,
        views_count: row.views_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn post_image(row: &PostImageRow, storage: &Storage) -> PostImageResponse {
    PostImageResponse {
        id: row.id,
        image: storage.url(&row.image),
        is_primary: row.is_primary,
        order: row.order,
        uploaded_at: row.uploaded_at,
    }
}

pub fn like_response(row: &LikeRow, storage: &Storage) -> LikeResponse {
    LikeResponse {
        like_id: row.like_id.clone(),
        user: user_summary(&row.user, storage),
        created_at: row.created_at,
    }
}

pub fn view_response(row: &ViewRow, storage: &Storage) -> ViewResponse {
    ViewResponse {
        visit_id: row.visit_id.clone(),
        user: row.user.as_ref().map(|u| user_summary(u, storage)),
        ip_address: row.ip_address.clone(),
        viewed_at: row.viewed_at,
    }
}

pub fn share_response(row: &ShareRow, storage: &Storage) -> ShareResponse {
    ShareResponse {
        share_id: row.share_id.clone(),
        user: row.user.as_ref().map(|u| user_summary(u, storage)),
        share_method: row.method,
        ip_address: row.ip_address.clone(),
        shared_at: row.shared_at,
    }
}

pub fn comment_response(
    row: &CommentRow,
    replies: Vec<CommentResponse>,
    storage: &Storage,
    now: DateTime<Utc>,
) -> CommentResponse {
    CommentResponse {
        comment_id: row.comment_id.clone(),
        post_id: row.post_id.clone(),
        user: user_summary(&row.user, storage),
        parent: row.parent_id.clone(),
        content: row.content.clone(),
        is_active: row.is_active,
        likes_count: row.likes_count,
        is_liked: row.is_liked,
        replies,
        time_ago: time_ago(row.created_at, now),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Nests `replies` (oldest first) under their top-level comments.
pub fn comment_tree(
    top_level: &[CommentRow],
    replies: &[CommentRow],
    storage: &Storage,
    now: DateTime<Utc>,
) -> Vec<CommentResponse> {
    top_level
        .iter()
        .map(|comment| {
            let children = replies
                .iter()
                .filter(|reply| reply.parent_id.as_deref() == Some(comment.comment_id.as_str()))
                .map(|reply| comment_response(reply, Vec::new(), storage, now))
                .collect();
            comment_response(comment, children, storage, now)
        })
        .collect()
}

// -- Ads & events --

pub fn ad_category(row: &AdCategoryRow) -> AdCategoryResponse {
    AdCategoryResponse {
        category_id: row.category_id,
        name: row.name.clone(),
        slug: row.slug.clone(),
        description: row.description.clone(),
        is_active: row.is_active,
        order: row.order,
    }
}

pub fn ad_event(row: &AdEventRow, today: NaiveDate, storage: &Storage) -> AdEventResponse {
    AdEventResponse {
        ad_event_id: row.ad_event_id,
        title: row.title.clone(),
        kind: row.kind,
        category: ad_category(&row.category),
        description: row.description.clone(),
        link: row.link.clone(),
        banner_image: row.banner_image.as_deref().map(|b| storage.url(b)),
        location: row.location.clone(),
        start_date: row.start_date,
        end_date: row.end_date,
        status: row.status,
        is_featured: row.is_featured,
        is_active: row.is_active_on(today),
        is_upcoming: row.is_upcoming_on(today),
        is_expired: row.is_expired_on(today),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

// -- News --

pub fn news_category(row: &NewsCategoryRow) -> NewsCategoryResponse {
    NewsCategoryResponse {
        id: row.id,
        name: row.name.clone(),
        slug: row.slug.clone(),
        description: row.description.clone(),
        is_active: row.is_active,
        articles_count: row.articles_count,
    }
}

pub fn news_source(row: &NewsSourceRow, storage: &Storage) -> NewsSourceResponse {
    NewsSourceResponse {
        source_id: row.source_id,
        name: row.name.clone(),
        website: row.website.clone(),
        logo: row.logo.as_deref().map(|l| storage.url(l)),
        description: row.description.clone(),
        is_verified: row.is_verified,
    }
}

pub fn article_summary(row: &ArticleRow, now: DateTime<Utc>, storage: &Storage) -> ArticleSummary {
    ArticleSummary {
        article_id: row.article_id,
        title: row.title.clone(),
        slug: row.slug.clone(),
        summary: row.summary.clone(),
        featured_image: row.featured_image.as_deref().map(|f| storage.url(f)),
        category: row.category.as_ref().map(|c| CategoryRef {
            id: c.id,
            name: c.name.clone(),
            slug: c.slug.clone(),
        }),
        source: row.source.as_ref().map(|s| news_source(s, storage)),
        status: row.status,
        priority: row.priority,
        published_at: row.published_at,
        views_count: row.views_count,
        likes_count: row.likes_count,
        shares_count: row.shares_count,
        country: row.country.clone(),
        region: row.region.clone(),
        reading_time: row.reading_time(),
        is_breaking: row.priority == agora_types::models::ArticlePriority::Breaking,
        time_ago: short_time_ago(row.published_at, now),
    }
}

pub fn article_detail(row: &ArticleRow, now: DateTime<Utc>, storage: &Storage) -> ArticleDetail {
    ArticleDetail {
        article: article_summary(row, now, storage),
        content: row.content.clone(),
        featured_image_caption: row.featured_image_caption.clone(),
        video_url: row.video_url.clone(),
        meta_description: row.meta_description.clone(),
        meta_keywords: row.meta_keywords.clone(),
        original_url: row.original_url.clone(),
        external_id: row.external_id.clone(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

// -- Reports --

pub fn report_category(row: &ReportCategoryRow) -> ReportCategoryResponse {
    ReportCategoryResponse {
        report_category_id: row.report_category_id,
        name: row.name.clone(),
        display_name: row.display_name.clone(),
        description: row.description.clone(),
    }
}

pub fn report_response(row: &ReportRow, storage: &Storage) -> ReportResponse {
    ReportResponse {
        report_id: row.report_id.clone(),
        reporter: user_summary(&row.reporter, storage),
        category: report_category(&row.category),
        reason: row.reason.clone(),
        reported_item_type: row.item_type,
        reported_item_id: row.object_id.clone(),
        status: row.status,
        priority: row.priority,
        reviewed_by: row.reviewed_by.as_ref().map(|u| user_summary(u, storage)),
        reviewed_at: row.reviewed_at,
        action_taken: row.action_taken,
        admin_notes: row.admin_notes.clone(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
