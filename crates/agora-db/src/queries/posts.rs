use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use uuid::Uuid;

use agora_types::models::ShareMethod;

use crate::columns::{self, USER_COLUMN_COUNT, user_columns};
use crate::models::{
    CommentRow, DailyActivity, LikeRow, NewComment, NewPost, NewShare, PostCategoryRow, PostChanges,
    PostImageRow, PostQuery, PostRow, ShareRow, UserRef, ViewRow,
};
use crate::queries::{Filters, contains_pattern, short_id, text};
use crate::{Database, Result, format_timestamp};

/// A second view by the same viewer inside this window is not counted.
pub const VIEW_DEDUP_MINUTES: i64 = 60;

const POST_SELECT: &str = "
    SELECT p.post_id, p.title, p.location, p.price, p.description, p.is_active,
           p.created_at, p.updated_at,
           (SELECT image FROM post_images i WHERE i.post_id = p.post_id AND i.is_primary = 1
              ORDER BY i.sort_order LIMIT 1),
           (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.post_id),
           (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.post_id AND c.is_active = 1),
           (SELECT COUNT(*) FROM post_views v WHERE v.post_id = p.post_id),
           c.category_id, c.name, c.slug, c.description, c.is_active,
           ua.id, ua.email, ua.full_name, ua.is_verified, up.company_name, up.profile_picture, up.badge
    FROM posts p
    JOIN accounts ua ON ua.id = p.user_id
    LEFT JOIN profiles up ON up.account_id = ua.id
    LEFT JOIN post_categories c ON c.category_id = p.category_id";

impl Database {
    // -- Categories --

    pub fn create_post_category(&self, name: &str, slug: &str, description: Option<&str>) -> Result<PostCategoryRow> {
        self.with_conn(|conn| {
            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO post_categories (category_id, name, slug, description, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                (id.to_string(), name, slug, description, format_timestamp(Utc::now())),
            )?;
            Ok(PostCategoryRow {
                category_id: id,
                name: name.to_string(),
                slug: slug.to_string(),
                description: description.map(str::to_string),
                is_active: true,
            })
        })
    }

    pub fn post_categories(&self) -> Result<Vec<PostCategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category_id, name, slug, description, is_active
                 FROM post_categories WHERE is_active = 1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| read_category(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn post_category_exists(&self, category_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM post_categories WHERE category_id = ?1)",
                [category_id.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    // -- Posts --

    /// Creates a post with its images; the first image becomes primary.
    pub fn create_post(&self, post: &NewPost, images: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO posts (post_id, user_id, title, category_id, location, price, description, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                (
                    &post.post_id,
                    post.user_id.to_string(),
                    &post.title,
                    post.category_id.map(|c| c.to_string()),
                    &post.location,
                    &post.price,
                    &post.description,
                    &now,
                ),
            )?;
            for (order, image) in images.iter().enumerate() {
                tx.execute(
                    "INSERT INTO post_images (post_id, image, is_primary, sort_order, uploaded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (&post.post_id, image, order == 0, order as i64, &now),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Any post, active or not.
    pub fn post_by_id(&self, post_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE p.post_id = ?1", POST_SELECT);
            Ok(conn.query_row(&sql, [post_id], read_post).optional()?)
        })
    }

    /// Active posts matching `query`, newest first.
    pub fn list_posts(&self, query: &PostQuery, limit: u32, offset: u32) -> Result<(Vec<PostRow>, u64)> {
        let mut filters = Filters::default();
        filters.push("p.is_active = 1", []);
        if let Some(slug) = &query.category_slug {
            filters.push("c.slug = ?", [text(slug.as_str())]);
        }
        if let Some(location) = &query.location {
            filters.push("p.location LIKE ? ESCAPE '\\'", [text(contains_pattern(location))]);
        }
        if let Some(search) = &query.search {
            filters.push("p.title LIKE ? ESCAPE '\\'", [text(contains_pattern(search))]);
        }
        if let Some(author) = query.author {
            filters.push("p.user_id = ?", [text(author.to_string())]);
        }

        self.with_conn(|conn| {
            let idx = filters.next_index();
            let sql = format!(
                "{} {} ORDER BY p.created_at DESC LIMIT ?{} OFFSET ?{}",
                POST_SELECT,
                filters.sql(),
                idx,
                idx + 1
            );
            let mut params = filters.params().to_vec();
            params.push(i64::from(limit).into());
            params.push(i64::from(offset).into());

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), read_post)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let count_sql = format!(
                "SELECT COUNT(*) FROM posts p LEFT JOIN post_categories c ON c.category_id = p.category_id {}",
                filters.sql()
            );
            let total = conn.query_row(&count_sql, params_from_iter(filters.params().iter()), |row| {
                columns::count(row, 0)
            })?;
            Ok((rows, total))
        })
    }

    pub fn update_post(&self, post_id: &str, changes: &PostChanges) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE posts SET
                    title = COALESCE(?2, title),
                    category_id = COALESCE(?3, category_id),
                    location = COALESCE(?4, location),
                    price = COALESCE(?5, price),
                    description = COALESCE(?6, description),
                    updated_at = ?7
                 WHERE post_id = ?1",
                (
                    post_id,
                    &changes.title,
                    changes.category_id.map(|c| c.to_string()),
                    &changes.location,
                    &changes.price,
                    &changes.description,
                    format_timestamp(Utc::now()),
                ),
            )?;
            Ok(updated > 0)
        })
    }

    /// Soft delete.
    pub fn deactivate_post(&self, post_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE posts SET is_active = 0, updated_at = ?2 WHERE post_id = ?1",
                (post_id, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    // -- Images --

    pub fn post_images(&self, post_id: &str) -> Result<Vec<PostImageRow>> {
        self.with_conn(|conn| query_images(conn, post_id))
    }

    /// Appends images after the existing ones. The first becomes primary when
    /// the post has none.
    pub fn add_post_images(&self, post_id: &str, images: &[String]) -> Result<Vec<PostImageRow>> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            let (next_order, has_primary): (i64, bool) = tx.query_row(
                "SELECT COALESCE(MAX(sort_order) + 1, 0), COALESCE(MAX(is_primary), 0)
                 FROM post_images WHERE post_id = ?1",
                [post_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            for (i, image) in images.iter().enumerate() {
                tx.execute(
                    "INSERT INTO post_images (post_id, image, is_primary, sort_order, uploaded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (post_id, image, !has_primary && i == 0, next_order + i as i64, &now),
                )?;
            }
            let rows = query_images(&tx, post_id)?;
            tx.commit()?;
            Ok(rows)
        })
    }

    /// Deletes the given images of a post and returns the stored paths removed.
    /// A new primary is chosen when the primary image goes.
    pub fn remove_post_images(&self, post_id: &str, image_ids: &[i64]) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = Vec::new();
            for id in image_ids {
                let path: Option<String> = tx
                    .query_row(
                        "DELETE FROM post_images WHERE id = ?1 AND post_id = ?2 RETURNING image",
                        (id, post_id),
                        |row| row.get(0),
                    )
                    .optional()?;
                removed.extend(path);
            }
            ensure_primary(&tx, post_id)?;
            tx.commit()?;
            Ok(removed)
        })
    }

    pub fn set_primary_image(&self, post_id: &str, image_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM post_images WHERE id = ?1 AND post_id = ?2)",
                (image_id, post_id),
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(false);
            }
            tx.execute(
                "UPDATE post_images SET is_primary = (id = ?1) WHERE post_id = ?2",
                (image_id, post_id),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Likes --

    /// Likes the post, or removes the like if present. Returns (liked, likes_count).
    pub fn toggle_post_like(&self, post_id: &str, user_id: Uuid) -> Result<(bool, u64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                (post_id, user_id.to_string()),
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO post_likes (like_id, post_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    (short_id(), post_id, user_id.to_string(), format_timestamp(Utc::now())),
                )?;
            }
            let count = tx.query_row(
                "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
                [post_id],
                |row| columns::count(row, 0),
            )?;
            tx.commit()?;
            Ok((removed == 0, count))
        })
    }

    pub fn has_liked_post(&self, post_id: &str, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM post_likes WHERE post_id = ?1 AND user_id = ?2)",
                (post_id, user_id.to_string()),
                |row| row.get(0),
            )?)
        })
    }

    pub fn post_likes(&self, post_id: &str) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT l.like_id, l.created_at, {}
                 FROM post_likes l JOIN accounts a ON a.id = l.user_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE l.post_id = ?1 ORDER BY l.created_at DESC",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(LikeRow {
                        like_id: row.get(0)?,
                        created_at: columns::ts(row, 1)?,
                        user: columns::user_ref(row, 2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // -- Views --

    /// Records a view unless the same account, or for anonymous viewers the
    /// same IP, viewed the post within the last hour.
    pub fn record_post_view(
        &self,
        post_id: &str,
        user_id: Option<Uuid>,
        ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let since = format_timestamp(now - Duration::minutes(VIEW_DEDUP_MINUTES));
            let tx = conn.transaction()?;
            let seen: bool = match user_id {
                Some(user) => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM post_views WHERE post_id = ?1 AND user_id = ?2 AND viewed_at >= ?3)",
                    (post_id, user.to_string(), &since),
                    |row| row.get(0),
                )?,
                None => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM post_views
                     WHERE post_id = ?1 AND user_id IS NULL AND ip_address IS ?2 AND viewed_at >= ?3)",
                    (post_id, ip, &since),
                    |row| row.get(0),
                )?,
            };
            if seen {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO post_views (visit_id, post_id, user_id, ip_address, user_agent, viewed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    short_id(),
                    post_id,
                    user_id.map(|u| u.to_string()),
                    ip,
                    user_agent,
                    format_timestamp(now),
                ),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn recent_post_views(&self, post_id: &str, limit: u32) -> Result<Vec<ViewRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT v.visit_id, v.ip_address, v.viewed_at, {}
                 FROM post_views v LEFT JOIN accounts a ON a.id = v.user_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE v.post_id = ?1 ORDER BY v.viewed_at DESC LIMIT ?2",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((post_id, limit), |row| {
                    Ok(ViewRow {
                        visit_id: row.get(0)?,
                        ip_address: row.get(1)?,
                        viewed_at: columns::ts(row, 2)?,
                        user: columns::opt_user_ref(row, 3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn create_comment(&self, comment: &NewComment) -> Result<()> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            conn.execute(
                "INSERT INTO post_comments (comment_id, post_id, user_id, parent_id, content, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                (
                    &comment.comment_id,
                    &comment.post_id,
                    comment.user_id.to_string(),
                    &comment.parent_id,
                    &comment.content,
                    &now,
                ),
            )?;
            Ok(())
        })
    }

    pub fn comment_by_id(&self, comment_id: &str, viewer: Option<Uuid>) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            Ok(query_comments(conn, "c.comment_id = ?2", &[comment_id.to_string()], viewer, "")?.pop())
        })
    }

    /// Active top-level comments of a post, newest first.
    pub fn top_level_comments(&self, post_id: &str, viewer: Option<Uuid>) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            query_comments(
                conn,
                "c.post_id = ?2 AND c.parent_id IS NULL AND c.is_active = 1",
                &[post_id.to_string()],
                viewer,
                "ORDER BY c.created_at DESC",
            )
        })
    }

    /// Active replies of a post, oldest first.
    pub fn comment_replies(&self, post_id: &str, viewer: Option<Uuid>) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            query_comments(
                conn,
                "c.post_id = ?2 AND c.parent_id IS NOT NULL AND c.is_active = 1",
                &[post_id.to_string()],
                viewer,
                "ORDER BY c.created_at ASC",
            )
        })
    }

    pub fn update_comment(&self, comment_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE post_comments SET content = ?2, updated_at = ?3 WHERE comment_id = ?1",
                (comment_id, content, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    /// Soft delete.
    pub fn deactivate_comment(&self, comment_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE post_comments SET is_active = 0, updated_at = ?2 WHERE comment_id = ?1",
                (comment_id, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    /// Returns (liked, likes_count) after the toggle.
    pub fn toggle_comment_like(&self, comment_id: &str, user_id: Uuid) -> Result<(bool, u64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                (comment_id, user_id.to_string()),
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO comment_likes (comment_like_id, comment_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    (short_id(), comment_id, user_id.to_string(), format_timestamp(Utc::now())),
                )?;
            }
            let count = tx.query_row(
                "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
                [comment_id],
                |row| columns::count(row, 0),
            )?;
            tx.commit()?;
            Ok((removed == 0, count))
        })
    }

    /// (top-level active comments, all active comments)
    pub fn comment_counts(&self, post_id: &str) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(CASE WHEN parent_id IS NULL THEN 1 END), COUNT(*)
                 FROM post_comments WHERE post_id = ?1 AND is_active = 1",
                [post_id],
                |row| Ok((columns::count(row, 0)?, columns::count(row, 1)?)),
            )?)
        })
    }

    // -- Analytics --

    /// (likes, views, comments) recorded in `[from, to)`.
    pub fn post_activity_between(
        &self,
        post_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(u64, u64, u64)> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM post_likes WHERE post_id = ?1 AND created_at >= ?2 AND created_at < ?3),
                    (SELECT COUNT(*) FROM post_views WHERE post_id = ?1 AND viewed_at >= ?2 AND viewed_at < ?3),
                    (SELECT COUNT(*) FROM post_comments WHERE post_id = ?1 AND is_active = 1
                        AND created_at >= ?2 AND created_at < ?3)",
                (post_id, format_timestamp(from), format_timestamp(to)),
                |row| Ok((columns::count(row, 0)?, columns::count(row, 1)?, columns::count(row, 2)?)),
            )?)
        })
    }

    pub fn top_commenters(
        &self,
        post_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<(UserRef, u64)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, COUNT(*) AS n
                 FROM post_comments c JOIN accounts a ON a.id = c.user_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE c.post_id = ?1 AND c.is_active = 1 AND c.created_at >= ?2 AND c.created_at < ?3
                 GROUP BY a.id
                 ORDER BY n DESC, a.full_name
                 LIMIT ?4",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    (post_id, format_timestamp(from), format_timestamp(to), limit),
                    |row| Ok((columns::user_ref(row, 0)?, columns::count(row, USER_COLUMN_COUNT)?)),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn daily_post_activity(
        &self,
        post_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DailyActivity> {
        self.with_conn(|conn| {
            let (from, to) = (format_timestamp(from), format_timestamp(to));
            Ok(DailyActivity {
                views: daily(conn, "post_views", "viewed_at", "", post_id, &from, &to)?,
                likes: daily(conn, "post_likes", "created_at", "", post_id, &from, &to)?,
                comments: daily(conn, "post_comments", "created_at", "AND is_active = 1", post_id, &from, &to)?,
            })
        })
    }

    // -- Shares --

    pub fn record_share(&self, share: &NewShare) -> Result<u64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO post_shares (share_id, post_id, user_id, share_method, ip_address, user_agent, shared_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &share.share_id,
                    &share.post_id,
                    share.user_id.map(|u| u.to_string()),
                    share.method.as_str(),
                    &share.ip_address,
                    &share.user_agent,
                    format_timestamp(Utc::now()),
                ),
            )?;
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM post_shares WHERE post_id = ?1",
                [&share.post_id],
                |row| columns::count(row, 0),
            )?)
        })
    }

    /// Shares made across all posts since `since`, by an account or, when
    /// `user_id` is None, anonymously from `ip`.
    pub fn shares_since(&self, user_id: Option<Uuid>, ip: Option<&str>, since: DateTime<Utc>) -> Result<u64> {
        self.with_conn(|conn| {
            let since = format_timestamp(since);
            Ok(match user_id {
                Some(user) => conn.query_row(
                    "SELECT COUNT(*) FROM post_shares WHERE user_id = ?1 AND shared_at >= ?2",
                    (user.to_string(), &since),
                    |row| columns::count(row, 0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM post_shares WHERE user_id IS NULL AND ip_address IS ?1 AND shared_at >= ?2",
                    (ip, &since),
                    |row| columns::count(row, 0),
                )?,
            })
        })
    }

    pub fn shares_count(&self, post_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM post_shares WHERE post_id = ?1",
                [post_id],
                |row| columns::count(row, 0),
            )?)
        })
    }

    /// Share counts per method, optionally restricted to `[from, to)`.
    pub fn shares_by_method(
        &self,
        post_id: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<(ShareMethod, u64)>> {
        self.with_conn(|conn| {
            let (from, to) = match range {
                Some((from, to)) => (format_timestamp(from), format_timestamp(to)),
                None => (String::new(), "~".to_string()),
            };
            let mut stmt = conn.prepare(
                "SELECT share_method, COUNT(*) AS n FROM post_shares
                 WHERE post_id = ?1 AND shared_at >= ?2 AND shared_at < ?3
                 GROUP BY share_method ORDER BY n DESC, share_method",
            )?;
            let rows = stmt
                .query_map((post_id, &from, &to), |row| {
                    Ok((columns::choice::<ShareMethod>(row, 0)?, columns::count(row, 1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn recent_shares(&self, post_id: &str, limit: u32) -> Result<Vec<ShareRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT s.share_id, s.share_method, s.ip_address, s.shared_at, {}
                 FROM post_shares s LEFT JOIN accounts a ON a.id = s.user_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE s.post_id = ?1 ORDER BY s.shared_at DESC LIMIT ?2",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((post_id, limit), |row| {
                    Ok(ShareRow {
                        share_id: row.get(0)?,
                        method: columns::choice(row, 1)?,
                        ip_address: row.get(2)?,
                        shared_at: columns::ts(row, 3)?,
                        user: columns::opt_user_ref(row, 4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn daily_shares(
        &self,
        post_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<NaiveDate, u64>> {
        self.with_conn(|conn| {
            daily(
                conn,
                "post_shares",
                "shared_at",
                "",
                post_id,
                &format_timestamp(from),
                &format_timestamp(to),
            )
        })
    }
}

fn read_category(row: &Row<'_>, start: usize) -> rusqlite::Result<PostCategoryRow> {
    Ok(PostCategoryRow {
        category_id: columns::uuid(row, start)?,
        name: row.get(start + 1)?,
        slug: row.get(start + 2)?,
        description: row.get(start + 3)?,
        is_active: row.get(start + 4)?,
    })
}

fn read_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    let category = match row.get::<_, Option<String>>(12)? {
        Some(_) => Some(read_category(row, 12)?),
        None => None,
    };
    Ok(PostRow {
        post_id: row.get(0)?,
        title: row.get(1)?,
        location: row.get(2)?,
        price: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
        created_at: columns::ts(row, 6)?,
        updated_at: columns::ts(row, 7)?,
        primary_image: row.get(8)?,
        likes_count: columns::count(row, 9)?,
        comments_count: columns::count(row, 10)?,
        views_count: columns::count(row, 11)?,
        category,
        author: columns::user_ref(row, 17)?,
    })
}

fn query_images(conn: &Connection, post_id: &str) -> Result<Vec<PostImageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, post_id, image, is_primary, sort_order, uploaded_at
         FROM post_images WHERE post_id = ?1 ORDER BY sort_order, id",
    )?;
    let rows = stmt
        .query_map([post_id], |row| {
            Ok(PostImageRow {
                id: row.get(0)?,
                post_id: row.get(1)?,
                image: row.get(2)?,
                is_primary: row.get(3)?,
                order: row.get(4)?,
                uploaded_at: columns::ts(row, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Promotes the first remaining image when a post has images but no primary.
fn ensure_primary(conn: &Connection, post_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE post_images SET is_primary = 1
         WHERE id = (SELECT id FROM post_images WHERE post_id = ?1 ORDER BY sort_order, id LIMIT 1)
           AND NOT EXISTS (SELECT 1 FROM post_images WHERE post_id = ?1 AND is_primary = 1)",
        [post_id],
    )?;
    Ok(())
}

fn query_comments(
    conn: &Connection,
    predicate: &str,
    params: &[String],
    viewer: Option<Uuid>,
    order: &str,
) -> Result<Vec<CommentRow>> {
    let sql = format!(
        "SELECT c.comment_id, c.post_id, c.parent_id, c.content, c.is_active, c.created_at, c.updated_at,
                (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.comment_id),
                EXISTS(SELECT 1 FROM comment_likes l WHERE l.comment_id = c.comment_id AND l.user_id = ?1),
                {}
         FROM post_comments c JOIN accounts a ON a.id = c.user_id
         LEFT JOIN profiles p ON p.account_id = a.id
         WHERE {} {}",
        user_columns("a", "p"),
        predicate,
        order
    );
    let mut values = vec![viewer.map(|v| v.to_string())];
    values.extend(params.iter().cloned().map(Some));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(CommentRow {
                comment_id: row.get(0)?,
                post_id: row.get(1)?,
                parent_id: row.get(2)?,
                content: row.get(3)?,
                is_active: row.get(4)?,
                created_at: columns::ts(row, 5)?,
                updated_at: columns::ts(row, 6)?,
                likes_count: columns::count(row, 7)?,
                is_liked: row.get(8)?,
                user: columns::user_ref(row, 9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Rows per UTC day in `[from, to)` for one post.
fn daily(
    conn: &Connection,
    table: &str,
    column: &str,
    extra: &str,
    post_id: &str,
    from: &str,
    to: &str,
) -> Result<BTreeMap<NaiveDate, u64>> {
    let sql = format!(
        "SELECT substr({col}, 1, 10), COUNT(*) FROM {table}
         WHERE post_id = ?1 AND {col} >= ?2 AND {col} < ?3 {extra}
         GROUP BY 1",
        col = column,
        table = table,
        extra = extra
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((post_id, from, to), |row| {
            Ok((row.get::<_, String>(0)?, columns::count(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(day, n)| columns::day(&day).map(|d| (d, n)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;
    use crate::queries::testing::account;

    fn post(db: &Database, author: Uuid, images: &[&str]) -> String {
        let post_id = short_id();
        let images: Vec<String> = images.iter().map(|s| s.to_string()).collect();
        db.create_post(
            &NewPost {
                post_id: post_id.clone(),
                user_id: author,
                title: "Used drill pipe".into(),
                category_id: None,
                location: Some("Lagos".into()),
                price: Some("$1,200".into()),
                description: None,
            },
            &images,
        )
        .unwrap();
        post_id
    }

    fn comment(db: &Database, post_id: &str, user: Uuid, parent: Option<&str>) -> Result<String> {
        let id = short_id();
        db.create_comment(&NewComment {
            comment_id: id.clone(),
            post_id: post_id.to_string(),
            user_id: user,
            parent_id: parent.map(str::to_string),
            content: "Is this still available?".into(),
        })?;
        Ok(id)
    }

    #[test]
    fn like_toggle_is_idempotent_over_two_calls() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let fan = account(&db, "f@example.com");
        let post_id = post(&db, author, &[]);

        assert_eq!(db.toggle_post_like(&post_id, fan).unwrap(), (true, 1));
        assert!(db.has_liked_post(&post_id, fan).unwrap());
        assert_eq!(db.toggle_post_like(&post_id, fan).unwrap(), (false, 0));
        assert!(!db.has_liked_post(&post_id, fan).unwrap());
    }

    #[test]
    fn first_image_is_primary_and_primary_survives_removal() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let post_id = post(&db, author, &["p/1.jpg", "p/2.jpg"]);

        let images = db.post_images(&post_id).unwrap();
        assert!(images[0].is_primary && !images[1].is_primary);

        let removed = db.remove_post_images(&post_id, &[images[0].id]).unwrap();
        assert_eq!(removed, vec!["p/1.jpg".to_string()]);
        let images = db.post_images(&post_id).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].is_primary);

        let added = db.add_post_images(&post_id, &["p/3.jpg".into()]).unwrap();
        assert_eq!(added.iter().filter(|i| i.is_primary).count(), 1);
        let newest = added.last().unwrap().id;
        assert!(db.set_primary_image(&post_id, newest).unwrap());
        let primary: Vec<_> = db.post_images(&post_id).unwrap().into_iter().filter(|i| i.is_primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].id, newest);

        let row = db.post_by_id(&post_id).unwrap().unwrap();
        assert_eq!(row.primary_image.as_deref(), Some("p/3.jpg"));
    }

    #[test]
    fn views_deduplicate_per_hour() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let viewer = account(&db, "v@example.com");
        let post_id = post(&db, author, &[]);
        let now = Utc::now();

        assert!(db.record_post_view(&post_id, Some(viewer), None, None, now - Duration::minutes(90)).unwrap());
        assert!(db.record_post_view(&post_id, Some(viewer), None, None, now).unwrap());
        assert!(!db.record_post_view(&post_id, Some(viewer), None, None, now).unwrap());
        assert!(db.record_post_view(&post_id, None, Some("1.2.3.4"), None, now).unwrap());
        assert!(!db.record_post_view(&post_id, None, Some("1.2.3.4"), None, now).unwrap());

        assert_eq!(db.post_by_id(&post_id).unwrap().unwrap().views_count, 3);
        let recent = db.recent_post_views(&post_id, 50).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().any(|v| v.user.is_none()));
    }

    #[test]
    fn replies_cannot_be_nested() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let post_id = post(&db, author, &[]);

        let top = comment(&db, &post_id, author, None).unwrap();
        let reply = comment(&db, &post_id, author, Some(&top)).unwrap();
        let err = comment(&db, &post_id, author, Some(&reply)).unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));

        assert_eq!(db.comment_counts(&post_id).unwrap(), (1, 2));
        assert_eq!(db.top_level_comments(&post_id, None).unwrap().len(), 1);
        assert_eq!(db.comment_replies(&post_id, None).unwrap().len(), 1);
    }

    #[test]
    fn comment_likes_report_viewer_state() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let fan = account(&db, "f@example.com");
        let post_id = post(&db, author, &[]);
        let top = comment(&db, &post_id, author, None).unwrap();

        assert_eq!(db.toggle_comment_like(&top, fan).unwrap(), (true, 1));
        let seen = db.comment_by_id(&top, Some(fan)).unwrap().unwrap();
        assert!(seen.is_liked);
        assert_eq!(seen.likes_count, 1);
        assert!(!db.comment_by_id(&top, None).unwrap().unwrap().is_liked);

        db.deactivate_comment(&top).unwrap();
        assert!(db.top_level_comments(&post_id, None).unwrap().is_empty());
    }

    #[test]
    fn list_filters_and_soft_delete() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let cat = db.create_post_category("Equipment", "equipment", None).unwrap();
        let first = post(&db, author, &[]);
        let second = post(&db, author, &[]);
        db.update_post(
            &second,
            &PostChanges { category_id: Some(cat.category_id), title: Some("Mud pump".into()), ..Default::default() },
        )
        .unwrap();

        let (all, total) = db.list_posts(&PostQuery::default(), 20, 0).unwrap();
        assert_eq!((all.len(), total), (2, 2));

        let by_cat = PostQuery { category_slug: Some("equipment".into()), ..Default::default() };
        let (rows, total) = db.list_posts(&by_cat, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].post_id, second);
        assert_eq!(rows[0].category.as_ref().unwrap().slug, "equipment");

        let by_title = PostQuery { search: Some("drill".into()), ..Default::default() };
        assert_eq!(db.list_posts(&by_title, 20, 0).unwrap().1, 1);

        db.deactivate_post(&first).unwrap();
        assert_eq!(db.list_posts(&PostQuery::default(), 20, 0).unwrap().1, 1);
        assert!(!db.post_by_id(&first).unwrap().unwrap().is_active);
    }

    #[test]
    fn share_counters_and_rate_window() {
        let db = Database::open_in_memory().unwrap();
        let author = account(&db, "a@example.com");
        let post_id = post(&db, author, &[]);

        for method in [ShareMethod::WhatsApp, ShareMethod::WhatsApp, ShareMethod::CopyLink] {
            db.record_share(&NewShare {
                share_id: short_id(),
                post_id: post_id.clone(),
                user_id: None,
                method,
                ip_address: Some("9.9.9.9".into()),
                user_agent: None,
            })
            .unwrap();
        }

        let hour_ago = Utc::now() - Duration::hours(1);
        assert_eq!(db.shares_since(None, Some("9.9.9.9"), hour_ago).unwrap(), 3);
        assert_eq!(db.shares_since(None, Some("8.8.8.8"), hour_ago).unwrap(), 0);
        assert_eq!(db.shares_since(Some(author), None, hour_ago).unwrap(), 0);

        let by_method = db.shares_by_method(&post_id, None).unwrap();
        assert_eq!(by_method[0], (ShareMethod::WhatsApp, 2));

        let today = Utc::now().date_naive();
        let daily = db
            .daily_shares(&post_id, Utc::now() - Duration::days(1), Utc::now() + Duration::days(1))
            .unwrap();
        assert_eq!(daily.get(&today), Some(&3));
    }
}
