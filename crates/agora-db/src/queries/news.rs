use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use uuid::Uuid;

use agora_types::models::ArticleStatus;

use crate::columns;
use crate::models::{ArticleOrdering, ArticleQuery, ArticleRow, NewArticle, NewsCategoryRow, NewsSourceRow};
use crate::queries::{Filters, contains_pattern, text};
use crate::{Database, Result, format_timestamp};

const PUBLISHED_COUNT: &str =
    "(SELECT COUNT(*) FROM articles x WHERE x.category_id = c.id AND x.status = 'published')";

fn article_select() -> String {
    format!(
        "SELECT a.article_id, a.title, a.slug, a.summary, a.content, a.featured_image,
                a.featured_image_caption, a.video_url, a.status, a.priority, a.published_at,
                a.views_count, a.likes_count, a.shares_count, a.meta_description, a.meta_keywords,
                a.country, a.region, a.original_url, a.external_id, a.created_at, a.updated_at,
                c.id, c.name, c.slug, c.description, c.is_active, {},
                s.source_id, s.name, s.website, s.logo, s.description, s.is_verified
         FROM articles a
         LEFT JOIN news_categories c ON c.id = a.category_id
         LEFT JOIN news_sources s ON s.source_id = a.source_id",
        PUBLISHED_COUNT
    )
}

impl ArticleOrdering {
    fn column(self) -> &'static str {
        match self {
            ArticleOrdering::PublishedAt => "a.published_at",
            ArticleOrdering::Views => "a.views_count",
            ArticleOrdering::Likes => "a.likes_count",
        }
    }
}

impl Database {
    // -- Categories & sources --

    pub fn create_news_category(&self, name: &str, slug: &str, description: Option<&str>) -> Result<NewsCategoryRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO news_categories (name, slug, description, is_active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                (name, slug, description, format_timestamp(Utc::now())),
            )?;
            Ok(NewsCategoryRow {
                id: conn.last_insert_rowid(),
                name: name.to_string(),
                slug: slug.to_string(),
                description: description.map(str::to_string),
                is_active: true,
                articles_count: 0,
            })
        })
    }

    /// Active categories with their published article counts.
    pub fn news_categories(&self) -> Result<Vec<NewsCategoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.name, c.slug, c.description, c.is_active, {}
                 FROM news_categories c WHERE c.is_active = 1 ORDER BY c.name",
                PUBLISHED_COUNT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| read_category(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn news_category_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM news_categories WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn create_news_source(
        &self,
        name: &str,
        website: Option<&str>,
        logo: Option<&str>,
        description: Option<&str>,
        is_verified: bool,
    ) -> Result<NewsSourceRow> {
        self.with_conn(|conn| {
            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO news_sources (source_id, name, website, logo, description, is_verified, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                (id.to_string(), name, website, logo, description, is_verified, format_timestamp(Utc::now())),
            )?;
            Ok(NewsSourceRow {
                source_id: id,
                name: name.to_string(),
                website: website.map(str::to_string),
                logo: logo.map(str::to_string),
                description: description.map(str::to_string),
                is_verified,
            })
        })
    }

    pub fn news_source_exists(&self, source_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM news_sources WHERE source_id = ?1)",
                [source_id.to_string()],
                |row| row.get(0),
            )?)
        })
    }

    // -- Articles --

    /// Stores the article. Published and featured articles get their
    /// publication time immediately.
    pub fn create_article(&self, new: &NewArticle) -> Result<ArticleRow> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            let published_at = is_public(new.status).then(|| now.clone());
            conn.execute(
                "INSERT INTO articles (article_id, title, slug, summary, content, featured_image,
                    featured_image_caption, video_url, category_id, source_id, status, priority,
                    published_at, meta_description, meta_keywords, country, region, original_url,
                    external_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?20)",
                rusqlite::params![
                    new.article_id.to_string(),
                    new.title,
                    new.slug,
                    new.summary,
                    new.content,
                    new.featured_image,
                    new.featured_image_caption,
                    new.video_url,
                    new.category_id,
                    new.source_id.map(|s| s.to_string()),
                    new.status.as_str(),
                    new.priority.as_str(),
                    published_at,
                    new.meta_description,
                    new.meta_keywords,
                    new.country,
                    new.region,
                    new.original_url,
                    new.external_id,
                    now,
                ],
            )?;
            query_article(conn, new.article_id)?
                .ok_or_else(|| crate::DbError::Corrupt(format!("article {} vanished", new.article_id)))
        })
    }

    /// Any article regardless of status.
    pub fn article(&self, article_id: Uuid) -> Result<Option<ArticleRow>> {
        self.with_conn(|conn| query_article(conn, article_id))
    }

    /// A published article, counting the read. The increment happens in the
    /// database so concurrent readers never lose a view.
    pub fn read_published_article(&self, article_id: Uuid) -> Result<Option<ArticleRow>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE articles SET views_count = views_count + 1
                 WHERE article_id = ?1 AND status = 'published'",
                [article_id.to_string()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_article(conn, article_id)
        })
    }

    /// Changes the status. The first move to published or featured stamps
    /// `published_at`; later moves keep it.
    pub fn set_article_status(&self, article_id: Uuid, status: ArticleStatus) -> Result<Option<ArticleRow>> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            let updated = conn.execute(
                "UPDATE articles SET
                    status = ?2,
                    published_at = CASE WHEN ?3 AND published_at IS NULL THEN ?4 ELSE published_at END,
                    updated_at = ?4
                 WHERE article_id = ?1",
                (article_id.to_string(), status.as_str(), is_public(status), &now),
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_article(conn, article_id)
        })
    }

    /// Published articles matching `query`, newest publication first unless ordered otherwise.
    pub fn list_articles(&self, query: &ArticleQuery, limit: u32, offset: u32) -> Result<(Vec<ArticleRow>, u64)> {
        let mut filters = Filters::default();
        filters.push("a.status = 'published' AND a.published_at IS NOT NULL", []);
        if let Some(slug) = &query.category_slug {
            filters.push("c.slug = ?", [text(slug.as_str())]);
        }
        if let Some(country) = &query.country {
            filters.push("a.country LIKE ? ESCAPE '\\'", [text(contains_pattern(country))]);
        }
        if let Some(priority) = query.priority {
            filters.push("a.priority = ?", [text(priority.as_str())]);
        }
        if let Some(since) = query.published_since {
            filters.push("a.published_at >= ?", [text(format_timestamp(since))]);
        }
        if let Some(search) = &query.search {
            push_text_search(&mut filters, search);
        }
        let order = match query.ordering {
            Some((column, desc)) => format!("{} {}", column.column(), if desc { "DESC" } else { "ASC" }),
            None => "a.published_at DESC".to_string(),
        };

        self.with_conn(|conn| {
            let idx = filters.next_index();
            let sql = format!(
                "{} {} ORDER BY {}, a.created_at DESC LIMIT ?{} OFFSET ?{}",
                article_select(),
                filters.sql(),
                order,
                idx,
                idx + 1
            );
            let mut params = filters.params().to_vec();
            params.push(i64::from(limit).into());
            params.push(i64::from(offset).into());
            let rows = query_articles(conn, &sql, &params)?;

            let count_sql = format!(
                "SELECT COUNT(*) FROM articles a LEFT JOIN news_categories c ON c.id = a.category_id {}",
                filters.sql()
            );
            let total = conn.query_row(&count_sql, params_from_iter(filters.params().iter()), |row| {
                columns::count(row, 0)
            })?;
            Ok((rows, total))
        })
    }

    /// Other published articles of the same category.
    pub fn related_articles(&self, article_id: Uuid, limit: u32) -> Result<Vec<ArticleRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE a.status = 'published' AND a.article_id <> ?1
                   AND a.category_id = (SELECT category_id FROM articles WHERE article_id = ?1)
                 ORDER BY a.published_at DESC LIMIT ?2",
                article_select()
            );
            query_articles(conn, &sql, &[text(article_id.to_string()), i64::from(limit).into()])
        })
    }

    pub fn featured_articles(&self) -> Result<Vec<ArticleRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE a.status = 'featured' AND a.published_at IS NOT NULL ORDER BY a.published_at DESC",
                article_select()
            );
            query_articles(conn, &sql, &[])
        })
    }

    pub fn breaking_articles(&self, limit: u32) -> Result<Vec<ArticleRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE a.priority = 'breaking' AND a.status = 'published' AND a.published_at IS NOT NULL
                 ORDER BY a.published_at DESC LIMIT ?1",
                article_select()
            );
            query_articles(conn, &sql, &[i64::from(limit).into()])
        })
    }

    /// Published since `since`, by views, then likes, then shares.
    pub fn trending_articles(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<ArticleRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE a.status = 'published' AND a.published_at >= ?1
                 ORDER BY a.views_count DESC, a.likes_count DESC, a.shares_count DESC LIMIT ?2",
                article_select()
            );
            query_articles(conn, &sql, &[text(format_timestamp(since)), i64::from(limit).into()])
        })
    }

    pub fn search_articles(&self, q: &str, limit: u32) -> Result<Vec<ArticleRow>> {
        let mut filters = Filters::default();
        filters.push("a.status = 'published'", []);
        push_text_search(&mut filters, q);
        self.with_conn(|conn| {
            let sql = format!(
                "{} {} ORDER BY a.published_at DESC LIMIT ?{}",
                article_select(),
                filters.sql(),
                filters.next_index()
            );
            let mut params = filters.params().to_vec();
            params.push(i64::from(limit).into());
            query_articles(conn, &sql, &params)
        })
    }
}

fn is_public(status: ArticleStatus) -> bool {
    matches!(status, ArticleStatus::Published | ArticleStatus::Featured)
}

fn push_text_search(filters: &mut Filters, needle: &str) {
    let pattern = contains_pattern(needle);
    filters.push(
        "(a.title LIKE ? ESCAPE '\\' OR a.summary LIKE ? ESCAPE '\\' OR a.content LIKE ? ESCAPE '\\')",
        [text(pattern.clone()), text(pattern.clone()), text(pattern)],
    );
}

fn read_category(row: &Row<'_>, start: usize) -> rusqlite::Result<NewsCategoryRow> {
    Ok(NewsCategoryRow {
        id: row.get(start)?,
        name: row.get(start + 1)?,
        slug: row.get(start + 2)?,
        description: row.get(start + 3)?,
        is_active: row.get(start + 4)?,
        articles_count: columns::count(row, start + 5)?,
    })
}

fn read_article(row: &Row<'_>) -> rusqlite::Result<ArticleRow> {
    let category = match row.get::<_, Option<i64>>(22)? {
        Some(_) => Some(read_category(row, 22)?),
        None => None,
    };
    let source = match columns::opt_uuid(row, 28)? {
        Some(source_id) => Some(NewsSourceRow {
            source_id,
            name: row.get(29)?,
            website: row.get(30)?,
            logo: row.get(31)?,
            description: row.get(32)?,
            is_verified: row.get(33)?,
        }),
        None => None,
    };
    Ok(ArticleRow {
        article_id: columns::uuid(row, 0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        summary: row.get(3)?,
        content: row.get(4)?,
        featured_image: row.get(5)?,
        featured_image_caption: row.get(6)?,
        video_url: row.get(7)?,
        status: columns::choice(row, 8)?,
        priority: columns::choice(row, 9)?,
        published_at: columns::opt_ts(row, 10)?,
        views_count: columns::count(row, 11)?,
        likes_count: columns::count(row, 12)?,
        shares_count: columns::count(row, 13)?,
        meta_description: row.get(14)?,
        meta_keywords: row.get(15)?,
        country: row.get(16)?,
        region: row.get(17)?,
        original_url: row.get(18)?,
        external_id: row.get(19)?,
        created_at: columns::ts(row, 20)?,
        updated_at: columns::ts(row, 21)?,
        category,
        source,
    })
}

fn query_article(conn: &Connection, article_id: Uuid) -> Result<Option<ArticleRow>> {
    let sql = format!("{} WHERE a.article_id = ?1", article_select());
    Ok(conn
        .query_row(&sql, [article_id.to_string()], read_article)
        .optional()?)
}

fn query_articles(conn: &Connection, sql: &str, params: &[rusqlite::types::Value]) -> Result<Vec<ArticleRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), read_article)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::ArticlePriority;
    use chrono::Duration;

    fn article(db: &Database, slug: &str, category: Option<i64>, status: ArticleStatus, priority: ArticlePriority) -> Uuid {
        let id = Uuid::new_v4();
        db.create_article(&NewArticle {
            article_id: id,
            title: format!("Rig count {}", slug),
            slug: slug.into(),
            summary: Some("Weekly rig count".into()),
            content: "Offshore rigs rose again this week".into(),
            featured_image: None,
            featured_image_caption: None,
            video_url: None,
            category_id: category,
            source_id: None,
            status,
            priority,
            meta_description: None,
            meta_keywords: None,
            country: Some("Nigeria".into()),
            region: None,
            original_url: None,
            external_id: None,
        })
        .unwrap();
        id
    }

    #[test]
    fn publication_time_is_set_once() {
        let db = Database::open_in_memory().unwrap();
        let id = article(&db, "a", None, ArticleStatus::Draft, ArticlePriority::Medium);
        assert!(db.article(id).unwrap().unwrap().published_at.is_none());

        let first = db.set_article_status(id, ArticleStatus::Published).unwrap().unwrap();
        let stamped = first.published_at.unwrap();
        let again = db.set_article_status(id, ArticleStatus::Featured).unwrap().unwrap();
        assert_eq!(again.published_at, Some(stamped));
        assert_eq!(db.featured_articles().unwrap().len(), 1);

        assert!(db.set_article_status(Uuid::new_v4(), ArticleStatus::Published).unwrap().is_none());
    }

    #[test]
    fn reads_count_views_only_when_published() {
        let db = Database::open_in_memory().unwrap();
        let live = article(&db, "live", None, ArticleStatus::Published, ArticlePriority::Medium);
        let draft = article(&db, "draft", None, ArticleStatus::Draft, ArticlePriority::Medium);

        assert_eq!(db.read_published_article(live).unwrap().unwrap().views_count, 1);
        assert_eq!(db.read_published_article(live).unwrap().unwrap().views_count, 2);
        assert!(db.read_published_article(draft).unwrap().is_none());
        assert_eq!(db.article(draft).unwrap().unwrap().views_count, 0);
    }

    #[test]
    fn listing_filters_and_counts() {
        let db = Database::open_in_memory().unwrap();
        let upstream = db.create_news_category("Upstream", "upstream", None).unwrap();
        let other = db.create_news_category("Downstream", "downstream", None).unwrap();
        let first = article(&db, "u1", Some(upstream.id), ArticleStatus::Published, ArticlePriority::Breaking);
        article(&db, "u2", Some(upstream.id), ArticleStatus::Published, ArticlePriority::Low);
        article(&db, "d1", Some(other.id), ArticleStatus::Draft, ArticlePriority::Low);

        let (_, total) = db.list_articles(&ArticleQuery::default(), 12, 0).unwrap();
        assert_eq!(total, 2);

        let by_category = ArticleQuery { category_slug: Some("upstream".into()), ..Default::default() };
        assert_eq!(db.list_articles(&by_category, 12, 0).unwrap().1, 2);
        let by_priority = ArticleQuery { priority: Some(ArticlePriority::Breaking), ..Default::default() };
        assert_eq!(db.list_articles(&by_priority, 12, 0).unwrap().1, 1);
        let future = ArticleQuery { published_since: Some(Utc::now() + Duration::days(1)), ..Default::default() };
        assert_eq!(db.list_articles(&future, 12, 0).unwrap().1, 0);

        assert_eq!(db.breaking_articles(5).unwrap().len(), 1);
        assert_eq!(db.related_articles(first, 5).unwrap().len(), 1);
        assert_eq!(db.search_articles("offshore", 20).unwrap().len(), 2);
        assert_eq!(db.trending_articles(Utc::now() - Duration::days(7), 10).unwrap().len(), 2);

        let categories = db.news_categories().unwrap();
        let count_of = |slug: &str| categories.iter().find(|c| c.slug == slug).unwrap().articles_count;
        assert_eq!(count_of("upstream"), 2);
        assert_eq!(count_of("downstream"), 0);
    }

    #[test]
    fn slugs_are_unique() {
        let db = Database::open_in_memory().unwrap();
        article(&db, "same", None, ArticleStatus::Draft, ArticlePriority::Low);
        let err = db
            .create_article(&NewArticle {
                article_id: Uuid::new_v4(),
                title: "x".into(),
                slug: "same".into(),
                summary: None,
                content: "x".into(),
                featured_image: None,
                featured_image_caption: None,
                video_url: None,
                category_id: None,
                source_id: None,
                status: ArticleStatus::Draft,
                priority: ArticlePriority::Low,
                meta_description: None,
                meta_keywords: None,
                country: None,
                region: None,
                original_url: None,
                external_id: None,
            })
            .unwrap_err();
        assert!(err.is_duplicate());
    }
}
