use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::Result;

/// Report categories every installation starts with: (name, display name).
pub const REPORT_CATEGORIES: &[(&str, &str)] = &[
    ("fraud", "Fraud"),
    ("harassment", "Harassment"),
    ("misinformation", "Misinformation"),
    ("hateful_speech", "Hateful Speech"),
    ("self_harm", "Self Harm"),
    ("scam", "Scam"),
    ("sexual_content", "Sexual Content"),
    ("infringement", "Infringement"),
    ("spam", "Spam"),
    ("illegal_goods", "Illegal Goods"),
    ("impersonation", "Impersonation"),
    ("other", "Other"),
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(V1_SCHEMA)?;
        seed_report_categories(conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    if version < 2 {
        info!("Running migration v2 (single-level comment replies)");
        conn.execute_batch(V2_REPLY_DEPTH)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    }

    info!("Database migrations complete");
    Ok(())
}

fn seed_report_categories(conn: &Connection) -> Result<()> {
    let now = crate::format_timestamp(chrono::Utc::now());
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO report_categories
            (report_category_id, name, display_name, description, is_active, created_at)
         VALUES (?1, ?2, ?3, NULL, 1, ?4)",
    )?;
    for (name, display) in REPORT_CATEGORIES {
        stmt.execute((Uuid::new_v4().to_string(), name, display, &now))?;
    }
    Ok(())
}

const V1_SCHEMA: &str = "
    -- Accounts & profiles

    CREATE TABLE accounts (
        id              TEXT PRIMARY KEY,
        email           TEXT NOT NULL UNIQUE,
        full_name       TEXT NOT NULL,
        password        TEXT NOT NULL,
        is_staff        INTEGER NOT NULL DEFAULT 0,
        is_verified     INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE profiles (
        profile_id              TEXT PRIMARY KEY,
        account_id              TEXT NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE CASCADE,
        company_name            TEXT,
        profile_picture         TEXT,
        background_picture      TEXT,
        about_bio               TEXT,
        location                TEXT,
        country                 TEXT,
        city                    TEXT,
        interest                TEXT NOT NULL DEFAULT '[]',
        language_preference     TEXT NOT NULL DEFAULT 'en',
        timezone                TEXT NOT NULL DEFAULT 'UTC',
        is_omc                  INTEGER NOT NULL DEFAULT 0,
        badge                   TEXT,
        verification_documents  TEXT NOT NULL DEFAULT '[]',
        created_at              TEXT NOT NULL,
        updated_at              TEXT NOT NULL
    );

    CREATE TABLE follows (
        follow_id       TEXT PRIMARY KEY,
        follower_id     TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        following_id    TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at      TEXT NOT NULL,
        UNIQUE(follower_id, following_id),
        CHECK(follower_id <> following_id)
    );

    CREATE INDEX idx_follows_following ON follows(following_id, created_at);

    CREATE TABLE ratings (
        rating_id       TEXT PRIMARY KEY,
        rater_id        TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        rated_id        TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        rating_count    INTEGER NOT NULL CHECK(rating_count BETWEEN 1 AND 5),
        review_content  TEXT,
        status          TEXT NOT NULL DEFAULT 'active',
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        UNIQUE(rater_id, rated_id),
        CHECK(rater_id <> rated_id)
    );

    CREATE TABLE profile_visits (
        visit_id            TEXT PRIMARY KEY,
        profile_owner_id    TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        visitor_id          TEXT REFERENCES accounts(id) ON DELETE SET NULL,
        visitor_ip          TEXT,
        visited_at          TEXT NOT NULL
    );

    CREATE INDEX idx_profile_visits_owner ON profile_visits(profile_owner_id, visited_at);

    -- Posts

    CREATE TABLE post_categories (
        category_id     TEXT PRIMARY KEY,
        name            TEXT NOT NULL UNIQUE,
        slug            TEXT NOT NULL UNIQUE,
        description     TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE posts (
        post_id         TEXT PRIMARY KEY,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        title           TEXT NOT NULL,
        category_id     TEXT REFERENCES post_categories(category_id) ON DELETE SET NULL,
        location        TEXT,
        price           TEXT,
        description     TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE INDEX idx_posts_active ON posts(is_active, created_at);
    CREATE INDEX idx_posts_user ON posts(user_id, created_at);

    CREATE TABLE post_images (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id         TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
        image           TEXT NOT NULL,
        is_primary      INTEGER NOT NULL DEFAULT 0,
        sort_order      INTEGER NOT NULL DEFAULT 0,
        uploaded_at     TEXT NOT NULL
    );

    CREATE INDEX idx_post_images_post ON post_images(post_id, sort_order);

    CREATE TABLE post_likes (
        like_id         TEXT PRIMARY KEY,
        post_id         TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at      TEXT NOT NULL,
        UNIQUE(post_id, user_id)
    );

    CREATE TABLE post_views (
        visit_id        TEXT PRIMARY KEY,
        post_id         TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
        user_id         TEXT REFERENCES accounts(id) ON DELETE SET NULL,
        ip_address      TEXT,
        user_agent      TEXT,
        viewed_at       TEXT NOT NULL
    );

    CREATE INDEX idx_post_views_post ON post_views(post_id, viewed_at);

    CREATE TABLE post_comments (
        comment_id      TEXT PRIMARY KEY,
        post_id         TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        parent_id       TEXT REFERENCES post_comments(comment_id) ON DELETE CASCADE,
        content         TEXT NOT NULL,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE INDEX idx_post_comments_post ON post_comments(post_id, created_at);
    CREATE INDEX idx_post_comments_parent ON post_comments(parent_id);

    CREATE TABLE comment_likes (
        comment_like_id TEXT PRIMARY KEY,
        comment_id      TEXT NOT NULL REFERENCES post_comments(comment_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at      TEXT NOT NULL,
        UNIQUE(comment_id, user_id)
    );

    CREATE TABLE post_shares (
        share_id        TEXT PRIMARY KEY,
        post_id         TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
        user_id         TEXT REFERENCES accounts(id) ON DELETE SET NULL,
        share_method    TEXT NOT NULL,
        ip_address      TEXT,
        user_agent      TEXT,
        shared_at       TEXT NOT NULL
    );

    CREATE INDEX idx_post_shares_post ON post_shares(post_id, shared_at);
    CREATE INDEX idx_post_shares_user ON post_shares(user_id, shared_at);
    CREATE INDEX idx_post_shares_ip ON post_shares(ip_address, shared_at);

    -- Chat

    CREATE TABLE conversations (
        conversation_id TEXT PRIMARY KEY,
        name            TEXT,
        is_group        INTEGER NOT NULL DEFAULT 0,
        created_by      TEXT REFERENCES accounts(id) ON DELETE SET NULL,
        encryption_key  TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE TABLE conversation_participants (
        conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id) ON DELETE CASCADE,
        account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        joined_at       TEXT NOT NULL,
        PRIMARY KEY (conversation_id, account_id)
    );

    CREATE INDEX idx_participants_account ON conversation_participants(account_id);

    CREATE TABLE messages (
        message_id          TEXT PRIMARY KEY,
        conversation_id     TEXT NOT NULL REFERENCES conversations(conversation_id) ON DELETE CASCADE,
        sender_id           TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        content             TEXT,
        timestamp           TEXT NOT NULL,
        message_type        TEXT NOT NULL DEFAULT 'text',
        attachment          TEXT,
        file_name           TEXT,
        file_size           INTEGER,
        file_mime_type      TEXT,
        is_compressed       INTEGER NOT NULL DEFAULT 0,
        original_file_size  INTEGER,
        is_edited           INTEGER NOT NULL DEFAULT 0,
        edited_at           TEXT,
        is_deleted          INTEGER NOT NULL DEFAULT 0,
        deleted_at          TEXT,
        reply_to            TEXT REFERENCES messages(message_id) ON DELETE SET NULL
    );

    CREATE INDEX idx_messages_conversation ON messages(conversation_id, timestamp);

    CREATE TABLE message_read_statuses (
        message_id      TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        read_at         TEXT NOT NULL,
        UNIQUE(message_id, user_id)
    );

    CREATE TABLE message_reactions (
        reaction_id     TEXT PRIMARY KEY,
        message_id      TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        reaction        TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        UNIQUE(message_id, user_id, reaction)
    );

    CREATE INDEX idx_message_reactions_message ON message_reactions(message_id);

    CREATE TABLE user_statuses (
        user_id             TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        status              TEXT NOT NULL DEFAULT 'offline',
        last_seen           TEXT NOT NULL,
        typing_in           TEXT REFERENCES conversations(conversation_id) ON DELETE SET NULL,
        typing_started_at   TEXT
    );

    CREATE TABLE message_deletions (
        message_id      TEXT NOT NULL REFERENCES messages(message_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        deleted_at      TEXT NOT NULL,
        UNIQUE(message_id, user_id)
    );

    CREATE TABLE conversation_deletions (
        conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id) ON DELETE CASCADE,
        user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        deleted_at      TEXT NOT NULL,
        UNIQUE(conversation_id, user_id)
    );

    -- Ads & events

    CREATE TABLE ad_event_categories (
        category_id     TEXT PRIMARY KEY,
        name            TEXT NOT NULL UNIQUE,
        slug            TEXT NOT NULL UNIQUE,
        description     TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        sort_order      INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE TABLE ad_events (
        ad_event_id     TEXT PRIMARY KEY,
        title           TEXT NOT NULL,
        kind            TEXT NOT NULL,
        category_id     TEXT NOT NULL REFERENCES ad_event_categories(category_id),
        description     TEXT,
        link            TEXT,
        banner_image    TEXT,
        location        TEXT,
        start_date      TEXT,
        end_date        TEXT,
        status          TEXT NOT NULL DEFAULT 'active',
        is_featured     INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );

    CREATE INDEX idx_ad_events_kind ON ad_events(kind, status);

    -- News

    CREATE TABLE news_categories (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL UNIQUE,
        slug            TEXT NOT NULL UNIQUE,
        description     TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE news_sources (
        source_id       TEXT PRIMARY KEY,
        name            TEXT NOT NULL UNIQUE,
        website         TEXT,
        logo            TEXT,
        description     TEXT,
        is_verified     INTEGER NOT NULL DEFAULT 0,
        is_active       INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE articles (
        article_id              TEXT PRIMARY KEY,
        title                   TEXT NOT NULL,
        slug                    TEXT NOT NULL UNIQUE,
        summary                 TEXT,
        content                 TEXT NOT NULL,
        featured_image          TEXT,
        featured_image_caption  TEXT,
        video_url               TEXT,
        category_id             INTEGER REFERENCES news_categories(id) ON DELETE SET NULL,
        source_id               TEXT REFERENCES news_sources(source_id) ON DELETE SET NULL,
        status                  TEXT NOT NULL DEFAULT 'draft',
        priority                TEXT NOT NULL DEFAULT 'medium',
        published_at            TEXT,
        views_count             INTEGER NOT NULL DEFAULT 0,
        likes_count             INTEGER NOT NULL DEFAULT 0,
        shares_count            INTEGER NOT NULL DEFAULT 0,
        meta_description        TEXT,
        meta_keywords           TEXT,
        country                 TEXT,
        region                  TEXT,
        original_url            TEXT,
        external_id             TEXT,
        created_at              TEXT NOT NULL,
        updated_at              TEXT NOT NULL
    );

    CREATE INDEX idx_articles_status ON articles(status, published_at);
    CREATE INDEX idx_articles_category ON articles(category_id);

    -- Reports

    CREATE TABLE report_categories (
        report_category_id  TEXT PRIMARY KEY,
        name                TEXT NOT NULL UNIQUE,
        display_name        TEXT NOT NULL,
        description         TEXT,
        is_active           INTEGER NOT NULL DEFAULT 1,
        created_at          TEXT NOT NULL
    );

    CREATE TABLE reports (
        report_id       TEXT PRIMARY KEY,
        reporter_id     TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        category_id     TEXT NOT NULL REFERENCES report_categories(report_category_id),
        reason          TEXT NOT NULL,
        content_type    TEXT NOT NULL,
        object_id       TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'pending',
        priority        INTEGER NOT NULL DEFAULT 1 CHECK(priority BETWEEN 1 AND 3),
        reviewed_by     TEXT REFERENCES accounts(id) ON DELETE SET NULL,
        reviewed_at     TEXT,
        action_taken    TEXT NOT NULL DEFAULT 'none',
        admin_notes     TEXT,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        UNIQUE(reporter_id, content_type, object_id)
    );

    CREATE INDEX idx_reports_status ON reports(status, created_at);
";

const V2_REPLY_DEPTH: &str = "
    CREATE TRIGGER post_comments_single_level
    BEFORE INSERT ON post_comments
    WHEN NEW.parent_id IS NOT NULL
        AND (SELECT parent_id FROM post_comments WHERE comment_id = NEW.parent_id) IS NOT NULL
    BEGIN
        SELECT RAISE(ABORT, 'replies cannot be nested');
    END;
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);

        let categories: i64 = conn
            .query_row("SELECT COUNT(*) FROM report_categories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(categories as usize, REPORT_CATEGORIES.len());
    }
}
