use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use agora_types::api::profiles::ProfileUpdate;
use agora_types::models::RatingStatus;

use crate::columns::{self, USER_COLUMN_COUNT, user_columns};
use crate::models::{FollowRow, ProfileRow, RatingRow, RatingStats, UserRef, VisitSummary};
use crate::queries::contains_pattern;
use crate::{Database, DbError, Result, format_timestamp};

/// Repeat visits inside this window count once.
pub const VISIT_DEDUP_DAYS: i64 = 30;

impl Database {
    // -- Profiles --

    pub fn profile_by_account(&self, account_id: Uuid) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "p.account_id = ?1", &account_id.to_string()))
    }

    pub fn profile_by_id(&self, profile_id: Uuid) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "p.profile_id = ?1", &profile_id.to_string()))
    }

    /// Applies the fields present in `update`; absent fields keep their value.
    pub fn update_profile(&self, account_id: Uuid, update: &ProfileUpdate) -> Result<bool> {
        let interest = update
            .interest
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE profiles SET
                    company_name = COALESCE(?2, company_name),
                    about_bio = COALESCE(?3, about_bio),
                    location = COALESCE(?4, location),
                    country = COALESCE(?5, country),
                    city = COALESCE(?6, city),
                    interest = COALESCE(?7, interest),
                    language_preference = COALESCE(?8, language_preference),
                    timezone = COALESCE(?9, timezone),
                    is_omc = COALESCE(?10, is_omc),
                    updated_at = ?11
                 WHERE account_id = ?1",
                rusqlite::params![
                    account_id.to_string(),
                    update.company_name,
                    update.about_bio,
                    update.location,
                    update.country,
                    update.city,
                    interest,
                    update.language_preference,
                    update.timezone,
                    update.is_omc,
                    format_timestamp(Utc::now()),
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Stores a new profile picture and returns the file it replaced.
    pub fn set_profile_picture(&self, account_id: Uuid, path: &str) -> Result<Option<String>> {
        self.replace_profile_asset(account_id, "profile_picture", path)
    }

    pub fn set_background_picture(&self, account_id: Uuid, path: &str) -> Result<Option<String>> {
        self.replace_profile_asset(account_id, "background_picture", path)
    }

    fn replace_profile_asset(&self, account_id: Uuid, column: &str, path: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row(
                    &format!("SELECT {} FROM profiles WHERE account_id = ?1", column),
                    [account_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            tx.execute(
                &format!("UPDATE profiles SET {} = ?2, updated_at = ?3 WHERE account_id = ?1", column),
                (account_id.to_string(), path, format_timestamp(Utc::now())),
            )?;
            tx.commit()?;
            Ok(previous)
        })
    }

    pub fn set_timezone(&self, account_id: Uuid, timezone: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET timezone = ?2, updated_at = ?3 WHERE account_id = ?1",
                (account_id.to_string(), timezone, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    /// Accounts matching `query` by name, email or company, excluding `exclude`.
    pub fn search_accounts(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<UserRef>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM accounts a LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE a.id <> ?1
                   AND (a.full_name LIKE ?2 ESCAPE '\\' OR a.email LIKE ?2 ESCAPE '\\'
                        OR p.company_name LIKE ?2 ESCAPE '\\')
                 ORDER BY a.full_name
                 LIMIT ?3",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((exclude.to_string(), contains_pattern(query), limit), |row| {
                    columns::user_ref(row, 0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // -- Follows --

    /// Returns false when the follow already existed.
    pub fn follow(&self, follower: Uuid, following: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO follows (follow_id, follower_id, following_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(follower_id, following_id) DO NOTHING",
                (
                    Uuid::new_v4().to_string(),
                    follower.to_string(),
                    following.to_string(),
                    format_timestamp(Utc::now()),
                ),
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns false when there was nothing to remove.
    pub fn unfollow(&self, follower: Uuid, following: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                (follower.to_string(), following.to_string()),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_following(&self, follower: Uuid, following: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2)",
                (follower.to_string(), following.to_string()),
                |row| row.get(0),
            )?)
        })
    }

    /// (followers, following)
    pub fn follow_counts(&self, account_id: Uuid) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM follows WHERE following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
                [account_id.to_string()],
                |row| Ok((columns::count(row, 0)?, columns::count(row, 1)?)),
            )?)
        })
    }

    /// Accounts following `account_id`, newest first.
    pub fn followers(&self, account_id: Uuid, limit: u32, offset: u32) -> Result<(Vec<FollowRow>, u64)> {
        self.with_conn(|conn| query_follows(conn, "f.following_id", account_id, limit, offset))
    }

    /// Accounts `account_id` follows, newest first.
    pub fn following(&self, account_id: Uuid, limit: u32, offset: u32) -> Result<(Vec<FollowRow>, u64)> {
        self.with_conn(|conn| query_follows(conn, "f.follower_id", account_id, limit, offset))
    }

    // -- Ratings --

    /// Creates or replaces the rating `rater` gives `rated`.
    /// Returns the stored rating and whether it was newly created.
    pub fn upsert_rating(
        &self,
        rater: Uuid,
        rated: Uuid,
        rating_count: u8,
        review_content: Option<&str>,
    ) -> Result<(RatingRow, bool)> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            let existed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM ratings WHERE rater_id = ?1 AND rated_id = ?2)",
                (rater.to_string(), rated.to_string()),
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO ratings (rating_id, rater_id, rated_id, rating_count, review_content, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)
                 ON CONFLICT(rater_id, rated_id) DO UPDATE SET
                    rating_count = excluded.rating_count,
                    review_content = excluded.review_content,
                    updated_at = excluded.updated_at",
                (
                    Uuid::new_v4().to_string(),
                    rater.to_string(),
                    rated.to_string(),
                    rating_count,
                    review_content,
                    &now,
                ),
            )?;
            let rating = query_ratings(
                &tx,
                "r.rater_id = ?1 AND r.rated_id = ?2",
                &[rater.to_string(), rated.to_string()],
                1,
                0,
            )?
            .pop()
            .ok_or_else(|| DbError::Corrupt("rating vanished after upsert".into()))?;
            tx.commit()?;
            Ok((rating, !existed))
        })
    }

    /// Active ratings received by `rated`, newest first.
    pub fn ratings_for(&self, rated: Uuid, limit: u32, offset: u32) -> Result<(Vec<RatingRow>, u64)> {
        self.with_conn(|conn| {
            let rows = query_ratings(
                conn,
                "r.rated_id = ?1 AND r.status = 'active'",
                &[rated.to_string()],
                limit,
                offset,
            )?;
            let total = conn.query_row(
                "SELECT COUNT(*) FROM ratings WHERE rated_id = ?1 AND status = 'active'",
                [rated.to_string()],
                |row| columns::count(row, 0),
            )?;
            Ok((rows, total))
        })
    }

    pub fn rating_stats(&self, rated: Uuid) -> Result<RatingStats> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*), COALESCE(AVG(rating_count), 0.0),
                        COUNT(CASE WHEN TRIM(COALESCE(review_content, '')) <> '' THEN 1 END)
                 FROM ratings WHERE rated_id = ?1 AND status = 'active'",
                [rated.to_string()],
                |row| {
                    Ok(RatingStats {
                        count: columns::count(row, 0)?,
                        average: row.get(1)?,
                        reviews: columns::count(row, 2)?,
                    })
                },
            )?)
        })
    }

    // -- Profile visits --

    /// Records a visit unless the same visitor (or anonymous IP) was seen in the
    /// last 30 days. Returns whether a row was written.
    pub fn record_profile_visit(
        &self,
        owner: Uuid,
        visitor: Option<Uuid>,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if visitor.is_none() && ip.is_none() {
            return Ok(false);
        }

        self.with_conn_mut(|conn| {
            let since = format_timestamp(now - Duration::days(VISIT_DEDUP_DAYS));
            let tx = conn.transaction()?;
            let seen: bool = match visitor {
                Some(visitor) => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM profile_visits
                     WHERE profile_owner_id = ?1 AND visitor_id = ?2 AND visited_at >= ?3)",
                    (owner.to_string(), visitor.to_string(), &since),
                    |row| row.get(0),
                )?,
                None => tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM profile_visits
                     WHERE profile_owner_id = ?1 AND visitor_id IS NULL AND visitor_ip = ?2 AND visited_at >= ?3)",
                    (owner.to_string(), ip, &since),
                    |row| row.get(0),
                )?,
            };
            if seen {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO profile_visits (visit_id, profile_owner_id, visitor_id, visitor_ip, visited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    Uuid::new_v4().to_string(),
                    owner.to_string(),
                    visitor.map(|v| v.to_string()),
                    ip,
                    format_timestamp(now),
                ),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Visit counts over the last day, week, month and all time.
    pub fn visit_counts(&self, owner: Uuid, now: DateTime<Utc>) -> Result<[u64; 4]> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    COUNT(CASE WHEN visited_at >= ?2 THEN 1 END),
                    COUNT(CASE WHEN visited_at >= ?3 THEN 1 END),
                    COUNT(CASE WHEN visited_at >= ?4 THEN 1 END),
                    COUNT(*)
                 FROM profile_visits WHERE profile_owner_id = ?1",
                (
                    owner.to_string(),
                    format_timestamp(now - Duration::hours(24)),
                    format_timestamp(now - Duration::days(7)),
                    format_timestamp(now - Duration::days(30)),
                ),
                |row| {
                    Ok([
                        columns::count(row, 0)?,
                        columns::count(row, 1)?,
                        columns::count(row, 2)?,
                        columns::count(row, 3)?,
                    ])
                },
            )?)
        })
    }

    pub fn visit_summary(&self, owner: Uuid, since: DateTime<Utc>) -> Result<VisitSummary> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*),
                        COUNT(visitor_id),
                        COUNT(*) - COUNT(visitor_id),
                        COUNT(DISTINCT visitor_id),
                        COUNT(DISTINCT CASE WHEN visitor_id IS NULL THEN visitor_ip END)
                 FROM profile_visits WHERE profile_owner_id = ?1 AND visited_at >= ?2",
                (owner.to_string(), format_timestamp(since)),
                |row| {
                    Ok(VisitSummary {
                        total: columns::count(row, 0)?,
                        authenticated: columns::count(row, 1)?,
                        anonymous: columns::count(row, 2)?,
                        unique_accounts: columns::count(row, 3)?,
                        unique_ips: columns::count(row, 4)?,
                    })
                },
            )?)
        })
    }

    /// Most recent signed-in visitors since `since`.
    pub fn recent_visitors(
        &self,
        owner: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<(UserRef, DateTime<Utc>)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, v.visited_at
                 FROM profile_visits v
                 JOIN accounts a ON a.id = v.visitor_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 WHERE v.profile_owner_id = ?1 AND v.visited_at >= ?2
                 ORDER BY v.visited_at DESC
                 LIMIT ?3",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((owner.to_string(), format_timestamp(since), limit), |row| {
                    Ok((columns::user_ref(row, 0)?, columns::ts(row, USER_COLUMN_COUNT)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn daily_visits(&self, owner: Uuid, since: DateTime<Utc>) -> Result<BTreeMap<NaiveDate, u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT substr(visited_at, 1, 10), COUNT(*) FROM profile_visits
                 WHERE profile_owner_id = ?1 AND visited_at >= ?2
                 GROUP BY 1",
            )?;
            let rows = stmt
                .query_map((owner.to_string(), format_timestamp(since)), |row| {
                    Ok((row.get::<_, String>(0)?, columns::count(row, 1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(day, n)| columns::day(&day).map(|d| (d, n)))
                .collect())
        })
    }
}

fn query_profile(conn: &Connection, predicate: &str, value: &str) -> Result<Option<ProfileRow>> {
    let sql = format!(
        "SELECT {}, p.profile_id, p.background_picture, p.about_bio, p.location, p.country, p.city,
                p.interest, p.language_preference, p.timezone, p.is_omc, p.verification_documents,
                p.created_at, p.updated_at
         FROM profiles p JOIN accounts a ON a.id = p.account_id
         WHERE {}",
        user_columns("a", "p"),
        predicate
    );
    Ok(conn.query_row(&sql, [value], read_profile).optional()?)
}

fn read_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    let n = USER_COLUMN_COUNT;
    let interest: String = row.get(n + 6)?;
    let documents: String = row.get(n + 10)?;
    Ok(ProfileRow {
        account: columns::user_ref(row, 0)?,
        profile_id: columns::uuid(row, n)?,
        background_picture: row.get(n + 1)?,
        about_bio: row.get(n + 2)?,
        location: row.get(n + 3)?,
        country: row.get(n + 4)?,
        city: row.get(n + 5)?,
        interest: serde_json::from_str(&interest).unwrap_or_default(),
        language_preference: row.get(n + 7)?,
        timezone: row.get(n + 8)?,
        is_omc: row.get(n + 9)?,
        verification_documents: serde_json::from_str(&documents).unwrap_or_default(),
        created_at: columns::ts(row, n + 11)?,
        updated_at: columns::ts(row, n + 12)?,
    })
}

fn query_follows(
    conn: &Connection,
    column: &str,
    account_id: Uuid,
    limit: u32,
    offset: u32,
) -> Result<(Vec<FollowRow>, u64)> {
    let sql = format!(
        "SELECT f.follow_id, f.created_at, {}, {}
         FROM follows f
         JOIN accounts fa ON fa.id = f.follower_id LEFT JOIN profiles fp ON fp.account_id = fa.id
         JOIN accounts ga ON ga.id = f.following_id LEFT JOIN profiles gp ON gp.account_id = ga.id
         WHERE {} = ?1
         ORDER BY f.created_at DESC
         LIMIT ?2 OFFSET ?3",
        user_columns("fa", "fp"),
        user_columns("ga", "gp"),
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((account_id.to_string(), limit, offset), |row| {
            Ok(FollowRow {
                follow_id: columns::uuid(row, 0)?,
                created_at: columns::ts(row, 1)?,
                follower: columns::user_ref(row, 2)?,
                following: columns::user_ref(row, 2 + USER_COLUMN_COUNT)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let total = conn.query_row(
        &format!("SELECT COUNT(*) FROM follows f WHERE {} = ?1", column),
        [account_id.to_string()],
        |row| columns::count(row, 0),
    )?;
    Ok((rows, total))
}

fn query_ratings(
    conn: &Connection,
    predicate: &str,
    params: &[String],
    limit: u32,
    offset: u32,
) -> Result<Vec<RatingRow>> {
    let sql = format!(
        "SELECT r.rating_id, r.rating_count, r.review_content, r.status, r.created_at, r.updated_at, {}, {}
         FROM ratings r
         JOIN accounts ra ON ra.id = r.rater_id LEFT JOIN profiles rp ON rp.account_id = ra.id
         JOIN accounts da ON da.id = r.rated_id LEFT JOIN profiles dp ON dp.account_id = da.id
         WHERE {}
         ORDER BY r.created_at DESC
         LIMIT {} OFFSET {}",
        user_columns("ra", "rp"),
        user_columns("da", "dp"),
        predicate,
        limit,
        offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(RatingRow {
                rating_id: columns::uuid(row, 0)?,
                rating_count: row.get(1)?,
                review_content: row.get(2)?,
                status: columns::choice::<RatingStatus>(row, 3)?,
                created_at: columns::ts(row, 4)?,
                updated_at: columns::ts(row, 5)?,
                rater: columns::user_ref(row, 6)?,
                rated: columns::user_ref(row, 6 + USER_COLUMN_COUNT)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::account;

    #[test]
    fn follow_is_unique_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");

        assert!(db.follow(a, b).unwrap());
        assert!(!db.follow(a, b).unwrap());
        assert_eq!(db.follow_counts(b).unwrap(), (1, 0));
        assert!(db.is_following(a, b).unwrap());

        let (followers, total) = db.followers(b, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(followers[0].follower.id, a);

        assert!(db.unfollow(a, b).unwrap());
        assert!(!db.unfollow(a, b).unwrap());
    }

    #[test]
    fn self_follow_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        assert!(db.follow(a, a).is_err());
    }

    #[test]
    fn rating_upsert_keeps_one_row() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let c = account(&db, "c@example.com");

        let (first, created) = db.upsert_rating(a, b, 2, None).unwrap();
        assert!(created);
        let (second, created) = db.upsert_rating(a, b, 5, Some("great rig crew")).unwrap();
        assert!(!created);
        assert_eq!(first.rating_id, second.rating_id);
        assert_eq!(second.rating_count, 5);

        db.upsert_rating(c, b, 4, Some("  ")).unwrap();
        let stats = db.rating_stats(b).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.average - 4.5).abs() < f64::EPSILON);
        assert_eq!(stats.reviews, 1);
    }

    #[test]
    fn visits_deduplicate_within_thirty_days() {
        let db = Database::open_in_memory().unwrap();
        let owner = account(&db, "owner@example.com");
        let visitor = account(&db, "v@example.com");
        let now = Utc::now();

        assert!(db.record_profile_visit(owner, Some(visitor), None, now - Duration::days(40)).unwrap());
        assert!(db.record_profile_visit(owner, Some(visitor), None, now).unwrap());
        assert!(!db.record_profile_visit(owner, Some(visitor), None, now).unwrap());

        assert!(db.record_profile_visit(owner, None, Some("10.0.0.1"), now).unwrap());
        assert!(!db.record_profile_visit(owner, None, Some("10.0.0.1"), now).unwrap());
        assert!(!db.record_profile_visit(owner, None, None, now).unwrap());

        assert_eq!(db.visit_counts(owner, now).unwrap(), [2, 2, 2, 3]);

        let summary = db.visit_summary(owner, now - Duration::days(30)).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.authenticated, 1);
        assert_eq!(summary.anonymous, 1);
        assert_eq!(summary.unique_accounts + summary.unique_ips, 2);

        let recent = db.recent_visitors(owner, now - Duration::days(30), 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].0.id, visitor);

        let daily = db.daily_visits(owner, now - Duration::days(30)).unwrap();
        assert_eq!(daily.get(&now.date_naive()), Some(&2));
    }

    #[test]
    fn search_excludes_caller() {
        let db = Database::open_in_memory().unwrap();
        let me = account(&db, "pipe.fitter@example.com");
        let other = account(&db, "pipe.layer@example.com");
        let found = db.search_accounts("pipe", me, 20).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, other);
    }

    #[test]
    fn profile_update_is_partial() {
        let db = Database::open_in_memory().unwrap();
        let me = account(&db, "me@example.com");
        db.update_profile(
            me,
            &ProfileUpdate {
                city: Some("Aberdeen".into()),
                interest: Some(vec!["offshore".into()]),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_profile(me, &ProfileUpdate { country: Some("UK".into()), ..Default::default() })
            .unwrap();

        let profile = db.profile_by_account(me).unwrap().unwrap();
        assert_eq!(profile.city.as_deref(), Some("Aberdeen"));
        assert_eq!(profile.country.as_deref(), Some("UK"));
        assert_eq!(profile.interest, vec!["offshore".to_string()]);
        assert_eq!(db.profile_by_id(profile.profile_id).unwrap().unwrap().account.id, me);
    }
}
