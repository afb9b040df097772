use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params_from_iter};
use uuid::Uuid;

use crate::columns;
use crate::models::{AdCategoryRow, AdEventChanges, AdEventQuery, AdEventRow, AdOrdering, NewAdEvent};
use crate::queries::{Filters, contains_pattern, text};
use crate::{Database, Result, format_timestamp};

const CATEGORY_COLUMNS: &str = "c.category_id, c.name, c.slug, c.description, c.is_active, c.sort_order";

const AD_EVENT_SELECT: &str = "
    SELECT e.ad_event_id, e.title, e.kind, e.description, e.link, e.banner_image, e.location,
           e.start_date, e.end_date, e.status, e.is_featured, e.created_at, e.updated_at,
           c.category_id, c.name, c.slug, c.description, c.is_active, c.sort_order
    FROM ad_events e
    JOIN ad_event_categories c ON c.category_id = e.category_id";

impl AdOrdering {
    fn column(self) -> &'static str {
        match self {
            AdOrdering::CreatedAt => "e.created_at",
            AdOrdering::StartDate => "e.start_date",
            AdOrdering::EndDate => "e.end_date",
            AdOrdering::Title => "e.title",
        }
    }
}

impl Database {
    // -- Categories --

    pub fn create_ad_category(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        order: i64,
    ) -> Result<AdCategoryRow> {
        self.with_conn(|conn| {
            let id = Uuid::new_v4();
            let now = format_timestamp(Utc::now());
            conn.execute(
                "INSERT INTO ad_event_categories (category_id, name, slug, description, is_active, sort_order, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
                (id.to_string(), name, slug, description, order, &now),
            )?;
            Ok(AdCategoryRow {
                category_id: id,
                name: name.to_string(),
                slug: slug.to_string(),
                description: description.map(str::to_string),
                is_active: true,
                order,
            })
        })
    }

    /// Active categories, optionally filtered by a name or description substring.
    pub fn ad_categories(&self, search: Option<&str>) -> Result<Vec<AdCategoryRow>> {
        let mut filters = Filters::default();
        filters.push("c.is_active = 1", []);
        if let Some(search) = search {
            let pattern = contains_pattern(search);
            filters.push(
                "(c.name LIKE ? ESCAPE '\\' OR c.description LIKE ? ESCAPE '\\')",
                [text(pattern.clone()), text(pattern)],
            );
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM ad_event_categories c {} ORDER BY c.sort_order, c.name",
                CATEGORY_COLUMNS,
                filters.sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(filters.params().iter()), |row| read_category(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn ad_category(&self, category_id: Uuid) -> Result<Option<AdCategoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM ad_event_categories c WHERE c.category_id = ?1",
                CATEGORY_COLUMNS
            );
            Ok(conn
                .query_row(&sql, [category_id.to_string()], |row| read_category(row, 0))
                .optional()?)
        })
    }

    // -- Ads & events --

    pub fn create_ad_event(&self, new: &NewAdEvent) -> Result<()> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            conn.execute(
                "INSERT INTO ad_events (ad_event_id, title, kind, category_id, description, link, banner_image,
                    location, start_date, end_date, status, is_featured, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                rusqlite::params![
                    new.ad_event_id.to_string(),
                    new.title,
                    new.kind.as_str(),
                    new.category_id.to_string(),
                    new.description,
                    new.link,
                    new.banner_image,
                    new.location,
                    new.start_date.map(|d| d.to_string()),
                    new.end_date.map(|d| d.to_string()),
                    new.status.as_str(),
                    new.is_featured,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    pub fn ad_event(&self, ad_event_id: Uuid) -> Result<Option<AdEventRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE e.ad_event_id = ?1", AD_EVENT_SELECT);
            Ok(conn
                .query_row(&sql, [ad_event_id.to_string()], read_ad_event)
                .optional()?)
        })
    }

    pub fn update_ad_event(&self, ad_event_id: Uuid, changes: &AdEventChanges) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE ad_events SET
                    title = COALESCE(?2, title),
                    description = COALESCE(?3, description),
                    link = COALESCE(?4, link),
                    banner_image = COALESCE(?5, banner_image),
                    location = COALESCE(?6, location),
                    start_date = COALESCE(?7, start_date),
                    end_date = COALESCE(?8, end_date),
                    status = COALESCE(?9, status),
                    is_featured = COALESCE(?10, is_featured),
                    updated_at = ?11
                 WHERE ad_event_id = ?1",
                rusqlite::params![
                    ad_event_id.to_string(),
                    changes.title,
                    changes.description,
                    changes.link,
                    changes.banner_image,
                    changes.location,
                    changes.start_date.map(|d| d.to_string()),
                    changes.end_date.map(|d| d.to_string()),
                    changes.status.map(|s| s.as_str()),
                    changes.is_featured,
                    format_timestamp(Utc::now()),
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Items with status `active` matching `query`, with the total before paging.
    pub fn list_ad_events(&self, query: &AdEventQuery, limit: u32, offset: u32) -> Result<(Vec<AdEventRow>, u64)> {
        let mut filters = Filters::default();
        filters.push("e.status = 'active'", []);
        if let Some(kind) = query.kind {
            filters.push("e.kind = ?", [text(kind.as_str())]);
        }
        if let Some(category) = query.category {
            filters.push("e.category_id = ?", [text(category.to_string())]);
        }
        if let Some(slug_or_name) = &query.category_slug_or_name {
            filters.push(
                "(c.slug = ? OR lower(c.name) = lower(?))",
                [text(slug_or_name.as_str()), text(slug_or_name.as_str())],
            );
        }
        if let Some(location) = &query.location {
            filters.push("e.location LIKE ? ESCAPE '\\'", [text(contains_pattern(location))]);
        }
        if let Some(featured) = query.is_featured {
            filters.push(if featured { "e.is_featured = 1" } else { "e.is_featured = 0" }, []);
        }
        if let Some(search) = &query.search {
            let pattern = contains_pattern(search);
            filters.push(
                "(e.title LIKE ? ESCAPE '\\' OR e.description LIKE ? ESCAPE '\\' OR e.location LIKE ? ESCAPE '\\')",
                [text(pattern.clone()), text(pattern.clone()), text(pattern)],
            );
        }
        if let Some(after) = query.starts_after {
            filters.push("e.start_date > ?", [text(after.to_string())]);
        }
        if let Some(day) = query.running_on {
            let day = day.to_string();
            filters.push(
                "(e.start_date IS NULL OR e.start_date <= ?) AND (e.end_date IS NULL OR e.end_date >= ?)",
                [text(day.clone()), text(day)],
            );
        }

        let order = match query.ordering {
            Some((column, desc)) => format!(
                "{} {}, e.created_at DESC",
                column.column(),
                if desc { "DESC" } else { "ASC" }
            ),
            None => "e.created_at DESC".to_string(),
        };

        self.with_conn(|conn| {
            let idx = filters.next_index();
            let sql = format!(
                "{} {} ORDER BY {} LIMIT ?{} OFFSET ?{}",
                AD_EVENT_SELECT,
                filters.sql(),
                order,
                idx,
                idx + 1
            );
            let mut params = filters.params().to_vec();
            params.push(i64::from(limit).into());
            params.push(i64::from(offset).into());

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), read_ad_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let count_sql = format!(
                "SELECT COUNT(*) FROM ad_events e JOIN ad_event_categories c ON c.category_id = e.category_id {}",
                filters.sql()
            );
            let total = conn.query_row(&count_sql, params_from_iter(filters.params().iter()), |row| {
                columns::count(row, 0)
            })?;
            Ok((rows, total))
        })
    }
}

fn read_category(row: &Row<'_>, start: usize) -> rusqlite::Result<AdCategoryRow> {
    Ok(AdCategoryRow {
        category_id: columns::uuid(row, start)?,
        name: row.get(start + 1)?,
        slug: row.get(start + 2)?,
        description: row.get(start + 3)?,
        is_active: row.get(start + 4)?,
        order: row.get(start + 5)?,
    })
}

fn read_ad_event(row: &Row<'_>) -> rusqlite::Result<AdEventRow> {
    Ok(AdEventRow {
        ad_event_id: columns::uuid(row, 0)?,
        title: row.get(1)?,
        kind: columns::choice(row, 2)?,
        description: row.get(3)?,
        link: row.get(4)?,
        banner_image: row.get(5)?,
        location: row.get(6)?,
        start_date: columns::opt_date(row, 7)?,
        end_date: columns::opt_date(row, 8)?,
        status: columns::choice(row, 9)?,
        is_featured: row.get(10)?,
        created_at: columns::ts(row, 11)?,
        updated_at: columns::ts(row, 12)?,
        category: read_category(row, 13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::{AdEventStatus, AdEventType};
    use chrono::{Duration, NaiveDate};

    fn item(
        db: &Database,
        category: Uuid,
        title: &str,
        kind: AdEventType,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        status: AdEventStatus,
    ) -> Uuid {
        let id = Uuid::new_v4();
        db.create_ad_event(&NewAdEvent {
            ad_event_id: id,
            title: title.into(),
            kind,
            category_id: category,
            description: None,
            link: None,
            banner_image: None,
            location: Some("Port Harcourt".into()),
            start_date: start,
            end_date: end,
            status,
            is_featured: false,
        })
        .unwrap();
        id
    }

    #[test]
    fn running_window_allows_open_ends() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_ad_category("Equipment", "equipment", None, 0).unwrap();
        let today = Utc::now().date_naive();
        let yesterday = today - Duration::days(1);
        let tomorrow = today + Duration::days(1);

        use AdEventType::Advertisement as Ad;
        item(&db, cat.category_id, "open", Ad, None, None, AdEventStatus::Active);
        item(&db, cat.category_id, "current", Ad, Some(yesterday), Some(tomorrow), AdEventStatus::Active);
        item(&db, cat.category_id, "ended", Ad, None, Some(yesterday), AdEventStatus::Active);
        item(&db, cat.category_id, "later", Ad, Some(tomorrow), None, AdEventStatus::Active);
        item(&db, cat.category_id, "draft", Ad, None, None, AdEventStatus::Draft);

        let query = AdEventQuery { running_on: Some(today), ..Default::default() };
        let (rows, total) = db.list_ad_events(&query, 20, 0).unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|r| r.is_active_on(today)));

        let (_, all) = db.list_ad_events(&AdEventQuery::default(), 20, 0).unwrap();
        assert_eq!(all, 4);
    }

    #[test]
    fn upcoming_events_soonest_first() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_ad_category("Conferences", "conferences", None, 1).unwrap();
        let today = Utc::now().date_naive();

        use AdEventType::Event;
        item(&db, cat.category_id, "far", Event, Some(today + Duration::days(30)), None, AdEventStatus::Active);
        item(&db, cat.category_id, "near", Event, Some(today + Duration::days(2)), None, AdEventStatus::Active);
        item(&db, cat.category_id, "past", Event, Some(today - Duration::days(2)), None, AdEventStatus::Active);

        let query = AdEventQuery {
            kind: Some(Event),
            starts_after: Some(today),
            ordering: Some((AdOrdering::StartDate, false)),
            ..Default::default()
        };
        let (rows, _) = db.list_ad_events(&query, 20, 0).unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["near", "far"]);
        assert!(rows[0].is_upcoming_on(today));
    }

    #[test]
    fn category_matches_slug_or_name() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_ad_category("Oil Services", "oil-services", Some("rigs"), 0).unwrap();
        item(&db, cat.category_id, "x", AdEventType::Advertisement, None, None, AdEventStatus::Active);

        for key in ["oil-services", "oil services"] {
            let query = AdEventQuery { category_slug_or_name: Some(key.into()), ..Default::default() };
            assert_eq!(db.list_ad_events(&query, 20, 0).unwrap().1, 1, "{}", key);
        }
        assert_eq!(db.ad_categories(Some("rig")).unwrap().len(), 1);
        assert!(db.ad_categories(Some("boats")).unwrap().is_empty());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let db = Database::open_in_memory().unwrap();
        let cat = db.create_ad_category("Jobs", "jobs", None, 0).unwrap();
        let id = item(&db, cat.category_id, "Welder wanted", AdEventType::Advertisement, None, None, AdEventStatus::Active);

        let changes = AdEventChanges { is_featured: Some(true), ..Default::default() };
        assert!(db.update_ad_event(id, &changes).unwrap());
        let row = db.ad_event(id).unwrap().unwrap();
        assert!(row.is_featured);
        assert_eq!(row.title, "Welder wanted");
        assert_eq!(row.location.as_deref(), Some("Port Harcourt"));
        assert!(!db.update_ad_event(Uuid::new_v4(), &changes).unwrap());
    }
}
