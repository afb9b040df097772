use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use uuid::Uuid;

use crate::columns::{self, USER_COLUMN_COUNT, user_columns};
use crate::models::{
    NewReport, ReportCategoryRow, ReportChanges, ReportInsert, ReportQuery, ReportRow,
};
use crate::queries::{Filters, text};
use crate::{Database, DbError, Result, format_timestamp};

/// Attempts at finding a free report id before giving up.
const REPORT_ID_ATTEMPTS: usize = 32;

const CATEGORY_COLUMNS: &str = "k.report_category_id, k.name, k.display_name, k.description";

fn report_select() -> String {
    format!(
        "SELECT r.report_id, r.reason, r.content_type, r.object_id, r.status, r.priority,
                r.reviewed_at, r.action_taken, r.admin_notes, r.created_at, r.updated_at,
                {}, {}, {}
         FROM reports r
         JOIN report_categories k ON k.report_category_id = r.category_id
         JOIN accounts ra ON ra.id = r.reporter_id
         LEFT JOIN profiles rp ON rp.account_id = ra.id
         LEFT JOIN accounts va ON va.id = r.reviewed_by
         LEFT JOIN profiles vp ON vp.account_id = va.id",
        CATEGORY_COLUMNS,
        user_columns("ra", "rp"),
        user_columns("va", "vp")
    )
}

impl Database {
    pub fn report_categories(&self) -> Result<Vec<ReportCategoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM report_categories k WHERE k.is_active = 1 ORDER BY k.display_name",
                CATEGORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| read_category(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn report_category_by_name(&self, name: &str) -> Result<Option<ReportCategoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM report_categories k WHERE k.name = ?1 AND k.is_active = 1",
                CATEGORY_COLUMNS
            );
            Ok(conn
                .query_row(&sql, [name], |row| read_category(row, 0))
                .optional()?)
        })
    }

    /// Files the report, or returns the id of the reporter's earlier report
    /// on the same item. `next_id` is asked again while its ids collide.
    pub fn create_report(
        &self,
        new: &NewReport,
        mut next_id: impl FnMut() -> String,
    ) -> Result<ReportInsert> {
        self.with_conn(|conn| {
            if let Some(existing) = existing_report(conn, new)? {
                return Ok(ReportInsert::AlreadyReported(existing));
            }
            let now = format_timestamp(Utc::now());
            let mut last_err = None;
            for _ in 0..REPORT_ID_ATTEMPTS {
                let report_id = next_id();
                let inserted = conn.execute(
                    "INSERT INTO reports (report_id, reporter_id, category_id, reason, content_type,
                        object_id, status, priority, action_taken, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 1, 'none', ?7, ?7)",
                    (
                        &report_id,
                        new.reporter_id.to_string(),
                        new.category_id.to_string(),
                        &new.reason,
                        new.item_type.as_str(),
                        &new.object_id,
                        &now,
                    ),
                );
                match inserted.map_err(DbError::from) {
                    Ok(_) => return Ok(ReportInsert::Created(report_id)),
                    Err(DbError::Duplicate { constraint }) if constraint == "reports.report_id" => {
                        last_err = Some(DbError::Duplicate { constraint });
                    }
                    Err(err) if err.is_duplicate() => {
                        // Lost a race with the same reporter.
                        return match existing_report(conn, new)? {
                            Some(existing) => Ok(ReportInsert::AlreadyReported(existing)),
                            None => Err(err),
                        };
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(last_err.unwrap_or_else(|| DbError::Corrupt("no report id available".into())))
        })
    }

    pub fn report(&self, report_id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, report_id))
    }

    /// Newest first.
    pub fn list_reports(&self, query: &ReportQuery, limit: u32, offset: u32) -> Result<(Vec<ReportRow>, u64)> {
        let mut filters = Filters::default();
        if let Some(status) = query.status {
            filters.push("r.status = ?", [text(status.as_str())]);
        }
        if let Some(priority) = query.priority {
            filters.push("r.priority = ?", [i64::from(priority).into()]);
        }
        if let Some(category) = &query.category {
            filters.push("k.name = ?", [text(category.as_str())]);
        }
        if let Some(item_type) = query.item_type {
            filters.push("r.content_type = ?", [text(item_type.as_str())]);
        }

        self.with_conn(|conn| {
            let idx = filters.next_index();
            let sql = format!(
                "{} {} ORDER BY r.created_at DESC LIMIT ?{} OFFSET ?{}",
                report_select(),
                filters.sql(),
                idx,
                idx + 1
            );
            let mut params = filters.params().to_vec();
            params.push(i64::from(limit).into());
            params.push(i64::from(offset).into());

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), read_report)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let count_sql = format!(
                "SELECT COUNT(*) FROM reports r
                 JOIN report_categories k ON k.report_category_id = r.category_id {}",
                filters.sql()
            );
            let total = conn.query_row(&count_sql, params_from_iter(filters.params().iter()), |row| {
                columns::count(row, 0)
            })?;
            Ok((rows, total))
        })
    }

    /// Applies a staff review. Moving to a final status records the reviewer
    /// and the review time.
    pub fn update_report(
        &self,
        report_id: &str,
        changes: &ReportChanges,
        reviewer: Uuid,
    ) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            let is_final = changes.status.is_some_and(|s| s.is_final());
            let updated = conn.execute(
                "UPDATE reports SET
                    status = COALESCE(?2, status),
                    action_taken = COALESCE(?3, action_taken),
                    admin_notes = COALESCE(?4, admin_notes),
                    priority = COALESCE(?5, priority),
                    reviewed_by = CASE WHEN ?6 THEN ?7 ELSE reviewed_by END,
                    reviewed_at = CASE WHEN ?6 THEN ?8 ELSE reviewed_at END,
                    updated_at = ?8
                 WHERE report_id = ?1",
                rusqlite::params![
                    report_id,
                    changes.status.map(|s| s.as_str()),
                    changes.action_taken.map(|a| a.as_str()),
                    changes.admin_notes,
                    changes.priority,
                    is_final,
                    reviewer.to_string(),
                    now,
                ],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_report(conn, report_id)
        })
    }
}

fn existing_report(conn: &Connection, new: &NewReport) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT report_id FROM reports WHERE reporter_id = ?1 AND content_type = ?2 AND object_id = ?3",
            (new.reporter_id.to_string(), new.item_type.as_str(), &new.object_id),
            |row| row.get(0),
        )
        .optional()?)
}

fn read_category(row: &Row<'_>, start: usize) -> rusqlite::Result<ReportCategoryRow> {
    Ok(ReportCategoryRow {
        report_category_id: columns::uuid(row, start)?,
        name: row.get(start + 1)?,
        display_name: row.get(start + 2)?,
        description: row.get(start + 3)?,
    })
}

fn read_report(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        report_id: row.get(0)?,
        reason: row.get(1)?,
        item_type: columns::choice(row, 2)?,
        object_id: row.get(3)?,
        status: columns::choice(row, 4)?,
        priority: row.get(5)?,
        reviewed_at: columns::opt_ts(row, 6)?,
        action_taken: columns::choice(row, 7)?,
        admin_notes: row.get(8)?,
        created_at: columns::ts(row, 9)?,
        updated_at: columns::ts(row, 10)?,
        category: read_category(row, 11)?,
        reporter: columns::user_ref(row, 15)?,
        reviewed_by: columns::opt_user_ref(row, 15 + USER_COLUMN_COUNT)?,
    })
}

fn query_report(conn: &Connection, report_id: &str) -> Result<Option<ReportRow>> {
    let sql = format!("{} WHERE r.report_id = ?1", report_select());
    Ok(conn.query_row(&sql, [report_id], read_report).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::{ReportAction, ReportStatus, ReportedItemType};
    use crate::queries::testing::account;

    fn new_report(db: &Database, reporter: Uuid, object_id: &str) -> NewReport {
        let spam = db.report_category_by_name("spam").unwrap().unwrap();
        NewReport {
            reporter_id: reporter,
            category_id: spam.report_category_id,
            reason: "Same listing posted ten times".into(),
            item_type: ReportedItemType::Post,
            object_id: object_id.into(),
        }
    }

    #[test]
    fn seeded_categories_are_listed() {
        let db = Database::open_in_memory().unwrap();
        let names: Vec<_> = db.report_categories().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names.len(), 12);
        assert!(names.contains(&"illegal_goods".to_string()));
        assert!(db.report_category_by_name("nope").unwrap().is_none());
    }

    #[test]
    fn second_report_returns_the_first() {
        let db = Database::open_in_memory().unwrap();
        let reporter = account(&db, "r@example.com");
        let new = new_report(&db, reporter, "ABCD1234");

        let first = db.create_report(&new, || "LST-101".into()).unwrap();
        assert_eq!(first, ReportInsert::Created("LST-101".into()));
        let again = db.create_report(&new, || "LST-102".into()).unwrap();
        assert_eq!(again, ReportInsert::AlreadyReported("LST-101".into()));
    }

    #[test]
    fn colliding_ids_are_regenerated() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        db.create_report(&new_report(&db, a, "P1"), || "LST-500".into()).unwrap();

        let mut ids = vec!["LST-501".to_string(), "LST-500".to_string()];
        let created = db.create_report(&new_report(&db, b, "P1"), || ids.pop().unwrap()).unwrap();
        assert_eq!(created, ReportInsert::Created("LST-501".into()));
    }

    #[test]
    fn resolving_stamps_the_reviewer() {
        let db = Database::open_in_memory().unwrap();
        let reporter = account(&db, "r@example.com");
        let staff = account(&db, "staff@example.com");
        db.create_report(&new_report(&db, reporter, "P1"), || "LST-111".into()).unwrap();

        let triage = ReportChanges { status: Some(ReportStatus::UnderReview), priority: Some(3), ..Default::default() };
        let row = db.update_report("LST-111", &triage, staff).unwrap().unwrap();
        assert_eq!(row.priority, 3);
        assert!(row.reviewed_by.is_none());

        let resolve = ReportChanges {
            status: Some(ReportStatus::Resolved),
            action_taken: Some(ReportAction::ContentRemoval),
            ..Default::default()
        };
        let row = db.update_report("LST-111", &resolve, staff).unwrap().unwrap();
        assert_eq!(row.reviewed_by.unwrap().id, staff);
        assert!(row.reviewed_at.is_some());
        assert_eq!(row.action_taken, ReportAction::ContentRemoval);
        assert_eq!(row.priority, 3);

        let filter = ReportQuery { status: Some(ReportStatus::Resolved), ..Default::default() };
        assert_eq!(db.list_reports(&filter, 20, 0).unwrap().1, 1);
        let filter = ReportQuery { category: Some("fraud".into()), ..Default::default() };
        assert_eq!(db.list_reports(&filter, 20, 0).unwrap().1, 0);
        assert!(db.update_report("LST-999", &resolve, staff).unwrap().is_none());
    }
}
