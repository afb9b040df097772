use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::columns::{self, user_columns};
use crate::models::{AccountRow, NewAccount, UserRef};
use crate::{Database, Result, format_timestamp};

const ACCOUNT_COLUMNS: &str = "id, email, full_name, password, is_staff, is_verified, created_at";

impl Database {
    /// Creates the account together with its empty profile.
    pub fn create_account(&self, new: &NewAccount) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO accounts (id, email, full_name, password, is_staff, is_verified, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    new.id.to_string(),
                    new.email.to_lowercase(),
                    &new.full_name,
                    &new.password_hash,
                    new.is_staff,
                    &now,
                ),
            )?;
            tx.execute(
                "INSERT INTO profiles (profile_id, account_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                (new.profile_id.to_string(), new.id.to_string(), &now),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM accounts WHERE email = ?1", ACCOUNT_COLUMNS);
            Ok(conn
                .query_row(&sql, [email.to_lowercase()], read_account)
                .optional()?)
        })
    }

    pub fn account_by_id(&self, id: Uuid) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
            Ok(conn.query_row(&sql, [id.to_string()], read_account).optional()?)
        })
    }

    pub fn user_ref(&self, id: Uuid) -> Result<Option<UserRef>> {
        self.with_conn(|conn| query_user_ref(conn, id))
    }

    /// Staff-only verification switch. Returns false when the account does not exist.
    pub fn set_verification(
        &self,
        id: Uuid,
        is_verified: Option<bool>,
        badge: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE accounts SET is_verified = COALESCE(?2, is_verified) WHERE id = ?1",
                (id.to_string(), is_verified),
            )?;
            if updated == 0 {
                return Ok(false);
            }
            if let Some(badge) = badge {
                let badge = Some(badge.trim()).filter(|b| !b.is_empty());
                tx.execute(
                    "UPDATE profiles SET badge = ?2, updated_at = ?3 WHERE account_id = ?1",
                    (id.to_string(), badge, format_timestamp(Utc::now())),
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }
}

fn read_account(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: columns::uuid(row, 0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        is_staff: row.get(4)?,
        is_verified: row.get(5)?,
        created_at: columns::ts(row, 6)?,
    })
}

pub(crate) fn query_user_ref(conn: &Connection, id: Uuid) -> Result<Option<UserRef>> {
    let sql = format!(
        "SELECT {} FROM accounts a LEFT JOIN profiles p ON p.account_id = a.id WHERE a.id = ?1",
        user_columns("a", "p")
    );
    Ok(conn
        .query_row(&sql, [id.to_string()], |row| columns::user_ref(row, 0))
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::account;

    #[test]
    fn email_is_unique_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        account(&db, "driller@example.com");

        let err = db
            .create_account(&NewAccount {
                id: Uuid::new_v4(),
                profile_id: Uuid::new_v4(),
                email: "Driller@Example.com".into(),
                full_name: "Other".into(),
                password_hash: "x".into(),
                is_staff: false,
            })
            .unwrap_err();
        assert!(err.is_duplicate());
        assert!(db.account_by_email("DRILLER@example.com").unwrap().is_some());
    }

    #[test]
    fn account_gets_a_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = account(&db, "a@example.com");
        let profile = db.profile_by_account(id).unwrap().unwrap();
        assert_eq!(profile.timezone, "UTC");
        assert_eq!(profile.language_preference, "en");
    }

    #[test]
    fn verification_sets_badge() {
        let db = Database::open_in_memory().unwrap();
        let id = account(&db, "a@example.com");
        assert!(db.set_verification(id, Some(true), Some("gold")).unwrap());
        let user = db.user_ref(id).unwrap().unwrap();
        assert!(user.is_verified);
        assert_eq!(user.badge.as_deref(), Some("gold"));
        assert!(!db.set_verification(Uuid::new_v4(), Some(true), None).unwrap());
    }
}
