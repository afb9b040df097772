pub mod migrations;
pub mod models;
pub mod queries;

mod columns;

use rusqlite::{Connection, ErrorCode, ffi};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

pub use columns::{format_timestamp, parse_timestamp};

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE or PRIMARY KEY constraint rejected the write.
    #[error("duplicate entry for {constraint}")]
    Duplicate { constraint: String },

    /// A trigger refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("stored value is invalid: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl DbError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DbError::Duplicate { .. })
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                let message = message.clone().unwrap_or_default();
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        let constraint = message
                            .split_once(": ")
                            .map(|(_, columns)| columns.to_string())
                            .unwrap_or(message);
                        return DbError::Duplicate { constraint };
                    }
                    ffi::SQLITE_CONSTRAINT_TRIGGER => return DbError::Rejected(message),
                    _ => {}
                }
            }
        }
        DbError::Sqlite(err)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers outside this process
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    /// Exclusive access, for work that needs a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_classified() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE t (k TEXT UNIQUE);
                     INSERT INTO t VALUES ('a');
                     INSERT INTO t VALUES ('a');",
                )?;
                Ok(())
            })
            .unwrap_err();

        match err {
            DbError::Duplicate { constraint } => assert_eq!(constraint, "t.k"),
            other => panic!("expected duplicate, got {:?}", other),
        }
    }

    #[test]
    fn other_constraints_are_not_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE t (k TEXT NOT NULL);
                     INSERT INTO t VALUES (NULL);",
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(!err.is_duplicate());
    }
}
