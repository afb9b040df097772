//! Text encodings of the column types SQLite has no native form for.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use crate::models::UserRef;

/// Fixed-width UTC text, so string order is time order.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp {}", raw)))
}

pub(crate) fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("bad timestamp {}", raw))),
        None => Ok(None),
    }
}

pub(crate) fn uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|_| conversion_error(idx, format!("bad uuid {}", raw)))
}

pub(crate) fn opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| conversion_error(idx, format!("bad uuid {}", raw))),
        None => Ok(None),
    }
}

pub(crate) fn opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| conversion_error(idx, format!("bad date {}", raw))),
        None => Ok(None),
    }
}

/// A text column holding one of a closed set of choices.
pub(crate) fn choice<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|_| conversion_error(idx, format!("unexpected value {}", raw)))
}

pub(crate) fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let n: i64 = row.get(idx)?;
    Ok(n.max(0) as u64)
}

/// Column list matching [`user_ref`] for an account alias and its profile alias.
pub(crate) fn user_columns(account: &str, profile: &str) -> String {
    format!(
        "{a}.id, {a}.email, {a}.full_name, {a}.is_verified, {p}.company_name, {p}.profile_picture, {p}.badge",
        a = account,
        p = profile
    )
}

pub(crate) const USER_COLUMN_COUNT: usize = 7;

pub(crate) fn user_ref(row: &Row<'_>, start: usize) -> rusqlite::Result<UserRef> {
    Ok(UserRef {
        id: uuid(row, start)?,
        email: row.get(start + 1)?,
        full_name: row.get(start + 2)?,
        is_verified: row.get(start + 3)?,
        company_name: row.get(start + 4)?,
        profile_picture: row.get(start + 5)?,
        badge: row.get(start + 6)?,
    })
}

/// Like [`user_ref`] for a LEFT JOINed account that may be absent.
pub(crate) fn opt_user_ref(row: &Row<'_>, start: usize) -> rusqlite::Result<Option<UserRef>> {
    if row.get::<_, Option<String>>(start)?.is_none() {
        return Ok(None);
    }
    user_ref(row, start).map(Some)
}

/// Bucket key of a stored timestamp.
pub(crate) fn day(raw: &str) -> Option<NaiveDate> {
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1500);
        let (sa, sb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(sa, "2024-03-09T08:05:00.000000Z");
        assert_eq!(sa.len(), sb.len());
        assert!(sa < sb);
        assert_eq!(parse_timestamp(&sb).unwrap(), b);
    }

    #[test]
    fn legacy_sqlite_format_parses() {
        let dt = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert_eq!(format_timestamp(dt), "2024-01-02T03:04:05.000000Z");
    }

    #[test]
    fn day_bucket() {
        assert_eq!(
            day("2024-03-09T08:05:00.000000Z"),
            NaiveDate::from_ymd_opt(2024, 3, 9)
        );
    }
}
