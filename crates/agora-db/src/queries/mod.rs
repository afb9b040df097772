mod accounts;
mod ads;
mod chat;
mod news;
mod posts;
mod profiles;
mod reports;

use rusqlite::types::Value;
use uuid::Uuid;

/// Eight upper-case hex characters, the id format of posts and their children.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// Substring pattern for LIKE, with the wildcard characters of the input escaped.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// WHERE clauses and their positional parameters, built up filter by filter.
#[derive(Default)]
pub(crate) struct Filters {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filters {
    /// Adds a clause whose `?` placeholders bind `values` in order.
    pub fn push(&mut self, clause: &str, values: impl IntoIterator<Item = Value>) {
        let mut values = values.into_iter();
        let mut parts = clause.split('?');
        let mut numbered = parts.next().unwrap_or_default().to_string();
        for part in parts {
            if let Some(value) = values.next() {
                self.params.push(value);
                numbered.push_str(&format!("?{}", self.params.len()));
            }
            numbered.push_str(part);
        }
        self.clauses.push(numbered);
    }

    pub fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Next free placeholder number, for LIMIT/OFFSET after the filters.
    pub fn next_index(&self) -> usize {
        self.params.len() + 1
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

pub(crate) fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

#[cfg(test)]
pub(crate) mod testing {
    use uuid::Uuid;

    use crate::Database;
    use crate::models::NewAccount;

    pub fn account(db: &Database, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_account(&NewAccount {
            id,
            profile_id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: "hash".into(),
            is_staff: false,
        })
        .unwrap();
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(contains_pattern(" 50%_off "), "%50\\%\\_off%");
    }

    #[test]
    fn filters_number_placeholders() {
        let mut f = Filters::default();
        f.push("a = ?", [text("x")]);
        f.push("(b LIKE ? OR c LIKE ?)", [text("y"), text("z")]);
        assert_eq!(f.sql(), "WHERE a = ?1 AND (b LIKE ?2 OR c LIKE ?3)");
        assert_eq!(f.next_index(), 4);
    }
}
