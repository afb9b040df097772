use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use uuid::Uuid;

use agora_types::models::{PresenceStatus, ReactionKind};

use crate::columns::{self, user_columns};
use crate::models::{
    Attachment, ConversationRow, MessageRow, NewConversation, NewMessage, ParticipantRow,
    ReactionRow, ReadRow, UserStatusRow,
};
use crate::{Database, Result, format_timestamp};

const CONVERSATION_COLUMNS: &str =
    "c.conversation_id, c.name, c.is_group, c.created_by, c.encryption_key, c.created_at, c.updated_at";

fn message_select() -> String {
    format!(
        "SELECT m.message_id, m.conversation_id, m.content, m.timestamp, m.message_type,
                m.attachment, m.file_name, m.file_size, m.file_mime_type, m.is_compressed,
                m.original_file_size, m.is_edited, m.edited_at, m.is_deleted, m.reply_to, {}
         FROM messages m
         JOIN accounts a ON a.id = m.sender_id
         LEFT JOIN profiles p ON p.account_id = a.id",
        user_columns("a", "p")
    )
}

/// `?N, ?N+1, ...` for an IN list starting at placeholder `first`.
fn placeholders(first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    // -- Conversations --

    pub fn create_conversation(&self, new: &NewConversation) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (conversation_id, name, is_group, created_by, encryption_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                (
                    new.conversation_id.to_string(),
                    &new.name,
                    new.is_group,
                    new.created_by.to_string(),
                    &new.encryption_key,
                    &now,
                ),
            )?;
            for user in &new.participants {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, account_id, joined_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(conversation_id, account_id) DO NOTHING",
                    (new.conversation_id.to_string(), user.to_string(), &now),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// The 1:1 conversation between `user` and `other` that `user` has not hidden.
    pub fn find_direct_conversation(&self, user: Uuid, other: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT c.conversation_id FROM conversations c
                     WHERE c.is_group = 0
                       AND EXISTS (SELECT 1 FROM conversation_participants
                                   WHERE conversation_id = c.conversation_id AND account_id = ?1)
                       AND EXISTS (SELECT 1 FROM conversation_participants
                                   WHERE conversation_id = c.conversation_id AND account_id = ?2)
                       AND (SELECT COUNT(*) FROM conversation_participants
                            WHERE conversation_id = c.conversation_id) = 2
                       AND NOT EXISTS (SELECT 1 FROM conversation_deletions
                                       WHERE conversation_id = c.conversation_id AND user_id = ?1)
                     ORDER BY c.updated_at DESC LIMIT 1",
                    (user.to_string(), other.to_string()),
                    |row| row.get(0),
                )
                .optional()?;
            id.map(|raw| raw.parse().map_err(|_| crate::DbError::Corrupt(raw)))
                .transpose()
        })
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations c WHERE c.conversation_id = ?1",
                CONVERSATION_COLUMNS
            );
            Ok(conn
                .query_row(&sql, [conversation_id.to_string()], read_conversation)
                .optional()?)
        })
    }

    /// Conversations of `user` that `user` has not hidden, most recently active first.
    pub fn conversations_for(&self, user: Uuid) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.conversation_id
                 WHERE cp.account_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM conversation_deletions d
                                   WHERE d.conversation_id = c.conversation_id AND d.user_id = ?1)
                 ORDER BY c.updated_at DESC",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user.to_string()], read_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn visible_conversation_ids(&self, user: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .conversations_for(user)?
            .into_iter()
            .map(|c| c.conversation_id)
            .collect())
    }

    pub fn is_participant(&self, conversation_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM conversation_participants
                               WHERE conversation_id = ?1 AND account_id = ?2)",
                (conversation_id.to_string(), user.to_string()),
                |row| row.get(0),
            )?)
        })
    }

    /// Participants with their presence; users who never reported one are offline.
    pub fn participants(&self, conversation_id: Uuid) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, COALESCE(s.status, 'offline'), s.last_seen
                 FROM conversation_participants cp
                 JOIN accounts a ON a.id = cp.account_id
                 LEFT JOIN profiles p ON p.account_id = a.id
                 LEFT JOIN user_statuses s ON s.user_id = a.id
                 WHERE cp.conversation_id = ?1
                 ORDER BY cp.joined_at, a.full_name",
                user_columns("a", "p")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id.to_string()], |row| {
                    Ok(ParticipantRow {
                        user: columns::user_ref(row, 0)?,
                        status: columns::choice(row, columns::USER_COLUMN_COUNT)?,
                        last_seen: columns::opt_ts(row, columns::USER_COLUMN_COUNT + 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn participant_ids(&self, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_participant_ids(conn, conversation_id))
    }

    pub fn rename_conversation(&self, conversation_id: Uuid, name: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET name = ?2, updated_at = ?3 WHERE conversation_id = ?1",
                (conversation_id.to_string(), name, format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    /// Hides the conversation for `user`. False when it was already hidden.
    pub fn hide_conversation(&self, conversation_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO conversation_deletions (conversation_id, user_id, deleted_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id, user_id) DO NOTHING",
                (conversation_id.to_string(), user.to_string(), format_timestamp(Utc::now())),
            )?;
            Ok(inserted == 1)
        })
    }

    /// False when the conversation was not hidden for `user`.
    pub fn unhide_conversation(&self, conversation_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM conversation_deletions WHERE conversation_id = ?1 AND user_id = ?2",
                (conversation_id.to_string(), user.to_string()),
            )?;
            Ok(removed > 0)
        })
    }

    /// Removes the conversation for everyone, messages included.
    pub fn delete_conversation(&self, conversation_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM conversations WHERE conversation_id = ?1",
                [conversation_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Adds the users that are not yet participants and returns them.
    pub fn add_participants(&self, conversation_id: Uuid, users: &[Uuid]) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            let mut added = Vec::new();
            for user in users {
                let inserted = tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, account_id, joined_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(conversation_id, account_id) DO NOTHING",
                    (conversation_id.to_string(), user.to_string(), &now),
                )?;
                if inserted == 1 {
                    added.push(*user);
                }
            }
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE conversation_id = ?1",
                (conversation_id.to_string(), &now),
            )?;
            tx.commit()?;
            Ok(added)
        })
    }

    /// Returns the users that were actually removed.
    pub fn remove_participants(&self, conversation_id: Uuid, users: &[Uuid]) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = Vec::new();
            for user in users {
                let n = tx.execute(
                    "DELETE FROM conversation_participants WHERE conversation_id = ?1 AND account_id = ?2",
                    (conversation_id.to_string(), user.to_string()),
                )?;
                if n > 0 {
                    removed.push(*user);
                }
            }
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE conversation_id = ?1",
                (conversation_id.to_string(), format_timestamp(Utc::now())),
            )?;
            tx.commit()?;
            Ok(removed)
        })
    }

    // -- Messages --

    /// Stores the message, bumps the conversation and clears the sender's typing state.
    pub fn insert_message(&self, new: &NewMessage) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let now = format_timestamp(Utc::now());
            let tx = conn.transaction()?;
            let attachment = new.attachment.as_ref();
            tx.execute(
                "INSERT INTO messages (message_id, conversation_id, sender_id, content, timestamp,
                    message_type, attachment, file_name, file_size, file_mime_type, is_compressed,
                    original_file_size, reply_to)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    new.message_id.to_string(),
                    new.conversation_id.to_string(),
                    new.sender_id.to_string(),
                    new.content,
                    now,
                    new.message_type.as_str(),
                    attachment.map(|a| a.path.as_str()),
                    attachment.map(|a| a.file_name.as_str()),
                    attachment.map(|a| a.file_size as i64),
                    attachment.map(|a| a.mime_type.as_str()),
                    attachment.is_some_and(|a| a.is_compressed),
                    attachment.map(|a| a.original_file_size as i64),
                    new.reply_to.map(|r| r.to_string()),
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE conversation_id = ?1",
                (new.conversation_id.to_string(), &now),
            )?;
            tx.execute(
                "UPDATE user_statuses SET typing_in = NULL, typing_started_at = NULL WHERE user_id = ?1",
                [new.sender_id.to_string()],
            )?;
            let row = query_message(&tx, new.message_id)?
                .ok_or_else(|| crate::DbError::Corrupt(format!("message {} vanished", new.message_id)))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn message(&self, message_id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, message_id))
    }

    /// Messages the viewer has not hidden, newest first, with the total.
    pub fn messages_for(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<MessageRow>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.conversation_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM message_deletions d
                                   WHERE d.message_id = m.message_id AND d.user_id = ?2)
                 ORDER BY m.timestamp DESC LIMIT ?3 OFFSET ?4",
                message_select()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    (conversation_id.to_string(), viewer.to_string(), limit, offset),
                    read_message,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let total = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM message_deletions d
                                   WHERE d.message_id = m.message_id AND d.user_id = ?2)",
                (conversation_id.to_string(), viewer.to_string()),
                |row| columns::count(row, 0),
            )?;
            Ok((rows, total))
        })
    }

    pub fn last_visible_message(&self, conversation_id: Uuid, viewer: Uuid) -> Result<Option<MessageRow>> {
        Ok(self.messages_for(conversation_id, viewer, 1, 0)?.0.pop())
    }

    /// Messages from others, not hidden, sent after the newest message
    /// `viewer` has a read receipt for in this conversation.
    pub fn unread_count(&self, conversation_id: Uuid, viewer: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = ?1 AND m.sender_id <> ?2
                   AND NOT EXISTS (SELECT 1 FROM message_deletions d
                                   WHERE d.message_id = m.message_id AND d.user_id = ?2)
                   AND m.timestamp > COALESCE(
                       (SELECT MAX(rm.timestamp) FROM message_read_statuses r
                        JOIN messages rm ON rm.message_id = r.message_id
                        WHERE rm.conversation_id = ?1 AND r.user_id = ?2),
                       '')",
                (conversation_id.to_string(), viewer.to_string()),
                |row| columns::count(row, 0),
            )?)
        })
    }

    /// Replaces the sealed content and marks the message edited.
    pub fn edit_message(&self, message_id: Uuid, content: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET content = ?2, is_edited = 1, edited_at = ?3 WHERE message_id = ?1",
                (message_id.to_string(), content, format_timestamp(Utc::now())),
            )?;
            query_message(conn, message_id)
        })
    }

    /// Hides the message for `user`. False when it was already hidden.
    pub fn hide_message(&self, message_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO message_deletions (message_id, user_id, deleted_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO NOTHING",
                (message_id.to_string(), user.to_string(), format_timestamp(Utc::now())),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn unhide_message(&self, message_id: Uuid, user: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM message_deletions WHERE message_id = ?1 AND user_id = ?2",
                (message_id.to_string(), user.to_string()),
            )?;
            Ok(removed > 0)
        })
    }

    /// Records (or refreshes) a read receipt and returns its time.
    pub fn mark_read(&self, message_id: Uuid, user: Uuid) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO message_read_statuses (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET read_at = excluded.read_at",
                (message_id.to_string(), user.to_string(), format_timestamp(now)),
            )?;
            Ok(now)
        })
    }

    pub fn read_receipts(&self, message_ids: &[Uuid]) -> Result<Vec<ReadRow>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id, read_at FROM message_read_statuses
                 WHERE message_id IN ({}) ORDER BY read_at",
                placeholders(1, message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids.iter().map(|id| id.to_string())), |row| {
                    Ok(ReadRow {
                        message_id: columns::uuid(row, 0)?,
                        user_id: columns::uuid(row, 1)?,
                        read_at: columns::ts(row, 2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Adds the reaction, or removes it when present. Returns true when added.
    pub fn toggle_message_reaction(&self, message_id: Uuid, user: Uuid, reaction: ReactionKind) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND reaction = ?3",
                (message_id.to_string(), user.to_string(), reaction.as_str()),
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO message_reactions (reaction_id, message_id, user_id, reaction, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    (
                        Uuid::new_v4().to_string(),
                        message_id.to_string(),
                        user.to_string(),
                        reaction.as_str(),
                        format_timestamp(Utc::now()),
                    ),
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn reactions_for(&self, message_ids: &[Uuid]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id, reaction FROM message_reactions
                 WHERE message_id IN ({}) ORDER BY created_at",
                placeholders(1, message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(message_ids.iter().map(|id| id.to_string())), |row| {
                    Ok(ReactionRow {
                        message_id: columns::uuid(row, 0)?,
                        user_id: columns::uuid(row, 1)?,
                        reaction: columns::choice(row, 2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // -- Presence --

    /// Sets or clears the conversation `user` is typing in.
    pub fn set_typing(&self, user: Uuid, conversation_id: Option<Uuid>) -> Result<()> {
        self.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            let typing_at = conversation_id.map(|_| now.clone());
            conn.execute(
                "INSERT INTO user_statuses (user_id, status, last_seen, typing_in, typing_started_at)
                 VALUES (?1, 'online', ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    typing_in = excluded.typing_in,
                    typing_started_at = excluded.typing_started_at,
                    last_seen = excluded.last_seen",
                (user.to_string(), &now, conversation_id.map(|c| c.to_string()), typing_at),
            )?;
            Ok(())
        })
    }

    pub fn set_status(&self, user: Uuid, status: PresenceStatus) -> Result<UserStatusRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_statuses (user_id, status, last_seen)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET status = excluded.status, last_seen = excluded.last_seen",
                (user.to_string(), status.as_str(), format_timestamp(Utc::now())),
            )?;
            query_status(conn, user)?
                .ok_or_else(|| crate::DbError::Corrupt(format!("status of {} vanished", user)))
        })
    }

    pub fn user_status(&self, user: Uuid) -> Result<Option<UserStatusRow>> {
        self.with_conn(|conn| query_status(conn, user))
    }
}

fn read_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        conversation_id: columns::uuid(row, 0)?,
        name: row.get(1)?,
        is_group: row.get(2)?,
        created_by: columns::opt_uuid(row, 3)?,
        encryption_key: row.get(4)?,
        created_at: columns::ts(row, 5)?,
        updated_at: columns::ts(row, 6)?,
    })
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let attachment = match row.get::<_, Option<String>>(5)? {
        Some(path) => Some(Attachment {
            path,
            file_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            file_size: row.get::<_, Option<i64>>(7)?.unwrap_or(0).max(0) as u64,
            mime_type: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            is_compressed: row.get(9)?,
            original_file_size: row.get::<_, Option<i64>>(10)?.unwrap_or(0).max(0) as u64,
        }),
        None => None,
    };
    Ok(MessageRow {
        message_id: columns::uuid(row, 0)?,
        conversation_id: columns::uuid(row, 1)?,
        content: row.get(2)?,
        timestamp: columns::ts(row, 3)?,
        message_type: columns::choice(row, 4)?,
        attachment,
        is_edited: row.get(11)?,
        edited_at: columns::opt_ts(row, 12)?,
        is_deleted: row.get(13)?,
        reply_to: columns::opt_uuid(row, 14)?,
        sender: columns::user_ref(row, 15)?,
    })
}

fn query_message(conn: &Connection, message_id: Uuid) -> Result<Option<MessageRow>> {
    let sql = format!("{} WHERE m.message_id = ?1", message_select());
    Ok(conn
        .query_row(&sql, [message_id.to_string()], read_message)
        .optional()?)
}

fn query_participant_ids(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT account_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY joined_at",
    )?;
    let rows = stmt
        .query_map([conversation_id.to_string()], |row| columns::uuid(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn query_status(conn: &Connection, user: Uuid) -> Result<Option<UserStatusRow>> {
    Ok(conn
        .query_row(
            "SELECT user_id, status, last_seen, typing_in, typing_started_at
             FROM user_statuses WHERE user_id = ?1",
            [user.to_string()],
            |row| {
                Ok(UserStatusRow {
                    user_id: columns::uuid(row, 0)?,
                    status: columns::choice(row, 1)?,
                    last_seen: columns::ts(row, 2)?,
                    typing_in: columns::opt_uuid(row, 3)?,
                    typing_started_at: columns::opt_ts(row, 4)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::MessageType;
    use crate::queries::testing::account;

    fn conversation(db: &Database, creator: Uuid, others: &[Uuid], is_group: bool) -> Uuid {
        let id = Uuid::new_v4();
        let mut participants = vec![creator];
        participants.extend_from_slice(others);
        db.create_conversation(&NewConversation {
            conversation_id: id,
            name: None,
            is_group,
            created_by: creator,
            encryption_key: "k".into(),
            participants,
        })
        .unwrap();
        id
    }

    fn send(db: &Database, conversation_id: Uuid, sender: Uuid) -> MessageRow {
        db.insert_message(&NewMessage {
            message_id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender,
            content: Some("sealed".into()),
            message_type: MessageType::Text,
            attachment: None,
            reply_to: None,
        })
        .unwrap()
    }

    #[test]
    fn direct_conversation_lookup_skips_hidden() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let c = account(&db, "c@example.com");
        let direct = conversation(&db, a, &[b], false);
        conversation(&db, a, &[b, c], true);

        assert_eq!(db.find_direct_conversation(a, b).unwrap(), Some(direct));
        assert_eq!(db.find_direct_conversation(b, a).unwrap(), Some(direct));
        assert_eq!(db.find_direct_conversation(a, c).unwrap(), None);

        assert!(db.hide_conversation(direct, a).unwrap());
        assert!(!db.hide_conversation(direct, a).unwrap());
        assert_eq!(db.find_direct_conversation(a, b).unwrap(), None);
        assert_eq!(db.find_direct_conversation(b, a).unwrap(), Some(direct));
        assert_eq!(db.conversations_for(a).unwrap().len(), 1);

        assert!(db.unhide_conversation(direct, a).unwrap());
        assert!(!db.unhide_conversation(direct, a).unwrap());
        assert_eq!(db.conversations_for(a).unwrap().len(), 2);
    }

    #[test]
    fn hidden_messages_are_per_viewer() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let conv = conversation(&db, a, &[b], false);
        let first = send(&db, conv, a);
        send(&db, conv, b);

        assert!(db.hide_message(first.message_id, b).unwrap());
        assert!(!db.hide_message(first.message_id, b).unwrap());
        assert_eq!(db.messages_for(conv, b, 20, 0).unwrap().1, 1);
        assert_eq!(db.messages_for(conv, a, 20, 0).unwrap().1, 2);

        assert!(db.unhide_message(first.message_id, b).unwrap());
        assert_eq!(db.messages_for(conv, b, 20, 0).unwrap().1, 2);
    }

    #[test]
    fn unread_counts_ignore_own_and_read() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let conv = conversation(&db, a, &[b], false);
        send(&db, conv, a);
        let second = send(&db, conv, a);
        send(&db, conv, b);

        assert_eq!(db.unread_count(conv, b).unwrap(), 2);
        assert_eq!(db.unread_count(conv, a).unwrap(), 1);

        db.mark_read(second.message_id, b).unwrap();
        db.mark_read(second.message_id, b).unwrap();
        assert_eq!(db.unread_count(conv, b).unwrap(), 0);
        assert_eq!(db.read_receipts(&[second.message_id]).unwrap().len(), 1);
    }

    #[test]
    fn reading_the_latest_message_clears_the_thread() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let conv = conversation(&db, a, &[b], false);
        for _ in 0..3 {
            send(&db, conv, a);
        }
        assert_eq!(db.unread_count(conv, b).unwrap(), 3);

        let latest = db.last_visible_message(conv, b).unwrap().unwrap();
        db.mark_read(latest.message_id, b).unwrap();
        assert_eq!(db.unread_count(conv, b).unwrap(), 0);

        std::thread::sleep(std::time::Duration::from_millis(2));
        send(&db, conv, a);
        assert_eq!(db.unread_count(conv, b).unwrap(), 1);
    }

    #[test]
    fn reaction_toggle_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let conv = conversation(&db, a, &[b], false);
        let msg = send(&db, conv, a);

        assert!(db.toggle_message_reaction(msg.message_id, b, ReactionKind::Love).unwrap());
        assert!(db.toggle_message_reaction(msg.message_id, b, ReactionKind::Like).unwrap());
        assert_eq!(db.reactions_for(&[msg.message_id]).unwrap().len(), 2);
        assert!(!db.toggle_message_reaction(msg.message_id, b, ReactionKind::Love).unwrap());
        let left = db.reactions_for(&[msg.message_id]).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].reaction, ReactionKind::Like);
    }

    #[test]
    fn sending_clears_typing_and_edit_marks_message() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let conv = conversation(&db, a, &[b], false);

        db.set_typing(a, Some(conv)).unwrap();
        assert_eq!(db.user_status(a).unwrap().unwrap().typing_in, Some(conv));
        let msg = send(&db, conv, a);
        assert_eq!(db.user_status(a).unwrap().unwrap().typing_in, None);

        let edited = db.edit_message(msg.message_id, "resealed").unwrap().unwrap();
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.content.as_deref(), Some("resealed"));
    }

    #[test]
    fn participants_and_presence() {
        let db = Database::open_in_memory().unwrap();
        let a = account(&db, "a@example.com");
        let b = account(&db, "b@example.com");
        let c = account(&db, "c@example.com");
        let conv = conversation(&db, a, &[b], true);

        db.set_status(b, PresenceStatus::Busy).unwrap();
        let people = db.participants(conv).unwrap();
        let status_of = |id: Uuid| people.iter().find(|p| p.user.id == id).unwrap().status;
        assert_eq!(status_of(a), PresenceStatus::Offline);
        assert_eq!(status_of(b), PresenceStatus::Busy);

        assert_eq!(db.add_participants(conv, &[b, c]).unwrap(), vec![c]);
        assert!(db.is_participant(conv, c).unwrap());
        assert_eq!(db.remove_participants(conv, &[c, c]).unwrap(), vec![c]);
        assert_eq!(db.participant_ids(conv).unwrap().len(), 2);

        db.delete_conversation(conv).unwrap();
        assert!(db.conversation(conv).unwrap().is_none());
    }
}
