use crate::models::{ChatOverviewRow, FriendRequestRow, MessageCursor, MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, email, name, password, image, is_new_user, created_at";

impl Database {
    // -- Users --

    /// Insert a new account. Returns false when the email is already taken;
    /// the UNIQUE constraint decides, so concurrent sign-ups cannot both win.
    pub fn create_user(&self, id: &str, email: &str, name: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (id, email, name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, name, password_hash),
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Friends --

    pub fn are_friends(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM friends WHERE user_id = ?1 AND friend_id = ?2",
                    (user_id, other_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.email, u.name, u.password, u.image, u.is_new_user, u.created_at
                 FROM friends f
                 JOIN users u ON u.id = f.friend_id
                 WHERE f.user_id = ?1
                 ORDER BY u.name",
            )?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn has_friend_request(&self, sender_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                    (sender_id, receiver_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn create_friend_request(&self, sender_id: &str, receiver_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friend_requests (sender_id, receiver_id) VALUES (?1, ?2)",
                (sender_id, receiver_id),
            )?;
            Ok(())
        })
    }

    /// Returns false when there was no such request.
    pub fn delete_friend_request(&self, sender_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                (sender_id, receiver_id),
            )?;
            Ok(n > 0)
        })
    }

    pub fn incoming_friend_requests(&self, receiver_id: &str) -> Result<Vec<FriendRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.sender_id, u.name, u.email, r.created_at
                 FROM friend_requests r
                 JOIN users u ON u.id = r.sender_id
                 WHERE r.receiver_id = ?1
                 ORDER BY r.created_at DESC",
            )?;
            let rows = stmt
                .query_map([receiver_id], |row| {
                    Ok(FriendRequestRow {
                        sender_id: row.get(0)?,
                        sender_name: row.get(1)?,
                        sender_email: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Consume the request from `sender_id` to `receiver_id` and record the
    /// friendship in both directions, atomically. Returns false when there
    /// was no pending request.
    pub fn accept_friend_request(&self, sender_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                (sender_id, receiver_id),
            )?;
            if removed == 0 {
                return Ok(false);
            }

            // A crossed request in the other direction is settled too.
            tx.execute(
                "DELETE FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                (receiver_id, sender_id),
            )?;

            for (a, b) in [(sender_id, receiver_id), (receiver_id, sender_id)] {
                tx.execute(
                    "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
                    (a, b),
                )?;
            }

            tx.commit()?;
            Ok(true)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, receiver_id, text, created_at, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.text,
                    msg.created_at,
                    msg.seen_at
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first. `before` is exclusive; messages sharing its timestamp
    /// are split by id so a page boundary never skips any.
    pub fn get_messages(&self, chat_id: &str, limit: u32, before: Option<&MessageCursor>) -> Result<Vec<MessageRow>> {
        let (before_at, before_id) = match before {
            Some(c) => (Some(c.created_at.as_str()), c.id.as_deref()),
            None => (None, None),
        };
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, receiver_id, text, created_at, seen_at
                 FROM messages
                 WHERE chat_id = ?1
                   AND (?2 IS NULL OR created_at < ?2 OR (created_at = ?2 AND id < ?3))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![chat_id, before_at, before_id, limit], |row| {
                    message_from_row(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark every unseen message of `chat_id` addressed to `receiver_id` as
    /// seen. Returns how many messages changed.
    pub fn mark_chat_seen(&self, chat_id: &str, receiver_id: &str, seen_at: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET seen_at = ?3
                 WHERE chat_id = ?1 AND receiver_id = ?2 AND seen_at IS NULL",
                (chat_id, receiver_id, seen_at),
            )?;
            Ok(n)
        })
    }

    /// The chat list for `user_id`: every friend with the latest message
    /// exchanged and how many of the friend's messages are still unseen.
    /// Most recent conversations first.
    pub fn chat_overview(&self, user_id: &str) -> Result<Vec<ChatOverviewRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.email, u.name, u.password, u.image, u.is_new_user, u.created_at,
                        lm.id, lm.chat_id, lm.sender_id, lm.receiver_id, lm.text, lm.created_at, lm.seen_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.sender_id = u.id AND m.receiver_id = ?1 AND m.seen_at IS NULL)
                 FROM friends f
                 JOIN users u ON u.id = f.friend_id
                 LEFT JOIN messages lm ON lm.id = (
                     SELECT m.id FROM messages m
                      WHERE (m.sender_id = ?1 AND m.receiver_id = u.id)
                         OR (m.sender_id = u.id AND m.receiver_id = ?1)
                      ORDER BY m.created_at DESC, m.id DESC
                      LIMIT 1)
                 WHERE f.user_id = ?1
                 ORDER BY lm.created_at IS NULL, lm.created_at DESC, u.name",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let last_id: Option<String> = row.get(7)?;
                    let last_message = match last_id {
                        Some(_) => Some(message_from_row(row, 7)?),
                        None => None,
                    };
                    Ok(ChatOverviewRow {
                        friend: user_from_row(row)?,
                        last_message,
                        unseen_count: row.get(14)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id], user_from_row).optional()
}

/// Reads the user columns in `USER_COLUMNS` order starting at index 0.
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        image: row.get(4)?,
        is_new_user: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(offset)?,
        chat_id: row.get(offset + 1)?,
        sender_id: row.get(offset + 2)?,
        receiver_id: row.get(offset + 3)?,
        text: row.get(offset + 4)?,
        created_at: row.get(offset + 5)?,
        seen_at: row.get(offset + 6)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_timestamp;

    fn seed_user(db: &Database, id: &str, name: &str) {
        assert!(db.create_user(id, &format!("{name}@example.com"), name, "hash").unwrap());
    }

    fn message(id: &str, chat: &str, from: &str, to: &str, at: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            chat_id: chat.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            text: format!("msg {id}"),
            created_at: at.into(),
            seen_at: None,
        }
    }

    #[test]
    fn users_round_trip_by_email_and_id() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "amal");

        let by_email = db.get_user_by_email("amal@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, "u1");
        assert!(by_email.is_new_user);
        assert!(db.get_user_by_id("u2").unwrap().is_none());
        assert!(!db.create_user("u3", "amal@example.com", "dup", "h").unwrap());
        assert!(db.get_user_by_id("u3").unwrap().is_none());
    }

    #[test]
    fn accepting_a_request_creates_friendship_both_ways() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a", "amal");
        seed_user(&db, "b", "kasun");

        db.create_friend_request("a", "b").unwrap();
        assert!(db.has_friend_request("a", "b").unwrap());
        assert_eq!(db.incoming_friend_requests("b").unwrap().len(), 1);

        assert!(db.accept_friend_request("a", "b").unwrap());
        assert!(db.are_friends("a", "b").unwrap());
        assert!(db.are_friends("b", "a").unwrap());
        assert!(!db.has_friend_request("a", "b").unwrap());

        // Nothing left to accept.
        assert!(!db.accept_friend_request("a", "b").unwrap());
    }

    #[test]
    fn messages_page_backwards_and_get_marked_seen() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a", "amal");
        seed_user(&db, "b", "kasun");

        db.insert_message(&message("m1", "a--b", "a", "b", "2026-01-01T00:00:01.000Z")).unwrap();
        db.insert_message(&message("m2", "a--b", "b", "a", "2026-01-01T00:00:02.000Z")).unwrap();
        db.insert_message(&message("m3", "a--b", "a", "b", "2026-01-01T00:00:03.000Z")).unwrap();

        let page = db.get_messages("a--b", 2, None).unwrap();
        assert_eq!(page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m3", "m2"]);

        let older = db
            .get_messages("a--b", 2, Some(&MessageCursor::after(&page[1])))
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, "m1");

        assert_eq!(db.mark_chat_seen("a--b", "b", &now_timestamp()).unwrap(), 2);
        assert_eq!(db.mark_chat_seen("a--b", "b", &now_timestamp()).unwrap(), 0);
    }

    #[test]
    fn paging_through_equal_timestamps_loses_nothing() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a", "amal");
        seed_user(&db, "b", "kasun");
        let at = "2026-01-01T00:00:00.000Z";
        for id in ["m1", "m2", "m3"] {
            db.insert_message(&message(id, "a--b", "a", "b", at)).unwrap();
        }

        let first = db.get_messages("a--b", 2, None).unwrap();
        assert_eq!(first.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m3", "m2"]);

        let rest = db
            .get_messages("a--b", 2, Some(&MessageCursor::after(&first[1])))
            .unwrap();
        assert_eq!(rest.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m1"]);

        // Without an id the cursor skips the whole millisecond
        let coarse = MessageCursor {
            created_at: at.into(),
            id: None,
        };
        assert!(db.get_messages("a--b", 2, Some(&coarse)).unwrap().is_empty());
    }

    #[test]
    fn chat_overview_counts_unseen_per_friend() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a", "amal");
        seed_user(&db, "b", "kasun");
        seed_user(&db, "c", "nimal");
        db.create_friend_request("b", "a").unwrap();
        db.accept_friend_request("b", "a").unwrap();
        db.create_friend_request("c", "a").unwrap();
        db.accept_friend_request("c", "a").unwrap();

        db.insert_message(&message("m1", "a--b", "b", "a", "2026-01-01T00:00:01.000Z")).unwrap();
        db.insert_message(&message("m2", "a--b", "b", "a", "2026-01-01T00:00:02.000Z")).unwrap();
        db.insert_message(&message("m3", "a--b", "a", "b", "2026-01-01T00:00:03.000Z")).unwrap();

        let overview = db.chat_overview("a").unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].friend.id, "b");
        assert_eq!(overview[0].unseen_count, 2);
        assert_eq!(overview[0].last_message.as_ref().map(|m| m.id.as_str()), Some("m3"));
        assert_eq!(overview[1].friend.id, "c");
        assert_eq!(overview[1].unseen_count, 0);
        assert!(overview[1].last_message.is_none());
    }
}
