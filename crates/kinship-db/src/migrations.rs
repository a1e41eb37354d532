use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            password    TEXT NOT NULL,
            image       TEXT,
            is_new_user INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS user_profiles (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            age             REAL NOT NULL,
            gender          TEXT NOT NULL,
            dob             TEXT NOT NULL,
            height          REAL,
            language        TEXT,
            marital_status  TEXT,
            religion        TEXT,
            ethnicity       TEXT,
            caste           TEXT,
            country         TEXT,
            state           TEXT,
            city            TEXT,
            family_status   TEXT,
            family_type     TEXT,
            family_values   TEXT,
            education       TEXT,
            employed_sector TEXT,
            job_title       TEXT,
            annual_income   REAL,
            profile_image   TEXT,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_profiles_browse
            ON user_profiles(gender, religion, age);

        CREATE TABLE IF NOT EXISTS friend_requests (
            sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (sender_id, receiver_id),
            CHECK (sender_id <> receiver_id)
        );

        CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
            ON friend_requests(receiver_id);

        -- One row per direction so either side lists the friendship cheaply
        CREATE TABLE IF NOT EXISTS friends (
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            friend_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            seen_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unseen
            ON messages(receiver_id, sender_id, seen_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
