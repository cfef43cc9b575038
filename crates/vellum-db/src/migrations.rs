use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS identities (
            id          TEXT PRIMARY KEY,
            public_key  TEXT NOT NULL,
            private_key TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room_id     TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at, id);

        CREATE TABLE IF NOT EXISTS envelopes (
            message_id   TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            recipient_id TEXT NOT NULL,
            envelope     BLOB NOT NULL,
            PRIMARY KEY (message_id, recipient_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
