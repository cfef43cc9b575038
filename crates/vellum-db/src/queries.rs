use crate::Database;
use crate::models::{EnvelopeRow, IdentityRow, MessageRow};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use uuid::Uuid;
use vellum_types::models::{HistoryCursor, SealedMessage};
use vellum_types::{Envelope, EnvelopeSet, IdentityId, MessageId, RoomId};

impl Database {
    // -- Identities --

    /// Insert an identity. Returns false, leaving the existing row untouched,
    /// if the id is already taken.
    pub fn insert_identity(
        &self,
        id: IdentityId,
        public_key: &str,
        private_key: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO identities (id, public_key, private_key, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id.to_string(), public_key, private_key, encode_time(Utc::now())],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_identity(&self, id: IdentityId) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| query_identity(conn, &id.to_string()))
    }

    // -- Messages --

    /// Store a sealed message and all of its envelopes atomically.
    pub fn insert_message(
        &self,
        id: MessageId,
        room_id: RoomId,
        sender_id: IdentityId,
        timestamp: DateTime<Utc>,
        envelopes: &EnvelopeSet,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, room_id, sender_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.to_string(),
                    room_id.to_string(),
                    sender_id.to_string(),
                    encode_time(timestamp)
                ],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO envelopes (message_id, recipient_id, envelope) VALUES (?1, ?2, ?3)",
                )?;
                for (recipient_id, envelope) in envelopes {
                    stmt.execute(rusqlite::params![
                        id.to_string(),
                        recipient_id.to_string(),
                        envelope.to_bytes()?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// One recipient's view of a room, newest first: only messages sealed
    /// for `recipient_id`, each carrying just that recipient's envelope.
    /// Messages are ordered by `(created_at, id)` so paging with `before`
    /// never skips messages that share a timestamp.
    pub fn get_messages_for(
        &self,
        room_id: RoomId,
        recipient_id: IdentityId,
        limit: u32,
        before: Option<HistoryCursor>,
    ) -> Result<Vec<SealedMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.room_id, m.sender_id, m.created_at, e.recipient_id, e.envelope
                 FROM messages m JOIN envelopes e ON e.message_id = m.id
                 WHERE m.room_id = ?1 AND e.recipient_id = ?2
                   AND (?3 IS NULL
                        OR m.created_at < ?3
                        OR (m.created_at = ?3 AND ?4 IS NOT NULL AND m.id < ?4))
                 ORDER BY m.created_at DESC, m.id DESC LIMIT ?5",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![
                        room_id.to_string(),
                        recipient_id.to_string(),
                        before.map(|c| encode_time(c.timestamp)),
                        before.and_then(|c| c.id).map(|id| id.to_string()),
                        limit
                    ],
                    |row| {
                        Ok((
                            MessageRow {
                                id: row.get(0)?,
                                room_id: row.get(1)?,
                                sender_id: row.get(2)?,
                                created_at: row.get(3)?,
                            },
                            EnvelopeRow {
                                recipient_id: row.get(4)?,
                                envelope: row.get(5)?,
                            },
                        ))
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(message, envelope)| sealed_message(message, vec![envelope]))
                .collect()
        })
    }

    pub fn get_envelope(&self, message_id: MessageId, recipient_id: IdentityId) -> Result<Option<Envelope>> {
        self.with_conn(|conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT envelope FROM envelopes WHERE message_id = ?1 AND recipient_id = ?2",
                    [message_id.to_string(), recipient_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| Envelope::from_bytes(&b).context("stored envelope is corrupt"))
                .transpose()
        })
    }
}

// Fixed-width UTC timestamps so string order matches time order
fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn query_identity(conn: &Connection, id: &str) -> Result<Option<IdentityRow>> {
    conn.query_row(
        "SELECT id, public_key, private_key, created_at FROM identities WHERE id = ?1",
        [id],
        |row| {
            Ok(IdentityRow {
                id: row.get(0)?,
                public_key: row.get(1)?,
                private_key: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

fn sealed_message(row: MessageRow, envelopes: Vec<EnvelopeRow>) -> Result<SealedMessage> {
    let envelopes = envelopes
        .into_iter()
        .map(|e| -> Result<(IdentityId, Envelope)> {
            let recipient = Uuid::parse_str(&e.recipient_id)?;
            let envelope = Envelope::from_bytes(&e.envelope).context("stored envelope is corrupt")?;
            Ok((recipient, envelope))
        })
        .collect::<Result<EnvelopeSet>>()?;

    Ok(SealedMessage {
        id: Uuid::parse_str(&row.id)?,
        room_id: Uuid::parse_str(&row.room_id)?,
        sender_id: Uuid::parse_str(&row.sender_id)?,
        envelopes,
        timestamp: decode_time(&row.created_at)?,
    })
}

/// Helper: turn QueryReturnedNoRows into None
trait OptionalExt<T> {
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
