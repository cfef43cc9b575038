/// Database row types. These map directly to SQLite rows and are converted
/// into vellum-types models at the query boundary.

pub struct IdentityRow {
    pub id: String,
    pub public_key: String,
    pub private_key: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub created_at: String,
}

pub struct EnvelopeRow {
    pub recipient_id: String,
    /// Binary wire encoding
    pub envelope: Vec<u8>,
}
