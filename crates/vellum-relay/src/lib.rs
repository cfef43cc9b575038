//! Ciphertext-only message relay.
//!
//! Accepts sealed envelope sets, persists them and fans each recipient's
//! envelope out to that recipient's live connections. Nothing here can
//! open an envelope: this crate has no access to private keys.

pub mod connection;
pub mod relay;

pub use connection::handle_connection;
pub use relay::{Broadcast, Relay, RelayError};
