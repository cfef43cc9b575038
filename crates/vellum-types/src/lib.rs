//! Shared wire and data types for Vellum.
//!
//! Nothing in here touches plaintext or key material: the relay, the
//! database and the HTTP layer only ever see these types.

pub mod api;
pub mod envelope;
pub mod events;
pub mod models;

pub use envelope::{Envelope, EnvelopeError, EnvelopeSet};
pub use models::{IdentityId, MessageId, RoomId};
