//! Storage collaborators for the event core.
//!
//! Two logical collections: events (with embedded sessions, registrations,
//! and attendance) and participants (with embedded reference mirrors). The
//! core requires atomic single-document writes, never multi-document
//! transactions. `MemoryStore` backs tests and embedded use; `PgStore` maps
//! each collection to a JSONB document table.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{MemoryRegistrationLock, MemoryStore};
pub use postgres::{PgRegistrationLock, PgStore};
pub use traits::{EventCollection, LockGuard, ParticipantCollection, RegistrationLock};

/// Lock key for the registration create path: one slot per
/// (participant, event) pair.
pub fn registration_lock_key(participant_id: &str, event_id: uuid::Uuid) -> String {
    format!("registration:{participant_id}:{event_id}")
}
