//! The registration store.
//!
//! Registrations live in two places: the full record under the event
//! aggregate (the single source of truth) and a minimal reference mirror
//! under the participant aggregate for fast "my registrations" reads. The
//! write path is full-record-first; the mirror is best-effort and
//! self-healing: a failed mirror write is queued for retry and repaired
//! the next time that participant's registrations are read.

pub mod registry;

pub use registry::{registration_id_for, RegistrationService};
