//! Collaborator traits the services are written against.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use rollcall_common::{Event, ParticipantDoc, Result};

/// The event collection. One document per event aggregate; every write
/// replaces the whole document atomically.
#[async_trait]
pub trait EventCollection: Send + Sync {
    /// Insert a new event. `ConflictError` if the id already exists.
    async fn insert_event(&self, event: &Event) -> Result<()>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>>;

    /// Atomic whole-document replace. `NotFoundError` if the event was
    /// never inserted.
    async fn save_event(&self, event: &Event) -> Result<()>;

    /// Events not yet in a terminal state: the scheduler's working set.
    async fn events_not_terminal(&self) -> Result<Vec<Event>>;

    /// The event owning a given registration id, if any.
    async fn event_by_registration(&self, registration_id: Uuid) -> Result<Option<Event>>;
}

/// The participant collection: reference mirrors only, never authoritative.
#[async_trait]
pub trait ParticipantCollection: Send + Sync {
    async fn get_participant(&self, participant_id: &str) -> Result<Option<ParticipantDoc>>;

    /// Atomic whole-document upsert.
    async fn save_participant(&self, doc: &ParticipantDoc) -> Result<()>;
}

/// Short-TTL mutual exclusion for the registration create path. Guards the
/// existence-check-then-write sequence against the check-then-act race.
#[async_trait]
pub trait RegistrationLock: Send + Sync {
    /// Try to acquire the lock for `key`. Returns `None` when another
    /// holder has it; the caller lost the race.
    async fn acquire(&self, key: &str) -> Result<Option<Box<dyn LockGuard>>>;
}

#[async_trait]
pub trait LockGuard: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

// Arc blankets: let one store instance be shared across services and kept
// for test assertions.

#[async_trait]
impl<S: EventCollection + ?Sized> EventCollection for Arc<S> {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        (**self).insert_event(event).await
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        (**self).get_event(event_id).await
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        (**self).save_event(event).await
    }

    async fn events_not_terminal(&self) -> Result<Vec<Event>> {
        (**self).events_not_terminal().await
    }

    async fn event_by_registration(&self, registration_id: Uuid) -> Result<Option<Event>> {
        (**self).event_by_registration(registration_id).await
    }
}

#[async_trait]
impl<S: ParticipantCollection + ?Sized> ParticipantCollection for Arc<S> {
    async fn get_participant(&self, participant_id: &str) -> Result<Option<ParticipantDoc>> {
        (**self).get_participant(participant_id).await
    }

    async fn save_participant(&self, doc: &ParticipantDoc) -> Result<()> {
        (**self).save_participant(doc).await
    }
}

#[async_trait]
impl<L: RegistrationLock + ?Sized> RegistrationLock for Arc<L> {
    async fn acquire(&self, key: &str) -> Result<Option<Box<dyn LockGuard>>> {
        (**self).acquire(key).await
    }
}
