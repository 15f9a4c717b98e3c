//! In-memory store and lock for tests and embedded use. No database
//! required. Thread-safe; single-document writes are atomic under the map
//! mutex, matching the guarantees the Postgres store gives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use rollcall_common::{Event, ParticipantDoc, Result, RollcallError};

use crate::traits::{EventCollection, LockGuard, ParticipantCollection, RegistrationLock};

pub struct MemoryStore {
    events: Mutex<HashMap<Uuid, Event>>,
    participants: Mutex<HashMap<String, ParticipantDoc>>,
    fail_participant_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            participants: Mutex::new(HashMap::new()),
            fail_participant_writes: AtomicBool::new(false),
        }
    }

    /// Make participant writes fail with a transient error. Exercises the
    /// mirror-retry and read-repair paths.
    pub fn fail_participant_writes(&self, on: bool) {
        self.fail_participant_writes.store(on, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventCollection for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(&event.event_id) {
            return Err(RollcallError::Conflict(format!(
                "event {} already exists",
                event.event_id
            )));
        }
        events.insert(event.event_id, event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        Ok(self.events.lock().unwrap().get(&event_id).cloned())
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        if !events.contains_key(&event.event_id) {
            return Err(RollcallError::NotFound(format!("event {}", event.event_id)));
        }
        events.insert(event.event_id, event.clone());
        Ok(())
    }

    async fn events_not_terminal(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| !e.status.is_terminal())
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn event_by_registration(&self, registration_id: Uuid) -> Result<Option<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .find(|e| e.registration(registration_id).is_some())
            .cloned())
    }
}

#[async_trait]
impl ParticipantCollection for MemoryStore {
    async fn get_participant(&self, participant_id: &str) -> Result<Option<ParticipantDoc>> {
        Ok(self
            .participants
            .lock()
            .unwrap()
            .get(participant_id)
            .cloned())
    }

    async fn save_participant(&self, doc: &ParticipantDoc) -> Result<()> {
        if self.fail_participant_writes.load(Ordering::SeqCst) {
            return Err(RollcallError::TransientStore(
                "participant write failed".into(),
            ));
        }
        self.participants
            .lock()
            .unwrap()
            .insert(doc.participant_id.clone(), doc.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRegistrationLock
// ---------------------------------------------------------------------------

/// Keyed mutual exclusion with a TTL. Stale entries from holders that never
/// released are evicted on the next acquire, the same way the supervisor
/// cleans up locks left by killed runs.
pub struct MemoryRegistrationLock {
    ttl: Duration,
    held: Arc<Mutex<HashMap<String, Instant>>>,
}

impl MemoryRegistrationLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RegistrationLock for MemoryRegistrationLock {
    async fn acquire(&self, key: &str) -> Result<Option<Box<dyn LockGuard>>> {
        let mut held = self.held.lock().unwrap();
        let now = Instant::now();
        held.retain(|_, expires| *expires > now);

        if held.contains_key(key) {
            return Ok(None);
        }
        held.insert(key.to_string(), now + self.ttl);
        Ok(Some(Box::new(MemoryLockGuard {
            key: key.to_string(),
            held: Arc::clone(&self.held),
        })))
    }
}

struct MemoryLockGuard {
    key: String,
    held: Arc<Mutex<HashMap<String, Instant>>>,
}

#[async_trait]
impl LockGuard for MemoryLockGuard {
    async fn release(self: Box<Self>) -> Result<()> {
        self.held.lock().unwrap().remove(&self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rollcall_common::{
        AttendanceStrategy, CertificateRelease, EventStatus, RegistrationMode, TimeWindows,
    };

    fn make_event(status: EventStatus) -> Event {
        let t = |d, h| Utc.with_ymd_and_hms(2026, 8, d, h, 0, 0).unwrap();
        Event {
            event_id: Uuid::new_v4(),
            title: "Systems Week".into(),
            status,
            windows: TimeWindows {
                registration_start: t(10, 0),
                registration_end: t(14, 0),
                start: t(15, 10),
                end: t(15, 16),
                certificate_end: t(30, 0),
            },
            registration_mode: RegistrationMode::Individual,
            capacity: None,
            pass_threshold: None,
            certificate_release: CertificateRelease::Automatic,
            certificates_released: false,
            sessions: vec![],
            attendance_strategy: AttendanceStrategy::Binary,
            registrations: vec![],
            attendance: vec![],
            created_at: t(1, 0),
            updated_at: t(1, 0),
        }
    }

    #[tokio::test]
    async fn insert_then_fetch_roundtrips() {
        let store = MemoryStore::new();
        let event = make_event(EventStatus::Draft);
        store.insert_event(&event).await.unwrap();
        let fetched = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Systems Week");
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = MemoryStore::new();
        let event = make_event(EventStatus::Draft);
        store.insert_event(&event).await.unwrap();
        let err = store.insert_event(&event).await.unwrap_err();
        assert!(matches!(err, RollcallError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_of_unknown_event_is_not_found() {
        let store = MemoryStore::new();
        let event = make_event(EventStatus::Draft);
        let err = store.save_event(&event).await.unwrap_err();
        assert!(matches!(err, RollcallError::NotFound(_)));
    }

    #[tokio::test]
    async fn terminal_events_excluded_from_working_set() {
        let store = MemoryStore::new();
        store
            .insert_event(&make_event(EventStatus::Ongoing))
            .await
            .unwrap();
        store
            .insert_event(&make_event(EventStatus::Cancelled))
            .await
            .unwrap();
        store
            .insert_event(&make_event(EventStatus::Archived))
            .await
            .unwrap();
        let active = store.events_not_terminal().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, EventStatus::Ongoing);
    }

    #[tokio::test]
    async fn lock_excludes_second_acquirer_until_release() {
        let lock = MemoryRegistrationLock::new(Duration::from_secs(30));
        let guard = lock.acquire("registration:stu-42:ev-7").await.unwrap();
        assert!(guard.is_some());
        assert!(
            lock.acquire("registration:stu-42:ev-7")
                .await
                .unwrap()
                .is_none(),
            "second acquire must lose"
        );
        // Different key is unaffected
        assert!(lock.acquire("registration:stu-43:ev-7").await.unwrap().is_some());

        guard.unwrap().release().await.unwrap();
        assert!(lock.acquire("registration:stu-42:ev-7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_lock_is_evicted() {
        let lock = MemoryRegistrationLock::new(Duration::from_millis(0));
        let _leaked = lock.acquire("k").await.unwrap().unwrap();
        // TTL of zero: the entry is already stale on the next acquire.
        assert!(lock.acquire("k").await.unwrap().is_some());
    }
}
