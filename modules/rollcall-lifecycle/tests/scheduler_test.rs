//! Scheduler behavior against the in-memory store: catch-up replay,
//! notification ordering, and per-event failure isolation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use rollcall_common::{
    CertificateRelease, Clock, Event, EventStatus, ManualClock, RegistrationMode, Result,
    RollcallError, SessionKind,
};
use rollcall_lifecycle::notify::MemoryBackend;
use rollcall_lifecycle::{EventAdmin, EventDraft, LifecycleScheduler, SessionDraft};
use rollcall_store::{EventCollection, MemoryStore};

fn t(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
}

fn draft(release: CertificateRelease) -> EventDraft {
    EventDraft {
        title: "Systems Week".into(),
        windows: rollcall_common::TimeWindows {
            registration_start: t(10, 0),
            registration_end: t(14, 0),
            start: t(15, 10),
            end: t(15, 16),
            certificate_end: t(30, 0),
        },
        registration_mode: RegistrationMode::Individual,
        capacity: None,
        pass_threshold: None,
        certificate_release: release,
        sessions: vec![SessionDraft {
            title: "Plenary".into(),
            kind: SessionKind::Lecture,
            weight: 1.0,
            mandatory: false,
            starts_at: t(15, 10),
            ends_at: t(15, 16),
        }],
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryBackend>,
    clock: Arc<ManualClock>,
    admin: EventAdmin,
    scheduler: LifecycleScheduler,
}

fn fixture(start: DateTime<Utc>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::new(start));
    let admin = EventAdmin::new(
        store.clone(),
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
    );
    let scheduler = LifecycleScheduler::new(
        store.clone(),
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
        Duration::from_secs(60),
    );
    Fixture {
        store,
        notifier,
        clock,
        admin,
        scheduler,
    }
}

fn transitions_of(notifier: &MemoryBackend, event_id: Uuid) -> Vec<(EventStatus, EventStatus)> {
    notifier
        .status_changes()
        .iter()
        .filter(|c| c.event_id == event_id)
        .map(|c| (c.from, c.to))
        .collect()
}

#[tokio::test]
async fn tick_opens_registration_when_the_window_does() {
    let fx = fixture(t(9, 0));
    let event = fx.admin.create_event(draft(CertificateRelease::Automatic)).await.unwrap();
    fx.admin.publish(event.event_id).await.unwrap();

    fx.clock.set(t(12, 0));
    let stats = fx.scheduler.tick().await.unwrap();
    assert_eq!(stats.transitions_applied, 1);

    let stored = fx.store.get_event(event.event_id).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::RegistrationOpen);
}

#[tokio::test]
async fn tick_is_idempotent_when_nothing_is_due() {
    let fx = fixture(t(12, 0));
    let event = fx.admin.create_event(draft(CertificateRelease::Automatic)).await.unwrap();
    fx.admin.publish(event.event_id).await.unwrap();

    fx.scheduler.tick().await.unwrap();
    let before = fx.notifier.status_changes().len();
    let stats = fx.scheduler.tick().await.unwrap();
    assert_eq!(stats.transitions_applied, 0, "second tick at the same instant");
    assert_eq!(fx.notifier.status_changes().len(), before);
}

#[tokio::test]
async fn delayed_tick_replays_every_skipped_transition_in_order() {
    // Scheduler last ran before registration closed; the event should have
    // passed through RegistrationClosed -> Ongoing -> Completed since.
    let fx = fixture(t(12, 0));
    let event = fx.admin.create_event(draft(CertificateRelease::Manual)).await.unwrap();
    fx.admin.publish(event.event_id).await.unwrap();
    fx.scheduler.tick().await.unwrap();

    fx.clock.set(t(17, 0));
    let stats = fx.scheduler.tick().await.unwrap();
    assert_eq!(stats.transitions_applied, 3);

    let applied = transitions_of(&fx.notifier, event.event_id);
    assert_eq!(
        applied[applied.len() - 3..].to_vec(),
        vec![
            (EventStatus::RegistrationOpen, EventStatus::RegistrationClosed),
            (EventStatus::RegistrationClosed, EventStatus::Ongoing),
            (EventStatus::Ongoing, EventStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn catch_up_matches_tick_by_tick_execution() {
    // One scheduler ticks at every boundary, the other only once at the
    // end. Final state and the ordered notification list must match.
    let instants = [t(12, 0), t(14, 1), t(15, 11), t(16, 0), t(30, 1)];

    let stepped = fixture(t(9, 0));
    let event_stepped = stepped
        .admin
        .create_event(draft(CertificateRelease::Automatic))
        .await
        .unwrap();
    stepped.admin.publish(event_stepped.event_id).await.unwrap();
    for now in instants {
        stepped.clock.set(now);
        stepped.scheduler.tick().await.unwrap();
    }

    let lagged = fixture(t(9, 0));
    let event_lagged = lagged
        .admin
        .create_event(draft(CertificateRelease::Automatic))
        .await
        .unwrap();
    lagged.admin.publish(event_lagged.event_id).await.unwrap();
    lagged.clock.set(t(30, 1));
    lagged.scheduler.tick().await.unwrap();

    let a = fx_final_status(&stepped.store, event_stepped.event_id).await;
    let b = fx_final_status(&lagged.store, event_lagged.event_id).await;
    assert_eq!(a, b);
    assert_eq!(a, EventStatus::Archived);

    let stepped_path: Vec<_> = transitions_of(&stepped.notifier, event_stepped.event_id);
    let lagged_path: Vec<_> = transitions_of(&lagged.notifier, event_lagged.event_id);
    assert_eq!(stepped_path, lagged_path, "same ordered notifications");
    assert_eq!(
        lagged_path,
        vec![
            // Emitted by publish, before any tick.
            (EventStatus::Draft, EventStatus::Upcoming),
            (EventStatus::Upcoming, EventStatus::RegistrationOpen),
            (EventStatus::RegistrationOpen, EventStatus::RegistrationClosed),
            (EventStatus::RegistrationClosed, EventStatus::Ongoing),
            (EventStatus::Ongoing, EventStatus::Completed),
            (EventStatus::Completed, EventStatus::CertificateAvailable),
            (EventStatus::CertificateAvailable, EventStatus::Archived),
        ]
    );
}

async fn fx_final_status(store: &MemoryStore, event_id: Uuid) -> EventStatus {
    store.get_event(event_id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn manual_release_holds_at_completed_until_released() {
    let fx = fixture(t(9, 0));
    let event = fx.admin.create_event(draft(CertificateRelease::Manual)).await.unwrap();
    fx.admin.publish(event.event_id).await.unwrap();

    fx.clock.set(t(16, 0));
    fx.scheduler.tick().await.unwrap();
    assert_eq!(
        fx_final_status(&fx.store, event.event_id).await,
        EventStatus::Completed
    );

    fx.admin.release_certificates(event.event_id).await.unwrap();
    fx.scheduler.tick().await.unwrap();
    assert_eq!(
        fx_final_status(&fx.store, event.event_id).await,
        EventStatus::CertificateAvailable
    );
}

#[tokio::test]
async fn cancelled_events_are_left_alone() {
    let fx = fixture(t(12, 0));
    let event = fx.admin.create_event(draft(CertificateRelease::Automatic)).await.unwrap();
    fx.admin.publish(event.event_id).await.unwrap();
    fx.admin.cancel_event(event.event_id).await.unwrap();

    fx.clock.set(t(20, 0));
    let stats = fx.scheduler.tick().await.unwrap();
    assert_eq!(stats.events_checked, 0, "terminal events leave the working set");
    assert_eq!(
        fx_final_status(&fx.store, event.event_id).await,
        EventStatus::Cancelled
    );
}

// ---------------------------------------------------------------------------
// Per-event failure isolation
// ---------------------------------------------------------------------------

/// Delegates to MemoryStore but fails writes for one chosen event.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<Option<Uuid>>,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(None),
        }
    }

    fn fail_event(&self, event_id: Option<Uuid>) {
        *self.failing.lock().unwrap() = event_id;
    }
}

#[async_trait]
impl EventCollection for FlakyStore {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        self.inner.insert_event(event).await
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        self.inner.get_event(event_id).await
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        if *self.failing.lock().unwrap() == Some(event.event_id) {
            return Err(RollcallError::TransientStore("write refused".into()));
        }
        self.inner.save_event(event).await
    }

    async fn events_not_terminal(&self) -> Result<Vec<Event>> {
        self.inner.events_not_terminal().await
    }

    async fn event_by_registration(&self, registration_id: Uuid) -> Result<Option<Event>> {
        self.inner.event_by_registration(registration_id).await
    }
}

#[tokio::test]
async fn one_failing_event_does_not_abort_the_tick() {
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(FlakyStore::new(memory.clone()));
    let notifier = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::new(t(9, 0)));
    let admin = EventAdmin::new(
        store.clone() as Arc<dyn EventCollection>,
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
    );
    let scheduler = LifecycleScheduler::new(
        store.clone() as Arc<dyn EventCollection>,
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
        Duration::from_secs(60),
    );

    let flaky = admin.create_event(draft(CertificateRelease::Automatic)).await.unwrap();
    let healthy = admin.create_event(draft(CertificateRelease::Automatic)).await.unwrap();
    admin.publish(flaky.event_id).await.unwrap();
    admin.publish(healthy.event_id).await.unwrap();

    store.fail_event(Some(flaky.event_id));
    clock.set(t(12, 0));
    let stats = scheduler.tick().await.unwrap();
    assert_eq!(stats.events_failed, 1);
    assert_eq!(stats.transitions_applied, 1, "healthy event still advanced");
    assert_eq!(
        memory.get_event(healthy.event_id).await.unwrap().unwrap().status,
        EventStatus::RegistrationOpen
    );
    assert_eq!(
        memory.get_event(flaky.event_id).await.unwrap().unwrap().status,
        EventStatus::Upcoming,
        "failed event untouched"
    );

    // Next tick retries the failed event.
    store.fail_event(None);
    let stats = scheduler.tick().await.unwrap();
    assert_eq!(stats.events_failed, 0);
    assert_eq!(stats.transitions_applied, 1);
    assert_eq!(
        memory.get_event(flaky.event_id).await.unwrap().unwrap().status,
        EventStatus::RegistrationOpen
    );
}

#[tokio::test]
async fn scheduler_start_stop_lifecycle() {
    let fx = fixture(t(9, 0));
    let scheduler = Arc::new(fx.scheduler);
    let handle = scheduler.start();
    // The loop is running; stopping joins it cleanly.
    handle.stop().await;
}
