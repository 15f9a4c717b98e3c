//! Admin operations on events: creation, publishing, manual transitions,
//! cancellation, and session corrections.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use rollcall_attendance::derive_strategy;
use rollcall_common::{
    CertificateRelease, Clock, Event, EventStatus, NotifyBackend, RegistrationMode, Result,
    RollcallError, Session, SessionKind, StatusChanged, TimeWindows,
};
use rollcall_store::EventCollection;

use crate::status::target_status;

/// What an admin supplies to create an event. Ids are assigned here.
pub struct EventDraft {
    pub title: String,
    pub windows: TimeWindows,
    pub registration_mode: RegistrationMode,
    pub capacity: Option<u32>,
    pub pass_threshold: Option<f64>,
    pub certificate_release: CertificateRelease,
    pub sessions: Vec<SessionDraft>,
}

pub struct SessionDraft {
    pub title: String,
    pub kind: SessionKind,
    pub weight: f64,
    pub mandatory: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl SessionDraft {
    fn into_session(self) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            title: self.title,
            kind: self.kind,
            weight: self.weight,
            mandatory: self.mandatory,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        }
    }
}

pub struct EventAdmin {
    events: Arc<dyn EventCollection>,
    notifier: Arc<dyn NotifyBackend>,
    clock: Arc<dyn Clock>,
}

impl EventAdmin {
    pub fn new(
        events: Arc<dyn EventCollection>,
        notifier: Arc<dyn NotifyBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            notifier,
            clock,
        }
    }

    /// Create an event in `Draft`. The attendance strategy is derived from
    /// the session list here, at session-list finalization time.
    pub async fn create_event(&self, draft: EventDraft) -> Result<Event> {
        draft.windows.validate()?;
        if draft.sessions.is_empty() {
            return Err(RollcallError::Validation(
                "an event needs at least one session".into(),
            ));
        }

        let sessions: Vec<Session> = draft
            .sessions
            .into_iter()
            .map(SessionDraft::into_session)
            .collect();
        for session in &sessions {
            session.validate()?;
        }

        let now = self.clock.now();
        let event = Event {
            event_id: Uuid::new_v4(),
            title: draft.title,
            status: EventStatus::Draft,
            windows: draft.windows,
            registration_mode: draft.registration_mode,
            capacity: draft.capacity,
            pass_threshold: draft.pass_threshold,
            certificate_release: draft.certificate_release,
            certificates_released: false,
            attendance_strategy: derive_strategy(&sessions),
            sessions,
            registrations: Vec::new(),
            attendance: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.events.insert_event(&event).await?;
        info!(event_id = %event.event_id, title = %event.title, "Event created");
        Ok(event)
    }

    /// Draft → Upcoming. The only way out of `Draft`.
    pub async fn publish(&self, event_id: Uuid) -> Result<Event> {
        let mut event = self.fetch(event_id).await?;
        if event.status != EventStatus::Draft {
            return Err(RollcallError::Transition {
                from: event.status,
                to: EventStatus::Upcoming,
            });
        }
        self.apply(&mut event, EventStatus::Upcoming).await?;
        Ok(event)
    }

    /// Manually move an event forward along the chain. Backward moves,
    /// moves out of a terminal state, and `Cancelled`/`Draft` targets are
    /// `TransitionError`s; cancelling has its own operation and
    /// un-cancelling does not exist.
    pub async fn force_transition(&self, event_id: Uuid, to: EventStatus) -> Result<Event> {
        let mut event = self.fetch(event_id).await?;
        let from = event.status;

        let valid_target = !matches!(to, EventStatus::Cancelled | EventStatus::Draft);
        let forward = match (from.phase_index(), to.phase_index()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        };
        if from.is_terminal() || !valid_target || !forward {
            return Err(RollcallError::Transition { from, to });
        }

        self.apply(&mut event, to).await?;
        Ok(event)
    }

    /// Absorbing admin cancellation, valid from any non-terminal state.
    pub async fn cancel_event(&self, event_id: Uuid) -> Result<Event> {
        let mut event = self.fetch(event_id).await?;
        if event.status.is_terminal() {
            return Err(RollcallError::Transition {
                from: event.status,
                to: EventStatus::Cancelled,
            });
        }
        self.apply(&mut event, EventStatus::Cancelled).await?;
        Ok(event)
    }

    /// Release certificates for a manually gated event.
    pub async fn release_certificates(&self, event_id: Uuid) -> Result<Event> {
        let mut event = self.fetch(event_id).await?;
        if event.certificate_release != CertificateRelease::Manual {
            return Err(RollcallError::Validation(format!(
                "event {event_id} releases certificates automatically"
            )));
        }
        event.certificates_released = true;
        event.updated_at = self.clock.now();
        self.events.save_event(&event).await?;
        Ok(event)
    }

    /// Append a session. The strategy is re-derived; attendance already
    /// recorded is untouched and the new session simply joins the
    /// denominator from now on.
    pub async fn add_session(&self, event_id: Uuid, draft: SessionDraft) -> Result<Event> {
        let mut event = self.fetch(event_id).await?;
        if event.status.is_terminal() {
            return Err(RollcallError::Validation(format!(
                "event {event_id} is {} and cannot be edited",
                event.status
            )));
        }
        let session = draft.into_session();
        session.validate()?;
        event.sessions.push(session);
        event.attendance_strategy = derive_strategy(&event.sessions);
        event.updated_at = self.clock.now();
        self.events.save_event(&event).await?;
        Ok(event)
    }

    /// Admin correction: replace a session in place by id. The only
    /// permitted mutation of a session once attendance exists against it.
    pub async fn correct_session(&self, event_id: Uuid, corrected: Session) -> Result<Event> {
        corrected.validate()?;
        let mut event = self.fetch(event_id).await?;
        let slot = event
            .sessions
            .iter_mut()
            .find(|s| s.session_id == corrected.session_id)
            .ok_or_else(|| {
                RollcallError::NotFound(format!("session {}", corrected.session_id))
            })?;
        *slot = corrected;
        event.attendance_strategy = derive_strategy(&event.sessions);
        event.updated_at = self.clock.now();
        self.events.save_event(&event).await?;
        Ok(event)
    }

    /// The state the event should be in right now. Read-side evaluation:
    /// nothing is persisted; only the scheduler writes status.
    pub async fn current_status(&self, event_id: Uuid) -> Result<EventStatus> {
        let event = self.fetch(event_id).await?;
        Ok(target_status(&event, self.clock.now()))
    }

    async fn fetch(&self, event_id: Uuid) -> Result<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("event {event_id}")))
    }

    /// Persist a single transition and publish it. Notification failures
    /// are logged, not surfaced.
    async fn apply(&self, event: &mut Event, to: EventStatus) -> Result<()> {
        let from = event.status;
        let now = self.clock.now();
        event.status = to;
        event.updated_at = now;
        self.events.save_event(event).await?;
        info!(event_id = %event.event_id, %from, %to, "Event transitioned");

        let change = StatusChanged {
            event_id: event.event_id,
            title: event.title.clone(),
            from,
            to,
            at: now,
        };
        if let Err(e) = self.notifier.status_changed(&change).await {
            warn!(event_id = %event.event_id, error = %e, "Failed to send status notification");
        }
        Ok(())
    }
}
