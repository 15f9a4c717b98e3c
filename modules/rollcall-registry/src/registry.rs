use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use uuid::Uuid;

use rollcall_common::{
    Clock, Event, EventStatus, NotifyBackend, ParticipantDoc, ParticipantProfile,
    ParticipationRef, Registration, RegistrationChange, RegistrationChanged, RegistrationKind,
    RegistrationMode, RegistrationStatus, Result, RollcallError,
};
use rollcall_lifecycle::target_status;
use rollcall_store::{
    registration_lock_key, EventCollection, ParticipantCollection, RegistrationLock,
};

/// Deterministic registration identity. The same participant, event, and
/// kind always derive the same id, which makes duplicate detection an id
/// equality check instead of a scan.
pub fn registration_id_for(event_id: Uuid, participant_id: &str, kind: RegistrationKind) -> Uuid {
    let name = format!("{event_id}:{participant_id}:{kind}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub struct RegistrationService {
    events: Arc<dyn EventCollection>,
    participants: Arc<dyn ParticipantCollection>,
    lock: Arc<dyn RegistrationLock>,
    notifier: Arc<dyn NotifyBackend>,
    clock: Arc<dyn Clock>,
    /// Mirror writes that failed, keyed by participant. Drained on that
    /// participant's next read. Losing this queue loses only laziness:
    /// the full record already exists and read-repair rebuilds the refs.
    pending_mirrors: Mutex<HashMap<String, Vec<ParticipationRef>>>,
}

impl RegistrationService {
    pub fn new(
        events: Arc<dyn EventCollection>,
        participants: Arc<dyn ParticipantCollection>,
        lock: Arc<dyn RegistrationLock>,
        notifier: Arc<dyn NotifyBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            participants,
            lock,
            notifier,
            clock,
            pending_mirrors: Mutex::new(HashMap::new()),
        }
    }

    /// Register a participant for an event.
    ///
    /// The existence-check-then-write sequence runs under a short-lived
    /// lock keyed on (participant, event); a caller that cannot take the
    /// lock lost the race and gets a `ConflictError`, same as a caller
    /// that finds the duplicate after winning it.
    pub async fn create_registration(
        &self,
        event_id: Uuid,
        participant: ParticipantProfile,
        kind: RegistrationKind,
        team_id: Option<String>,
    ) -> Result<Registration> {
        if kind.is_team() && team_id.is_none() {
            return Err(RollcallError::Validation(
                "team registrations require a team_id".into(),
            ));
        }
        if kind == RegistrationKind::Individual && team_id.is_some() {
            return Err(RollcallError::Validation(
                "individual registrations must not carry a team_id".into(),
            ));
        }

        let key = registration_lock_key(&participant.participant_id, event_id);
        let guard = self.lock.acquire(&key).await?.ok_or_else(|| {
            RollcallError::Conflict(format!(
                "another registration for participant {} on event {event_id} is in flight",
                participant.participant_id
            ))
        })?;

        let result = self
            .create_locked(event_id, participant, kind, team_id)
            .await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "Failed to release registration lock");
        }
        result
    }

    async fn create_locked(
        &self,
        event_id: Uuid,
        participant: ParticipantProfile,
        kind: RegistrationKind,
        team_id: Option<String>,
    ) -> Result<Registration> {
        let mut event = self.fetch_event(event_id).await?;
        let now = self.clock.now();

        let status = target_status(&event, now);
        if status != EventStatus::RegistrationOpen {
            return Err(RollcallError::Conflict(format!(
                "event {event_id} is not open for registration (currently {status})"
            )));
        }

        let mode_ok = match event.registration_mode {
            RegistrationMode::Individual => kind == RegistrationKind::Individual,
            RegistrationMode::Team => kind.is_team(),
        };
        if !mode_ok {
            return Err(RollcallError::Validation(format!(
                "{kind} registration does not match the event's registration mode"
            )));
        }

        if event
            .active_registration_for(&participant.participant_id)
            .is_some()
        {
            return Err(RollcallError::Conflict(format!(
                "participant {} already has an active registration for event {event_id}",
                participant.participant_id
            )));
        }

        if let Some(capacity) = event.capacity {
            if event.active_registration_count() as u32 >= capacity {
                return Err(RollcallError::Conflict(format!(
                    "event {event_id} is at capacity ({capacity})"
                )));
            }
        }

        let registration = Registration {
            registration_id: registration_id_for(event_id, &participant.participant_id, kind),
            event_id,
            participant,
            kind,
            team_id,
            status: RegistrationStatus::Active,
            created_at: now,
            cancelled_at: None,
        };

        // Full record first. A cancelled predecessor under the same
        // deterministic id is replaced in place; the id never refers to
        // two records at once.
        match event.registration_mut(registration.registration_id) {
            Some(slot) if slot.is_active() => {
                return Err(RollcallError::Conflict(format!(
                    "registration {} already exists",
                    registration.registration_id
                )));
            }
            Some(slot) => *slot = registration.clone(),
            None => event.registrations.push(registration.clone()),
        }
        event.updated_at = now;
        self.events.save_event(&event).await?;

        info!(
            registration_id = %registration.registration_id,
            event_id = %event_id,
            participant_id = %registration.participant.participant_id,
            "Registration created"
        );

        self.write_mirror(&registration).await;
        self.publish_change(&registration, RegistrationChange::Created)
            .await;
        Ok(registration)
    }

    /// Cancel a registration. Cancelling a team leader cascades to every
    /// member registration sharing the team, all in one document write.
    /// Already-cancelled registrations are a no-op.
    pub async fn cancel_registration(&self, registration_id: Uuid) -> Result<()> {
        let mut event = self
            .events
            .event_by_registration(registration_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;

        let target = event
            .registration(registration_id)
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;
        if !target.is_active() {
            return Ok(());
        }

        let cascade_team = match (target.kind, target.team_id.clone()) {
            (RegistrationKind::TeamLeader, Some(team)) => Some(team),
            _ => None,
        };

        let now = self.clock.now();
        let mut cancelled = Vec::new();
        for reg in event.registrations.iter_mut() {
            let selected = reg.registration_id == registration_id
                || matches!((&cascade_team, &reg.team_id), (Some(t), Some(rt)) if t == rt);
            if selected && reg.is_active() {
                reg.status = RegistrationStatus::Cancelled;
                reg.cancelled_at = Some(now);
                cancelled.push(reg.clone());
            }
        }
        event.updated_at = now;
        self.events.save_event(&event).await?;

        info!(
            registration_id = %registration_id,
            cancelled = cancelled.len(),
            "Registration cancelled"
        );

        for registration in &cancelled {
            self.write_mirror(registration).await;
            self.publish_change(registration, RegistrationChange::Cancelled)
                .await;
        }
        Ok(())
    }

    pub async fn get_registration(&self, registration_id: Uuid) -> Result<Registration> {
        let event = self
            .events
            .event_by_registration(registration_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;
        event
            .registration(registration_id)
            .cloned()
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))
    }

    /// Authoritative listing straight from the event document. This is
    /// what capacity checks and attendance work from.
    pub async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Registration>> {
        let event = self.fetch_event(event_id).await?;
        Ok(event.registrations)
    }

    /// Listing via the participant's reference mirrors, repaired lazily:
    /// queued mirror writes are retried first, then every ref is verified
    /// against its full record; divergent refs are rewritten and dangling
    /// refs dropped before the result is returned.
    pub async fn list_for_participant(&self, participant_id: &str) -> Result<Vec<Registration>> {
        self.retry_pending_mirrors(participant_id).await;

        let Some(doc) = self.participants.get_participant(participant_id).await? else {
            return Ok(Vec::new());
        };

        let mut cache: HashMap<Uuid, Option<Event>> = HashMap::new();
        let mut repaired: Vec<ParticipationRef> = Vec::new();
        let mut records: Vec<Registration> = Vec::new();
        let mut dirty = false;

        for r in &doc.registrations {
            if !cache.contains_key(&r.event_id) {
                cache.insert(r.event_id, self.events.get_event(r.event_id).await?);
            }
            let full = cache
                .get(&r.event_id)
                .and_then(|e| e.as_ref())
                .and_then(|e| e.registration(r.registration_id));

            match full {
                None => {
                    // The mirror is not a source of truth: a ref with no
                    // backing record is dropped.
                    warn!(
                        participant_id = %participant_id,
                        registration_id = %r.registration_id,
                        "Dropping participation ref with no backing record"
                    );
                    dirty = true;
                }
                Some(full) => {
                    let fresh = ParticipationRef::from(full);
                    if &fresh != r {
                        dirty = true;
                    }
                    repaired.push(fresh);
                    records.push(full.clone());
                }
            }
        }

        if dirty {
            let rewritten = ParticipantDoc {
                participant_id: participant_id.to_string(),
                registrations: repaired,
            };
            match self.participants.save_participant(&rewritten).await {
                Ok(()) => info!(participant_id = %participant_id, "Read-repair rewrote participation refs"),
                Err(e) => {
                    // The next read repairs again.
                    warn!(participant_id = %participant_id, error = %e, "Read-repair write failed")
                }
            }
        }

        Ok(records)
    }

    async fn fetch_event(&self, event_id: Uuid) -> Result<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("event {event_id}")))
    }

    /// Best-effort mirror write. Failures queue the ref for retry on the
    /// participant's next read.
    async fn write_mirror(&self, registration: &Registration) {
        let r = ParticipationRef::from(registration);
        let participant_id = registration.participant.participant_id.clone();
        if let Err(e) = self.try_mirror_write(&participant_id, r.clone()).await {
            warn!(
                participant_id = %participant_id,
                registration_id = %r.registration_id,
                error = %e,
                "Mirror write failed, queued for repair"
            );
            self.pending_mirrors
                .lock()
                .unwrap()
                .entry(participant_id)
                .or_default()
                .push(r);
        }
    }

    async fn try_mirror_write(&self, participant_id: &str, r: ParticipationRef) -> Result<()> {
        let mut doc = self
            .participants
            .get_participant(participant_id)
            .await?
            .unwrap_or_else(|| ParticipantDoc::new(participant_id));
        doc.upsert_ref(r);
        self.participants.save_participant(&doc).await
    }

    async fn retry_pending_mirrors(&self, participant_id: &str) {
        let pending = self.pending_mirrors.lock().unwrap().remove(participant_id);
        let Some(refs) = pending else { return };

        for r in refs {
            if let Err(e) = self.try_mirror_write(participant_id, r.clone()).await {
                warn!(
                    participant_id = %participant_id,
                    registration_id = %r.registration_id,
                    error = %e,
                    "Mirror retry failed, keeping queued"
                );
                self.pending_mirrors
                    .lock()
                    .unwrap()
                    .entry(participant_id.to_string())
                    .or_default()
                    .push(r);
            }
        }
    }

    /// Fire-and-forget; delivery is never part of the operation contract.
    async fn publish_change(&self, registration: &Registration, change: RegistrationChange) {
        let message = RegistrationChanged {
            registration_id: registration.registration_id,
            event_id: registration.event_id,
            participant_id: registration.participant.participant_id.clone(),
            kind: registration.kind,
            change,
            at: self.clock.now(),
        };
        if let Err(e) = self.notifier.registration_changed(&message).await {
            warn!(
                registration_id = %registration.registration_id,
                error = %e,
                "Failed to send registration notification"
            );
        }
    }
}
