//! Recording marks and computing outcomes.

use std::sync::Arc;

use uuid::Uuid;

use rollcall_common::{
    AttendanceOutcome, AttendanceRecord, AttendanceStrategy, Clock, Event, Result, RollcallError,
};
use rollcall_store::EventCollection;

pub struct AttendanceEngine {
    events: Arc<dyn EventCollection>,
    clock: Arc<dyn Clock>,
    default_pass_threshold: f64,
}

impl AttendanceEngine {
    pub fn new(
        events: Arc<dyn EventCollection>,
        clock: Arc<dyn Clock>,
        default_pass_threshold: f64,
    ) -> Self {
        Self {
            events,
            clock,
            default_pass_threshold,
        }
    }

    /// Mark one (registration, session) pair. Idempotent upsert: a second
    /// mark overwrites, last write wins. Rejects marks against cancelled
    /// registrations and sessions from other events.
    pub async fn record_attendance(
        &self,
        registration_id: Uuid,
        session_id: Uuid,
        attended: bool,
    ) -> Result<()> {
        let mut event = self
            .events
            .event_by_registration(registration_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;

        let registration = event
            .registration(registration_id)
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;
        if !registration.is_active() {
            return Err(RollcallError::Conflict(format!(
                "registration {registration_id} is cancelled"
            )));
        }

        if event.session(session_id).is_none() {
            return Err(RollcallError::Validation(format!(
                "session {session_id} does not belong to event {}",
                event.event_id
            )));
        }

        let now = self.clock.now();
        event.upsert_attendance(AttendanceRecord {
            registration_id,
            session_id,
            attended,
            recorded_at: now,
        });
        event.updated_at = now;
        self.events.save_event(&event).await
    }

    /// Derive the pass/fail outcome for a registration from the current
    /// session list and recorded marks.
    pub async fn compute_outcome(&self, registration_id: Uuid) -> Result<AttendanceOutcome> {
        let event = self
            .events
            .event_by_registration(registration_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;

        Ok(outcome_for(
            &event,
            registration_id,
            self.default_pass_threshold,
        ))
    }
}

/// Pure outcome computation. Deterministic: the same records and session
/// weights always yield the same percentage. Sessions added after marks
/// were recorded join the denominator from then on; records referencing
/// sessions that were since corrected away are ignored.
pub fn outcome_for(
    event: &Event,
    registration_id: Uuid,
    default_pass_threshold: f64,
) -> AttendanceOutcome {
    let strategy = event.attendance_strategy;
    let records = event.attendance_for(registration_id);

    let attended = |session_id: Uuid| {
        records
            .iter()
            .any(|r| r.session_id == session_id && r.attended)
    };

    let total_weight: f64 = event.sessions.iter().map(|s| s.weight).sum();
    let attended_weight: f64 = event
        .sessions
        .iter()
        .filter(|s| attended(s.session_id))
        .map(|s| s.weight)
        .sum();

    let percentage = if total_weight > 0.0 {
        round2(attended_weight / total_weight * 100.0)
    } else {
        0.0
    };

    let threshold = event.pass_threshold.unwrap_or(default_pass_threshold);
    let passed = match strategy {
        // One session: attended or not, threshold does not apply.
        AttendanceStrategy::Binary => event
            .sessions
            .first()
            .map(|s| attended(s.session_id))
            .unwrap_or(false),
        AttendanceStrategy::UniformPercentage | AttendanceStrategy::WeightedPercentage => {
            percentage >= threshold
        }
        AttendanceStrategy::MilestoneGated { session_id } => {
            percentage >= threshold && attended(session_id)
        }
    };

    AttendanceOutcome {
        percentage,
        passed,
        strategy,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rollcall_common::{
        CertificateRelease, EventStatus, RegistrationMode, Session, SessionKind, TimeWindows,
    };

    fn t(day: u32, hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    fn session(weight: f64) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            title: "s".into(),
            kind: SessionKind::Lecture,
            weight,
            mandatory: false,
            starts_at: t(15, 10),
            ends_at: t(15, 12),
        }
    }

    fn event_with(sessions: Vec<Session>, strategy: AttendanceStrategy) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            title: "Systems Week".into(),
            status: EventStatus::Ongoing,
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
            sessions,
            attendance_strategy: strategy,
            registrations: vec![],
            attendance: vec![],
            created_at: t(1, 0),
            updated_at: t(1, 0),
        }
    }

    fn mark(event: &mut Event, registration_id: Uuid, session_id: Uuid, attended: bool) {
        event.upsert_attendance(AttendanceRecord {
            registration_id,
            session_id,
            attended,
            recorded_at: t(15, 11),
        });
    }

    #[test]
    fn weighted_percentage_rounds_to_two_decimals() {
        // Weights 1, 1, 2 (total 4); attending sessions 1 and 3 covers
        // weight 3 of 4.
        let sessions = vec![session(1.0), session(1.0), session(2.0)];
        let (s1, s3) = (sessions[0].session_id, sessions[2].session_id);
        let mut event = event_with(sessions, AttendanceStrategy::WeightedPercentage);
        event.pass_threshold = Some(60.0);

        let rid = Uuid::new_v4();
        mark(&mut event, rid, s1, true);
        mark(&mut event, rid, s3, true);

        let outcome = outcome_for(&event, rid, 75.0);
        assert_eq!(outcome.percentage, 75.00);
        assert!(outcome.passed, "75% against a threshold of 60 passes");
    }

    #[test]
    fn outcome_is_deterministic() {
        let sessions = vec![session(1.0), session(3.0)];
        let s1 = sessions[0].session_id;
        let mut event = event_with(sessions, AttendanceStrategy::WeightedPercentage);
        let rid = Uuid::new_v4();
        mark(&mut event, rid, s1, true);

        let first = outcome_for(&event, rid, 75.0);
        let second = outcome_for(&event, rid, 75.0);
        assert_eq!(first.percentage, second.percentage);
        assert_eq!(first.passed, second.passed);
        assert_eq!(first.percentage, 25.00);
    }

    #[test]
    fn binary_passes_only_when_attended() {
        let sessions = vec![session(1.0)];
        let sid = sessions[0].session_id;
        let mut event = event_with(sessions, AttendanceStrategy::Binary);
        let rid = Uuid::new_v4();

        assert!(!outcome_for(&event, rid, 75.0).passed, "no mark: fail");

        mark(&mut event, rid, sid, false);
        assert!(!outcome_for(&event, rid, 75.0).passed, "absent: fail");

        mark(&mut event, rid, sid, true);
        let outcome = outcome_for(&event, rid, 75.0);
        assert!(outcome.passed);
        assert_eq!(outcome.percentage, 100.00);
    }

    #[test]
    fn milestone_gate_fails_despite_high_percentage() {
        let milestone = Session {
            kind: SessionKind::Milestone,
            mandatory: true,
            ..session(1.0)
        };
        let gate = milestone.session_id;
        let sessions = vec![session(5.0), session(5.0), milestone];
        let (s1, s2) = (sessions[0].session_id, sessions[1].session_id);
        let mut event = event_with(
            sessions,
            AttendanceStrategy::MilestoneGated { session_id: gate },
        );
        let rid = Uuid::new_v4();
        mark(&mut event, rid, s1, true);
        mark(&mut event, rid, s2, true);

        // 10 of 11 weight is ~90.91%, but the milestone was missed.
        let outcome = outcome_for(&event, rid, 75.0);
        assert_eq!(outcome.percentage, 90.91);
        assert!(!outcome.passed, "mandatory milestone missed");

        mark(&mut event, rid, gate, true);
        assert!(outcome_for(&event, rid, 75.0).passed);
    }

    #[test]
    fn sessions_added_later_enter_the_denominator() {
        let sessions = vec![session(1.0), session(1.0)];
        let (s1, s2) = (sessions[0].session_id, sessions[1].session_id);
        let mut event = event_with(sessions, AttendanceStrategy::UniformPercentage);
        let rid = Uuid::new_v4();
        mark(&mut event, rid, s1, true);
        mark(&mut event, rid, s2, true);
        assert_eq!(outcome_for(&event, rid, 75.0).percentage, 100.00);

        // Admin adds a third session after the fact: the existing marks are
        // untouched but the denominator grows.
        event.sessions.push(session(1.0));
        assert_eq!(outcome_for(&event, rid, 75.0).percentage, 66.67);
    }

    #[test]
    fn default_threshold_applies_when_event_has_no_override() {
        let sessions = vec![session(1.0), session(1.0)];
        let s1 = sessions[0].session_id;
        let mut event = event_with(sessions, AttendanceStrategy::UniformPercentage);
        let rid = Uuid::new_v4();
        mark(&mut event, rid, s1, true);

        assert!(!outcome_for(&event, rid, 75.0).passed, "50% under 75");
        assert!(outcome_for(&event, rid, 50.0).passed, "50% meets 50");
    }
}
