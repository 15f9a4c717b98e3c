use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RollcallError};

// --- Lifecycle Enums ---

/// Linear life stages of an event, plus the absorbing `Cancelled` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Upcoming,
    RegistrationOpen,
    RegistrationClosed,
    Ongoing,
    Completed,
    CertificateAvailable,
    Archived,
    Cancelled,
}

impl EventStatus {
    /// Position on the linear chain. `Cancelled` sits outside it.
    pub fn phase_index(&self) -> Option<u8> {
        match self {
            EventStatus::Draft => Some(0),
            EventStatus::Upcoming => Some(1),
            EventStatus::RegistrationOpen => Some(2),
            EventStatus::RegistrationClosed => Some(3),
            EventStatus::Ongoing => Some(4),
            EventStatus::Completed => Some(5),
            EventStatus::CertificateAvailable => Some(6),
            EventStatus::Archived => Some(7),
            EventStatus::Cancelled => None,
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Archived | EventStatus::Cancelled)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Draft => write!(f, "draft"),
            EventStatus::Upcoming => write!(f, "upcoming"),
            EventStatus::RegistrationOpen => write!(f, "registration_open"),
            EventStatus::RegistrationClosed => write!(f, "registration_closed"),
            EventStatus::Ongoing => write!(f, "ongoing"),
            EventStatus::Completed => write!(f, "completed"),
            EventStatus::CertificateAvailable => write!(f, "certificate_available"),
            EventStatus::Archived => write!(f, "archived"),
            EventStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMode {
    Individual,
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationKind {
    Individual,
    TeamLeader,
    TeamMember,
}

impl RegistrationKind {
    pub fn is_team(&self) -> bool {
        matches!(self, RegistrationKind::TeamLeader | RegistrationKind::TeamMember)
    }
}

impl std::fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationKind::Individual => write!(f, "individual"),
            RegistrationKind::TeamLeader => write!(f, "team_leader"),
            RegistrationKind::TeamMember => write!(f, "team_member"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Lecture,
    Workshop,
    Milestone,
    Exam,
}

/// Whether certificates unlock automatically at event end or wait for an
/// explicit admin release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateRelease {
    Automatic,
    Manual,
}

// --- Time Windows ---

/// The configured time boundaries an event's lifecycle is computed from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindows {
    pub registration_start: DateTime<Utc>,
    pub registration_end: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub certificate_end: DateTime<Utc>,
}

impl TimeWindows {
    /// Windows must be strictly ordered end to end.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.registration_start < self.registration_end
            && self.registration_end <= self.start
            && self.start < self.end
            && self.end < self.certificate_end;
        if !ordered {
            return Err(RollcallError::Validation(
                "time windows must be ordered: registration_start < registration_end <= start < end < certificate_end".into(),
            ));
        }
        Ok(())
    }
}

// --- Sessions ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub title: String,
    pub kind: SessionKind,
    /// Relative importance in the attendance percentage. Must be positive.
    pub weight: f64,
    /// Milestone sessions flagged mandatory gate the pass decision.
    #[serde(default)]
    pub mandatory: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Session {
    pub fn validate(&self) -> Result<()> {
        if self.weight <= 0.0 {
            return Err(RollcallError::Validation(format!(
                "session '{}' weight must be positive, got {}",
                self.title, self.weight
            )));
        }
        if self.starts_at >= self.ends_at {
            return Err(RollcallError::Validation(format!(
                "session '{}' must start before it ends",
                self.title
            )));
        }
        Ok(())
    }
}

/// How a pass/fail attendance outcome is derived for an event. Chosen once
/// from the session list shape, stored on the event, and recomputed only
/// when the session list changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttendanceStrategy {
    /// Single session: attended or not.
    Binary,
    /// Multiple sessions, equal weights.
    UniformPercentage,
    /// Multiple sessions with explicit differing weights.
    WeightedPercentage,
    /// A mandatory milestone session must be attended regardless of the
    /// overall percentage.
    MilestoneGated { session_id: Uuid },
}

// --- Registrations ---

/// Who registered. Opaque to the core beyond the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub participant_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Full registration record. Lives inside the event document; the single
/// source of truth for this registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub participant: ParticipantProfile,
    pub kind: RegistrationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.status == RegistrationStatus::Active
    }
}

/// Minimal projection of a registration, stored under the participant
/// aggregate for fast "my registrations" reads. Never authoritative: on
/// divergence the full record wins and this is rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationRef {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub kind: RegistrationKind,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Registration> for ParticipationRef {
    fn from(r: &Registration) -> Self {
        Self {
            registration_id: r.registration_id,
            event_id: r.event_id,
            kind: r.kind,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

/// The participant-owned document: one per participant, holding the
/// reference mirrors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDoc {
    pub participant_id: String,
    pub registrations: Vec<ParticipationRef>,
}

impl ParticipantDoc {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            registrations: Vec::new(),
        }
    }

    /// Insert or replace the ref with the same registration_id.
    pub fn upsert_ref(&mut self, r: ParticipationRef) {
        match self
            .registrations
            .iter_mut()
            .find(|existing| existing.registration_id == r.registration_id)
        {
            Some(existing) => *existing = r,
            None => self.registrations.push(r),
        }
    }
}

// --- Attendance ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub registration_id: Uuid,
    pub session_id: Uuid,
    pub attended: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Derived pass/fail determination. Computed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceOutcome {
    /// Weighted share of sessions attended, 0.00-100.00.
    pub percentage: f64,
    pub passed: bool,
    pub strategy: AttendanceStrategy,
}

// --- Events ---

/// The event aggregate: one document, atomically written as a whole.
/// Owns sessions, full registrations, and attendance records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub title: String,
    /// Last applied lifecycle state. Mutated only by the scheduler and by
    /// admin operations; moves forward along the chain except for cancel.
    pub status: EventStatus,
    pub windows: TimeWindows,
    pub registration_mode: RegistrationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Per-event override of the attendance pass threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_threshold: Option<f64>,
    pub certificate_release: CertificateRelease,
    #[serde(default)]
    pub certificates_released: bool,
    pub sessions: Vec<Session>,
    pub attendance_strategy: AttendanceStrategy,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn session(&self, session_id: Uuid) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    pub fn registration(&self, registration_id: Uuid) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.registration_id == registration_id)
    }

    pub fn registration_mut(&mut self, registration_id: Uuid) -> Option<&mut Registration> {
        self.registrations
            .iter_mut()
            .find(|r| r.registration_id == registration_id)
    }

    /// The active registration for a participant, if any. At most one
    /// exists per (participant, event).
    pub fn active_registration_for(&self, participant_id: &str) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.is_active() && r.participant.participant_id == participant_id)
    }

    pub fn active_registration_count(&self) -> usize {
        self.registrations.iter().filter(|r| r.is_active()).count()
    }

    /// Attendance records belonging to one registration.
    pub fn attendance_for(&self, registration_id: Uuid) -> Vec<&AttendanceRecord> {
        self.attendance
            .iter()
            .filter(|a| a.registration_id == registration_id)
            .collect()
    }

    /// Insert or overwrite the record for (registration_id, session_id).
    /// Last write wins; a second mark never duplicates.
    pub fn upsert_attendance(&mut self, record: AttendanceRecord) {
        match self.attendance.iter_mut().find(|a| {
            a.registration_id == record.registration_id && a.session_id == record.session_id
        }) {
            Some(existing) => *existing = record,
            None => self.attendance.push(record),
        }
    }
}
