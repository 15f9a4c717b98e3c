use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_attendance::outcome_for;
use rollcall_common::{Clock, EventStatus, Result, RollcallError};
use rollcall_lifecycle::target_status;
use rollcall_store::EventCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    EventNotReady,
    AttendanceFailed,
    RegistrationCancelled,
}

impl std::fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibilityReason::EventNotReady => write!(f, "event_not_ready"),
            IneligibilityReason::AttendanceFailed => write!(f, "attendance_failed"),
            IneligibilityReason::RegistrationCancelled => write!(f, "registration_cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibilityReason>,
}

impl Eligibility {
    fn ok() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    fn not(reason: IneligibilityReason) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

pub struct EligibilityGate {
    events: Arc<dyn EventCollection>,
    clock: Arc<dyn Clock>,
    default_pass_threshold: f64,
}

impl EligibilityGate {
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

    /// Eligible only if the registration is active, the event has reached
    /// `CertificateAvailable` (or `Archived`, but never `Cancelled`), and
    /// the attendance outcome passed. Errors only for unknown ids.
    pub async fn is_eligible(&self, registration_id: Uuid) -> Result<Eligibility> {
        let event = self
            .events
            .event_by_registration(registration_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;

        let registration = event
            .registration(registration_id)
            .ok_or_else(|| RollcallError::NotFound(format!("registration {registration_id}")))?;

        if !registration.is_active() {
            return Ok(Eligibility::not(IneligibilityReason::RegistrationCancelled));
        }

        let status = target_status(&event, self.clock.now());
        let event_ready = matches!(
            status,
            EventStatus::CertificateAvailable | EventStatus::Archived
        );
        if !event_ready {
            return Ok(Eligibility::not(IneligibilityReason::EventNotReady));
        }

        let outcome = outcome_for(&event, registration_id, self.default_pass_threshold);
        if !outcome.passed {
            return Ok(Eligibility::not(IneligibilityReason::AttendanceFailed));
        }

        Ok(Eligibility::ok())
    }
}
