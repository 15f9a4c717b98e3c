use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EventStatus, RegistrationKind};

/// One lifecycle transition applied to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChanged {
    pub event_id: Uuid,
    pub title: String,
    pub from: EventStatus,
    pub to: EventStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationChange {
    Created,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationChanged {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub participant_id: String,
    pub kind: RegistrationKind,
    pub change: RegistrationChange,
    pub at: DateTime<Utc>,
}

/// Pluggable fire-and-forget notification publisher. Callers log failures
/// and move on; delivery is never part of an operation's contract.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    async fn status_changed(&self, change: &StatusChanged) -> anyhow::Result<()>;

    async fn registration_changed(&self, change: &RegistrationChanged) -> anyhow::Result<()>;
}
