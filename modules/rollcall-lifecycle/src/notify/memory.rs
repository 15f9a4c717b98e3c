use std::sync::Mutex;

use async_trait::async_trait;

use rollcall_common::{NotifyBackend, RegistrationChanged, StatusChanged};

/// In-memory backend for tests. Records every message in arrival order so
/// assertions can check both content and ordering.
#[derive(Default)]
pub struct MemoryBackend {
    status_changes: Mutex<Vec<StatusChanged>>,
    registration_changes: Mutex<Vec<RegistrationChanged>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_changes(&self) -> Vec<StatusChanged> {
        self.status_changes.lock().unwrap().clone()
    }

    pub fn registration_changes(&self) -> Vec<RegistrationChanged> {
        self.registration_changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for MemoryBackend {
    async fn status_changed(&self, change: &StatusChanged) -> anyhow::Result<()> {
        self.status_changes.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn registration_changed(&self, change: &RegistrationChanged) -> anyhow::Result<()> {
        self.registration_changes
            .lock()
            .unwrap()
            .push(change.clone());
        Ok(())
    }
}
