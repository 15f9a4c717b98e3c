use async_trait::async_trait;

use rollcall_common::{NotifyBackend, RegistrationChanged, StatusChanged};

/// No-op notification backend for deployments without a webhook.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn status_changed(&self, _change: &StatusChanged) -> anyhow::Result<()> {
        Ok(())
    }

    async fn registration_changed(&self, _change: &RegistrationChanged) -> anyhow::Result<()> {
        Ok(())
    }
}
