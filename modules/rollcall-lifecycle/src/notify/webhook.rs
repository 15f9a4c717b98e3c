use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use rollcall_common::{NotifyBackend, RegistrationChanged, StatusChanged};

/// Generic JSON webhook backend. Posts one message per change; the
/// receiving side fans out to email/chat as it sees fit.
pub struct WebhookBackend {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Notification webhook returned non-success");
            anyhow::bail!("notification webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for WebhookBackend {
    async fn status_changed(&self, change: &StatusChanged) -> anyhow::Result<()> {
        self.post(json!({
            "type": "event_status_changed",
            "event_id": change.event_id,
            "title": change.title,
            "from": change.from,
            "to": change.to,
            "at": change.at,
        }))
        .await
    }

    async fn registration_changed(&self, change: &RegistrationChanged) -> anyhow::Result<()> {
        self.post(json!({
            "type": "registration_changed",
            "registration_id": change.registration_id,
            "event_id": change.event_id,
            "participant_id": change.participant_id,
            "kind": change.kind,
            "change": change.change,
            "at": change.at,
        }))
        .await
    }
}
