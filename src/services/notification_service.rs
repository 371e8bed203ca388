use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::session::SessionStatus;
use crate::utils::signature::sign_payload;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionSubmitted {
        session_id: Uuid,
        test_id: Uuid,
        status: SessionStatus,
        score: i32,
        percentage: i32,
        passed: bool,
    },
    SessionExpired {
        session_id: Uuid,
        test_id: Uuid,
        score: i32,
        percentage: i32,
    },
    ViolationLimitReached {
        session_id: Uuid,
        candidate_id: Uuid,
        count: i32,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionSubmitted { .. } => "session_submitted",
            SessionEvent::SessionExpired { .. } => "session_expired",
            SessionEvent::ViolationLimitReached { .. } => "violation_limit_reached",
        }
    }
}

/// Outbound notifications. Calls return immediately; delivery happens elsewhere.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationPort: Send + Sync {
    fn notify(&self, candidate_id: Uuid, event: SessionEvent);
    fn broadcast(&self, event: SessionEvent);
}

/// Writes events to the log only; used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn notify(&self, candidate_id: Uuid, event: SessionEvent) {
        tracing::info!(%candidate_id, event = event.name(), payload = ?event, "Notification");
    }

    fn broadcast(&self, event: SessionEvent) {
        tracing::info!(event = event.name(), payload = ?event, "Broadcast notification");
    }
}

/// Posts events to a webhook endpoint on a spawned task.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    target_url: String,
    secret: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, target_url: String, secret: String) -> Self {
        Self {
            client,
            target_url,
            secret,
        }
    }

    fn dispatch(&self, audience: serde_json::Value, event: SessionEvent) {
        let body = json!({ "audience": audience, "payload": event });
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.deliver(event.name(), &body).await {
                tracing::warn!(error = ?e, event = event.name(), "Webhook delivery failed");
            }
        });
    }

    async fn deliver(&self, event_name: &str, body: &serde_json::Value) -> crate::error::Result<()> {
        let raw = serde_json::to_vec(body)?;
        let mut request = self
            .client
            .post(&self.target_url)
            .header("content-type", "application/json")
            .header("X-Webhook-Secret", &self.secret)
            .header("X-Event", event_name);
        if let Some(signature) = sign_payload(&self.secret, &raw) {
            request = request.header("X-Signature", signature);
        }
        let resp = request.body(raw).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(crate::error::Error::Remote {
                status: status.as_u16(),
                code: "webhook_rejected".to_string(),
                message: text,
            });
        }
        tracing::debug!(event = event_name, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

impl NotificationPort for WebhookNotifier {
    fn notify(&self, candidate_id: Uuid, event: SessionEvent) {
        self.dispatch(json!({ "candidate_id": candidate_id }), event);
    }

    fn broadcast(&self, event: SessionEvent) {
        self.dispatch(json!("proctors"), event);
    }
}
