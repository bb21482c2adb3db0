use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::middleware::sign_payload;

// ── Webhook Event Types ───────────────────────────────────────

/// A structured event payload sent to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// Event type identifier, e.g. "agent_decision", "content_flagged".
    pub event_type: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    /// The parcel the event concerns, when there is one.
    pub parcel_id: Option<u64>,
    /// Event-specific details (action, recipient, labels, etc.).
    pub details: serde_json::Value,
}

impl WebhookEvent {
    pub fn agent_decision(request_uuid: &uuid::Uuid, parcel_id: Option<u64>, action: &str) -> Self {
        Self {
            event_type: "agent_decision".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            parcel_id,
            details: serde_json::json!({
                "request_uuid": request_uuid.to_string(),
                "action": action,
            }),
        }
    }

    pub fn content_flagged(content_id: &str, announcer: &str, labels: &[String]) -> Self {
        Self {
            event_type: "content_flagged".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            parcel_id: None,
            details: serde_json::json!({
                "content_id": content_id,
                "announcer": announcer,
                "labels": labels,
            }),
        }
    }

    pub fn notification_batch(request_uuid: &uuid::Uuid, recipients: usize) -> Self {
        Self {
            event_type: "notification_batch".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            parcel_id: None,
            details: serde_json::json!({
                "request_uuid": request_uuid.to_string(),
                "recipients": recipients,
            }),
        }
    }
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Dispatches marketplace events to the configured webhook URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-AdParcel-Signature header, shared secret)
/// - Up to 3 retries with exponential back-off (1s → 5s → 25s)
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    signing_secret: String,
}

impl WebhookNotifier {
    pub fn new(signing_secret: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("AdParcel-Webhook/1.0")
                .build()
                .expect("failed to build webhook HTTP client"),
            signing_secret,
        }
    }

    /// Send a signed webhook event to a single URL with retry.
    ///
    /// Retries up to 3 times on failure with exponential back-off.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send(&self, url: &str, event: &WebhookEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_payload(&self.signing_secret, &payload);

        let backoff_secs: &[u64] = &[0, 1, 5, 25];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    event_type = %event.event_type,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let result = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-adparcel-delivery-id", &delivery_id)
                .header("x-adparcel-timestamp", &timestamp)
                .header("x-adparcel-event", &event.event_type)
                .header("x-adparcel-signature", &signature)
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivered successfully"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %status,
                        body = %body,
                        "webhook delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        event_type = %event.event_type,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error, will retry"
                    );
                }
            }
        }

        // All attempts exhausted
        warn!(
            url,
            event_type = %event.event_type,
            delivery_id = %delivery_id,
            "webhook delivery failed after all retries"
        );
        Err(anyhow::anyhow!(
            "webhook delivery failed after 3 retries: {}",
            url
        ))
    }

    /// Dispatch an event to all configured webhook URLs (fire-and-forget).
    ///
    /// Each URL is attempted independently with retry; failures in one do
    /// not block others.
    pub async fn dispatch(&self, urls: &[String], event: WebhookEvent) {
        if urls.is_empty() {
            debug!("dispatch: no webhook targets, skipping");
            return;
        }

        let notifier = self.clone();
        let urls = urls.to_vec();

        tokio::spawn(async move {
            let sends = urls.iter().map(|url| notifier.send(url, &event));
            for (url, result) in urls.iter().zip(futures::future::join_all(sends).await) {
                if let Err(e) = result {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_decision_event_fields() {
        let id = uuid::Uuid::new_v4();
        let event = WebhookEvent::agent_decision(&id, Some(7), "parcel_rented");
        assert_eq!(event.event_type, "agent_decision");
        assert_eq!(event.parcel_id, Some(7));
        assert_eq!(event.details["action"], "parcel_rented");
        assert_eq!(event.details["request_uuid"], id.to_string());
    }

    #[test]
    fn test_content_flagged_event_fields() {
        let event = WebhookEvent::content_flagged(
            "c-1",
            "0xde709f2102306220921060314715629080e2fb77",
            &["Explicit Nudity".to_string()],
        );
        assert_eq!(event.event_type, "content_flagged");
        assert_eq!(event.parcel_id, None);
        assert_eq!(event.details["labels"][0], "Explicit Nudity");
    }

    #[test]
    fn test_notification_batch_event_fields() {
        let id = uuid::Uuid::new_v4();
        let event = WebhookEvent::notification_batch(&id, 3);
        assert_eq!(event.event_type, "notification_batch");
        assert_eq!(event.details["recipients"], 3);
    }

    #[test]
    fn test_event_serializes_to_json() {
        let id = uuid::Uuid::new_v4();
        let event = WebhookEvent::agent_decision(&id, None, "noop");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("agent_decision"));
        assert!(json.contains("timestamp"));
    }
}
