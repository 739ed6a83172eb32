use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classify::CriticalEvent;
use crate::errors::Result;
use crate::metrics::WEBHOOK_FAILURES_TOTAL;

/// Body POSTed to the alerting webhook
#[derive(Debug, Clone, Serialize)]
pub struct CriticalAlertPayload {
    pub device_id: String,
    pub device_name: String,
    pub alert_type: CriticalEvent,
    pub battery_level: i32,
    pub is_charging: bool,
    pub timestamp: DateTime<Utc>,
}

/// Pushes critical events to a single fixed webhook URL.
///
/// No timeout, retry or queueing: a slow endpoint delays the heartbeat
/// response and a failed delivery is only logged.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Sends the payload and returns the status the endpoint answered with.
    pub async fn send(&self, payload: &CriticalAlertPayload) -> Result<StatusCode> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        Ok(response.status())
    }

    /// Best-effort delivery.
    ///
    /// Returns true once the endpoint has answered, whatever the status.
    /// Transport failures are logged and counted, never returned.
    pub async fn notify(&self, payload: &CriticalAlertPayload) -> bool {
        match self.send(payload).await {
            Ok(status) if status.is_success() => {
                debug!(
                    "Webhook accepted {} for {}",
                    payload.alert_type, payload.device_id
                );
                true
            }
            Ok(status) => {
                warn!(
                    "Webhook answered {} for {} on {}",
                    status, payload.alert_type, payload.device_id
                );
                true
            }
            Err(e) => {
                WEBHOOK_FAILURES_TOTAL.inc();
                error!(
                    "Failed to trigger webhook for {} on {}: {}",
                    payload.alert_type, payload.device_id, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> CriticalAlertPayload {
        CriticalAlertPayload {
            device_id: "tab-1".to_string(),
            device_name: "Front desk".to_string(),
            alert_type: CriticalEvent::PowerLost,
            battery_level: 42,
            is_charging: false,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 8, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_notify_posts_payload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhook/tablet-critical-alert"))
            .and(body_json(json!({
                "device_id": "tab-1",
                "device_name": "Front desk",
                "alert_type": "power_lost",
                "battery_level": 42,
                "is_charging": false,
                "timestamp": "2025-01-01T08:30:00Z"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/webhook/tablet-critical-alert", mock_server.uri()))
                .unwrap();

        assert!(notifier.notify(&payload()).await);
    }

    #[tokio::test]
    async fn test_notify_error_status_still_counts_as_triggered() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(mock_server.uri()).unwrap();
        assert_eq!(
            notifier.send(&payload()).await.unwrap(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(notifier.notify(&payload()).await);
    }

    #[tokio::test]
    async fn test_notify_unreachable_endpoint() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook").unwrap();
        let failures = WEBHOOK_FAILURES_TOTAL.get();

        assert!(!notifier.notify(&payload()).await);
        assert!(WEBHOOK_FAILURES_TOTAL.get() > failures);
    }
}
