//! Notification outbox worker.
//!
//! Status changes write a row to `momo_notifications` in the same database
//! transaction as the status update. This worker drains that outbox and POSTs
//! each payload to the configured URL, signed with HMAC-SHA256.

use std::time::Duration;

use momo_types::{MomoRepository, Notification, NotificationStatus};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::security::sign_payload;

/// Deliveries attempted before a notification is parked as `FAILED`.
pub const MAX_ATTEMPTS: i32 = 5;

const BATCH_SIZE: i64 = 10;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct NotificationWorker<R: MomoRepository> {
    repo: R,
    client: reqwest::Client,
    target_url: String,
    secret: Option<String>,
}

impl<R: MomoRepository> NotificationWorker<R> {
    pub fn new(repo: R, target_url: String, secret: Option<String>) -> Self {
        Self {
            repo,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            target_url,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    #[instrument(skip(self), fields(target = %self.target_url))]
    pub async fn run(self) {
        info!("Starting notification worker");
        loop {
            if let Err(e) = self.run_once().await {
                error!("Failed to fetch notifications: {}", e);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Delivers one batch of pending notifications. Returns how many were sent.
    pub async fn run_once(&self) -> Result<usize, momo_types::RepoError> {
        let pending = self.repo.get_pending_notifications(BATCH_SIZE).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        info!("Processing {} pending notifications", pending.len());
        let mut delivered = 0;
        for notification in pending {
            if self.deliver(notification).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id, event = %notification.event_type))]
    async fn deliver(&self, notification: Notification) -> bool {
        let body = match serde_json::to_vec(&notification.payload) {
            Ok(body) => body,
            Err(e) => {
                self.record(&notification, NotificationStatus::Failed, Some(e.to_string()))
                    .await;
                return false;
            }
        };

        let mut request = self
            .client
            .post(&self.target_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-Event-Type", &notification.event_type);
        if let Some(secret) = &self.secret {
            request = request.header("X-Signature", sign_payload(&body, secret));
        }

        let last_error = match request.body(body).send().await {
            Ok(resp) if resp.status().is_success() => None,
            Ok(resp) => Some(format!("HTTP {}", resp.status())),
            Err(e) => Some(e.to_string()),
        };

        match last_error {
            None => {
                self.record(&notification, NotificationStatus::Delivered, None)
                    .await;
                true
            }
            Some(err) => {
                // `attempts` counts deliveries before this one.
                let status = if notification.attempts + 1 >= MAX_ATTEMPTS {
                    NotificationStatus::Failed
                } else {
                    NotificationStatus::Pending
                };
                warn!(attempt = notification.attempts + 1, %status, "Notification delivery failed: {}", err);
                self.record(&notification, status, Some(err)).await;
                false
            }
        }
    }

    async fn record(
        &self,
        notification: &Notification,
        status: NotificationStatus,
        last_error: Option<String>,
    ) {
        if let Err(e) = self
            .repo
            .update_notification_status(notification.id, status, last_error)
            .await
        {
            error!("Failed to update notification status: {}", e);
        }
    }
}
