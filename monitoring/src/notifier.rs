use memerelay_core::config::{WebhookKind, WebhookSettings};
use memerelay_core::NotifierError;
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const BOT_NAME: &str = "Reddit Meme Scraper";
const BOT_USERNAME: &str = "Meme Bot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

impl NotifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Error => "error",
        }
    }
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body for the given webhook flavour.
pub fn build_payload(kind: WebhookKind, message: &str, level: NotifyLevel) -> Value {
    match kind {
        WebhookKind::Slack => json!({
            "text": format!("🤖 {}: {}", BOT_NAME, message),
            "username": BOT_USERNAME,
        }),
        WebhookKind::Discord => json!({
            "content": format!("🤖 **{}**: {}", BOT_NAME, message),
        }),
        WebhookKind::Generic => json!({
            "message": message,
            "level": level.as_str(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    settings: WebhookSettings,
}

impl WebhookNotifier {
    pub fn new(settings: WebhookSettings) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::Transport {
                reason: e.to_string(),
            })?;
        Ok(Self { client, settings })
    }

    pub fn kind(&self) -> WebhookKind {
        self.settings.kind
    }

    pub async fn notify(&self, message: &str, level: NotifyLevel) -> Result<(), NotifierError> {
        let payload = build_payload(self.settings.kind, message, level);

        let response = self
            .client
            .post(&self.settings.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::Transport {
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Rejected {
                status_code: status.as_u16(),
            });
        }

        debug!("Webhook notification delivered ({})", level);
        Ok(())
    }
}
