use crate::format::{format_caption, format_text};
use memerelay_core::{CandidatePost, CoreError, DeliveryMethod, Deliverer, TelegramError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const PARSE_MODE: &str = "Markdown";
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

// Substrings Telegram uses when it cannot use a URL as a photo.
const MEDIA_REJECTIONS: [&str; 6] = [
    "photo_invalid_dimensions",
    "failed to get http url content",
    "wrong file identifier/http url specified",
    "wrong type of the web page content",
    "too big",
    "image_process_failed",
];

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub error_code: Option<u16>,
    pub description: Option<String>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Serialize)]
struct SendPhotoBody<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct SendDocumentBody<'a> {
    chat_id: &'a str,
    document: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Map a failed Bot API envelope onto a typed error.
pub fn classify_failure(
    error_code: Option<u16>,
    description: Option<&str>,
    retry_after: Option<u64>,
    chat_id: &str,
) -> TelegramError {
    let description = description.unwrap_or("no description").to_string();
    let lowered = description.to_lowercase();

    match error_code {
        Some(429) => TelegramError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        Some(401) => TelegramError::Unauthorized,
        _ if lowered.contains("chat not found") => TelegramError::ChatNotFound {
            chat_id: chat_id.to_string(),
        },
        _ if MEDIA_REJECTIONS.iter().any(|pattern| lowered.contains(pattern)) => {
            TelegramError::MediaRejected { description }
        }
        Some(error_code) => TelegramError::Rejected {
            error_code,
            description,
        },
        None => TelegramError::InvalidResponse {
            details: description,
        },
    }
}

/// Errors after which trying another send method for the same post is pointless.
fn stops_fallback(error: &CoreError) -> bool {
    matches!(
        error,
        CoreError::Telegram(
            TelegramError::Unauthorized
                | TelegramError::ChatNotFound { .. }
                | TelegramError::RateLimitExceeded { .. }
        )
    )
}

pub struct TelegramSender {
    http_client: Client,
    endpoint: String,
    chat_id: String,
}

impl fmt::Debug for TelegramSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSender")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!(
            "{}/bot{}",
            config.api_base.trim_end_matches('/'),
            config.bot_token
        );

        Ok(Self {
            http_client,
            endpoint,
            chat_id: config.chat_id,
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Check the bot token by asking Telegram who we are.
    pub async fn get_me(&self) -> Result<BotIdentity, CoreError> {
        let identity: BotIdentity = self.call("getMe", &serde_json::json!({})).await?;
        info!(
            "Telegram bot verified: {} (@{})",
            identity.first_name,
            identity.username.as_deref().unwrap_or("unknown")
        );
        Ok(identity)
    }

    pub async fn send_photo(&self, photo: &str, caption: &str) -> Result<(), CoreError> {
        let body = SendPhotoBody {
            chat_id: &self.chat_id,
            photo,
            caption,
            parse_mode: PARSE_MODE,
        };
        self.call::<serde_json::Value, _>("sendPhoto", &body)
            .await
            .map(|_| ())
    }

    pub async fn send_document(&self, document: &str, caption: &str) -> Result<(), CoreError> {
        let body = SendDocumentBody {
            chat_id: &self.chat_id,
            document,
            caption,
            parse_mode: PARSE_MODE,
        };
        self.call::<serde_json::Value, _>("sendDocument", &body)
            .await
            .map(|_| ())
    }

    pub async fn send_message(&self, text: &str) -> Result<(), CoreError> {
        let body = SendMessageBody {
            chat_id: &self.chat_id,
            text,
            parse_mode: PARSE_MODE,
            disable_web_page_preview: false,
        };
        self.call::<serde_json::Value, _>("sendMessage", &body)
            .await
            .map(|_| ())
    }

    async fn call<T, B>(&self, method: &str, body: &B) -> Result<T, CoreError>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.endpoint, method);
        debug!("Calling Telegram API method {}", method);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // The URL embeds the bot token, keep it out of the logs.
                let e = e.without_url();
                error!("Network error calling {}: {}", method, e);
                if e.is_timeout() {
                    CoreError::Telegram(TelegramError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            CoreError::Telegram(TelegramError::InvalidResponse {
                details: format!("{} returned {} with unreadable body: {}", method, status, e.without_url()),
            })
        })?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { ok: true, .. } => Err(TelegramError::InvalidResponse {
                details: format!("{} succeeded without a result", method),
            }
            .into()),
            failure => {
                let error = classify_failure(
                    failure.error_code.or(Some(status.as_u16())),
                    failure.description.as_deref(),
                    failure.parameters.and_then(|p| p.retry_after),
                    &self.chat_id,
                );
                warn!("Telegram rejected {}: {}", method, error);
                Err(error.into())
            }
        }
    }
}

impl Deliverer for TelegramSender {
    async fn deliver(&self, post: &CandidatePost) -> Result<DeliveryMethod, CoreError> {
        let Some(media_url) = post.media_url.as_deref().filter(|url| !url.is_empty()) else {
            self.send_message(&format_text(post)).await?;
            info!("Sent post {} as text", post.id);
            return Ok(DeliveryMethod::Text);
        };

        let caption = format_caption(post);
        match self.send_photo(media_url, &caption).await {
            Ok(()) => {
                info!("Sent post {} as photo", post.id);
                return Ok(DeliveryMethod::Photo);
            }
            Err(CoreError::Telegram(TelegramError::MediaRejected { description })) => {
                warn!(
                    "Photo rejected for post {} ({}), retrying as document",
                    post.id, description
                );
            }
            Err(e) => return Err(e),
        }

        match self.send_document(media_url, &caption).await {
            Ok(()) => {
                info!("Sent post {} as document", post.id);
                return Ok(DeliveryMethod::Document);
            }
            Err(e) if stops_fallback(&e) => return Err(e),
            Err(e) => {
                warn!(
                    "Document send failed for post {} ({}), falling back to text",
                    post.id, e
                );
            }
        }

        self.send_message(&format_text(post)).await?;
        info!("Sent post {} as text", post.id);
        Ok(DeliveryMethod::Text)
    }
}
