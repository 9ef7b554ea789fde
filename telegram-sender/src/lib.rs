//! Telegram Bot API delivery.
//!
//! Posts with media go out as photos, falling back to documents and finally
//! to a plain text message when Telegram refuses the media.

pub mod api;
pub mod format;


pub use api::{classify_failure, BotIdentity, TelegramConfig, TelegramSender};
pub use format::{format_caption, format_text};
