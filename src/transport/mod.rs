//! Chat transport
//!
//! The flow talks to users only through [`ChatTransport`]; [`TelegramTransport`]
//! is the Bot API implementation and also produces [`InboundEvent`]s by long
//! polling.

mod models;
mod telegram;

pub use models::{
    ChatAction, ChatId, ChatUser, Choice, FileDelivery, InboundEvent, MessageId, TextFormat,
};
pub use telegram::{BotIdentity, TelegramTransport};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },

    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn notify(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<MessageId>;

    /// Show `choices` as buttons, on top of the thumbnail when there is one
    async fn offer_choices(
        &self,
        chat_id: ChatId,
        text: &str,
        thumbnail: Option<&str>,
        choices: &[Choice],
    ) -> Result<MessageId>;

    async fn deliver_file(&self, delivery: &FileDelivery) -> Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Acknowledge a button press; `alert` shows a modal instead of a toast
    async fn answer_callback(&self, callback_id: &str, text: &str, alert: bool) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
