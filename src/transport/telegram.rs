//! Telegram Bot API over plain HTTPS

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::models::{
    ChatAction, ChatId, ChatUser, Choice, FileDelivery, InboundEvent, MessageId, TextFormat,
};
use super::{ChatTransport, Result, TransportError};
use crate::media::MediaKind;

const CALLBACK_PREFIX: &str = "dl:";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T> {
        if !self.ok {
            return Err(TransportError::Api {
                code: self.error_code,
                description: self.description.unwrap_or_default(),
            });
        }
        self.result
            .ok_or_else(|| TransportError::Malformed("ok response without result".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: MessageId,
    chat: Chat,
    from: Option<ChatUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: ChatUser,
    message: Option<Message>,
    data: Option<String>,
}

fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|cmd| cmd.split('@').next())
        .is_some_and(|cmd| cmd == "/start")
}

fn into_event(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let token = query.data?.strip_prefix(CALLBACK_PREFIX)?.to_string();
        let chat_id = query
            .message
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);
        return Some(InboundEvent::Callback {
            callback_id: query.id,
            chat_id,
            user: query.from,
            data: token,
        });
    }

    let message = update.message?;
    let text = message.text?;
    let chat_id = message.chat.id;
    let user = message.from.unwrap_or_else(|| ChatUser {
        id: chat_id,
        ..Default::default()
    });

    if is_start_command(&text) {
        Some(InboundEvent::Start { chat_id, user })
    } else {
        Some(InboundEvent::Text {
            chat_id,
            user,
            text,
        })
    }
}

fn keyboard(choices: &[Choice]) -> Value {
    let rows: Vec<Value> = choices
        .iter()
        .map(|c| {
            json!([{
                "text": c.label,
                "callback_data": format!("{CALLBACK_PREFIX}{}", c.token),
            }])
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Strip the url from reqwest errors; it embeds the bot token
fn redact(err: reqwest::Error) -> TransportError {
    TransportError::Http(err.without_url())
}

pub struct TelegramTransport {
    client: Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(api_root: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(redact)?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_root.trim_end_matches('/'), token),
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(redact)?
            .json()
            .await
            .map_err(redact)?;

        response.into_result()
    }

    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", json!({}), REQUEST_TIMEOUT).await
    }

    /// `getMe` with retries, used once at startup
    pub async fn connect(&self, attempts: u32, delay: Duration) -> Result<BotIdentity> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.get_me().await {
                Ok(identity) => return Ok(identity),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "Telegram API unreachable, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One long-poll round; advances `offset` past every update received
    pub async fn poll_updates(&self, offset: &mut i64) -> Result<Vec<InboundEvent>> {
        let body = json!({
            "offset": *offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });

        let updates: Vec<Update> = self
            .call("getUpdates", body, self.poll_timeout + REQUEST_TIMEOUT)
            .await?;

        if let Some(last) = updates.last() {
            *offset = last.update_id + 1;
        }

        Ok(updates.into_iter().filter_map(into_event).collect())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, extra: Value) -> Result<MessageId> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        merge(&mut body, extra);

        let sent: Message = self.call("sendMessage", body, REQUEST_TIMEOUT).await?;
        Ok(sent.message_id)
    }
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}

fn format_fields(format: TextFormat) -> Value {
    match format {
        TextFormat::Plain => json!({}),
        TextFormat::Html => json!({ "parse_mode": "HTML" }),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn notify(&self, chat_id: ChatId, text: &str, format: TextFormat) -> Result<MessageId> {
        self.send_text(chat_id, text, format_fields(format)).await
    }

    async fn offer_choices(
        &self,
        chat_id: ChatId,
        text: &str,
        thumbnail: Option<&str>,
        choices: &[Choice],
    ) -> Result<MessageId> {
        let markup = json!({ "parse_mode": "HTML", "reply_markup": keyboard(choices) });

        if let Some(photo) = thumbnail {
            let mut body = json!({ "chat_id": chat_id, "photo": photo, "caption": text });
            merge(&mut body, markup.clone());

            match self.call::<Message>("sendPhoto", body, REQUEST_TIMEOUT).await {
                Ok(sent) => return Ok(sent.message_id),
                Err(e) => debug!(chat_id, error = %e, "Thumbnail rejected, sending text"),
            }
        }

        self.send_text(chat_id, text, markup).await
    }

    async fn deliver_file(&self, delivery: &FileDelivery) -> Result<()> {
        let file = tokio::fs::File::open(&delivery.path).await?;
        let len = file.metadata().await?.len();
        let file_name = delivery
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("file.{}", delivery.media_kind.extension()));

        let part = Part::stream_with_length(Body::from(file), len).file_name(file_name);

        let form = Form::new()
            .text("chat_id", delivery.chat_id.to_string())
            .text("caption", delivery.caption.clone());

        let (method, form) = match delivery.media_kind {
            MediaKind::Video => (
                "sendVideo",
                form.text("supports_streaming", "true").part("video", part),
            ),
            MediaKind::Audio => {
                let mut form = form.part("audio", part);
                if let Some(title) = &delivery.title {
                    form = form.text("title", title.clone());
                }
                if let Some(performer) = &delivery.performer {
                    form = form.text("performer", performer.clone());
                }
                ("sendAudio", form)
            }
        };

        let response: ApiResponse<Message> = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(redact)?
            .json()
            .await
            .map_err(redact)?;

        response.into_result().map(|_| ())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call::<bool>("deleteMessage", body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str, alert: bool) -> Result<()> {
        let body = json!({
            "callback_query_id": callback_id,
            "text": text,
            "show_alert": alert,
        });
        self.call::<bool>("answerCallbackQuery", body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "action": action.as_str() });
        self.call::<bool>("sendChatAction", body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }
}
