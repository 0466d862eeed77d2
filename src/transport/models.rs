use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

pub type ChatId = i64;
pub type MessageId = i64;

/// Sender of an inbound message or button press
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ChatUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl ChatUser {
    /// `@username`, falling back to the first name
    pub fn handle(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{username}"),
            (None, Some(first_name)) => first_name.clone(),
            (None, None) => self.id.to_string(),
        }
    }
}

/// What the core reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Start {
        chat_id: ChatId,
        user: ChatUser,
    },
    Text {
        chat_id: ChatId,
        user: ChatUser,
        text: String,
    },
    /// A choice button was pressed; `data` is the selection token
    Callback {
        callback_id: String,
        chat_id: ChatId,
        user: ChatUser,
        data: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            InboundEvent::Start { chat_id, .. }
            | InboundEvent::Text { chat_id, .. }
            | InboundEvent::Callback { chat_id, .. } => *chat_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Start { .. } => "start",
            InboundEvent::Text { .. } => "text",
            InboundEvent::Callback { .. } => "callback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// One pressable choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadVideo,
    UploadAudio,
}

impl ChatAction {
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => ChatAction::UploadVideo,
            MediaKind::Audio => ChatAction::UploadAudio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatAction::Typing => "typing",
            ChatAction::UploadVideo => "upload_video",
            ChatAction::UploadAudio => "upload_audio",
        }
    }
}

/// A local file to send to a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDelivery {
    pub chat_id: ChatId,
    pub path: PathBuf,
    pub media_kind: MediaKind,
    pub caption: String,
    /// Audio metadata
    pub title: Option<String>,
    pub performer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_handle() {
        let mut user = ChatUser {
            id: 7,
            username: Some("ali".into()),
            first_name: Some("Ali".into()),
            language_code: None,
        };
        assert_eq!(user.handle(), "@ali");

        user.username = None;
        assert_eq!(user.handle(), "Ali");

        user.first_name = None;
        assert_eq!(user.handle(), "7");
    }

    #[test]
    fn test_chat_action_for_kind() {
        assert_eq!(ChatAction::for_kind(MediaKind::Video).as_str(), "upload_video");
        assert_eq!(ChatAction::for_kind(MediaKind::Audio).as_str(), "upload_audio");
    }
}
