//! The outbound half of the messaging collaborator.
//!
//! Chat ids are actor ids: every actor talks to the bot in a private chat.
//! The admin chat id comes from the settings.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Keyboard {
    #[default]
    None,
    /// Buttons attached to the message; pressing one yields a button event.
    Inline(Vec<Vec<Button>>),
    /// Canned replies shown in place of the keyboard.
    Reply(Vec<Vec<String>>),
    /// Hide a previously shown reply keyboard.
    Remove,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    pub fn with_inline(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.keyboard = Keyboard::Inline(rows);
        self
    }

    pub fn with_reply(mut self, rows: &[&[&str]]) -> Self {
        self.keyboard = Keyboard::Reply(
            rows.iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
        );
        self
    }

    pub fn removing_keyboard(mut self) -> Self {
        self.keyboard = Keyboard::Remove;
        self
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// A file sent as an attachment, e.g. a CSV export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub content: Vec<u8>,
    pub caption: Option<String>,
}

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("delivery to chat {chat_id} failed: {reason}")]
    Delivery { chat_id: i64, reason: String },
    #[error("button acknowledgement failed: {0}")]
    Acknowledge(String),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, message: OutboundMessage)
    -> Result<(), MessengerError>;

    async fn send_document(&self, chat_id: i64, document: Document)
    -> Result<(), MessengerError>;

    /// Re-sends a photo already known to the messaging surface.
    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), MessengerError>;

    async fn answer_button(&self, callback_id: &str, text: Option<&str>)
    -> Result<(), MessengerError>;
}
