pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;

use crate::data::models::DeliveryError;

pub use telegram::TelegramMessenger;

/// Inline button attached to a message; pressing it sends `callback_data` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// A file sent as an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDocument {
    pub chat_id: i64,
    pub filename: String,
    pub caption: String,
    pub content: Vec<u8>,
}

/// Outbound side of the chat transport
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<(), DeliveryError>;

    async fn send_document(&self, document: OutgoingDocument) -> Result<(), DeliveryError>;

    /// Fetches the content of a file the user uploaded.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError>;

    /// Acknowledges a button press so the client stops its spinner.
    async fn answer_callback(&self, _callback_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}
