//! Fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::data::models::{Card, DeliveryError, WordPair};
use crate::messaging::{Messenger, OutgoingDocument, OutgoingMessage};

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

pub fn pair(front: &str, back: &str) -> WordPair {
    WordPair {
        front: front.to_string(),
        back: back.to_string(),
    }
}

/// A card of owner 1, due at `t0()`.
pub fn card(card_id: i32, ease_factor: f64, interval_days: i32, repetitions: i32) -> Card {
    Card {
        card_id,
        owner_id: 1,
        front: format!("front{card_id}"),
        back: format!("back{card_id}"),
        ease_factor,
        interval_days,
        repetitions,
        due_at: t0(),
        last_reviewed_at: None,
        created_at: t0(),
    }
}

/// Keeps every message instead of sending it. Chats listed in
/// `failing` get a rejection; `files` serves uploads by file id.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<OutgoingMessage>>,
    documents: Mutex<Vec<OutgoingDocument>>,
    answered: Mutex<Vec<String>>,
    failing: HashSet<i64>,
    files: HashMap<String, Vec<u8>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chat_ids: &[i64]) -> Self {
        Self {
            failing: chat_ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file_id: &str, content: &str) -> Self {
        self.files.insert(file_id.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    pub fn documents(&self) -> Vec<OutgoingDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn answered_callbacks(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, message: OutgoingMessage) -> Result<(), DeliveryError> {
        if self.failing.contains(&message.chat_id) {
            return Err(DeliveryError::Rejected("Forbidden: bot was blocked by the user".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn send_document(&self, document: OutgoingDocument) -> Result<(), DeliveryError> {
        if self.failing.contains(&document.chat_id) {
            return Err(DeliveryError::Rejected("Forbidden: bot was blocked by the user".into()));
        }
        self.documents.lock().unwrap().push(document);
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| DeliveryError::Rejected(format!("Bad Request: unknown file {file_id}")))
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}
