use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::data::models::DeliveryError;
use crate::messaging::{Button, Messenger, OutgoingDocument, OutgoingMessage};

// Message bodies are rendered by HTML-escaping templates.
const PARSE_MODE: &str = "HTML";

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: &'a [Vec<Button>],
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct GetFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse<R> {
    ok: bool,
    description: Option<String>,
    result: Option<R>,
}

/// Bot API client for outgoing messages and file downloads
pub struct TelegramMessenger {
    client: reqwest::Client,
    base_url: String,
    file_url: String,
}

impl TelegramMessenger {
    pub fn new(api_url: &str, token: &str) -> Self {
        let api_url = api_url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_url, token),
            file_url: format!("{}/file/bot{}", api_url, token),
        }
    }

    async fn read_response<R: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<Option<R>, DeliveryError> {
        let status = response.status();
        let parsed: ApiResponse<R> = response.json().await?;
        if !parsed.ok {
            return Err(DeliveryError::Rejected(
                parsed
                    .description
                    .unwrap_or_else(|| format!("{method} failed with status {status}")),
            ));
        }
        Ok(parsed.result)
    }

    async fn call<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<Option<R>, DeliveryError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await?;
        Self::read_response(method, response).await
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, message: OutgoingMessage) -> Result<(), DeliveryError> {
        let reply_markup = if message.keyboard.is_empty() {
            None
        } else {
            Some(InlineKeyboard {
                inline_keyboard: &message.keyboard,
            })
        };
        let request = SendMessageRequest {
            chat_id: message.chat_id,
            text: &message.text,
            parse_mode: PARSE_MODE,
            reply_markup,
        };
        self.call::<_, serde_json::Value>("sendMessage", &request).await?;
        Ok(())
    }

    async fn send_document(&self, document: OutgoingDocument) -> Result<(), DeliveryError> {
        let part = Part::bytes(document.content)
            .file_name(document.filename)
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("chat_id", document.chat_id.to_string())
            .text("caption", document.caption)
            .text("parse_mode", PARSE_MODE)
            .part("document", part);

        let response = self
            .client
            .post(format!("{}/sendDocument", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Self::read_response::<serde_json::Value>("sendDocument", response).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, DeliveryError> {
        let info: Option<FileInfo> = self.call("getFile", &GetFileRequest { file_id }).await?;
        let file_path = info
            .and_then(|info| info.file_path)
            .ok_or_else(|| DeliveryError::Rejected(format!("no download path for file {file_id}")))?;

        let response = self
            .client
            .get(format!("{}/{}", self.file_url, file_path))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError> {
        self.call::<_, serde_json::Value>(
            "answerCallbackQuery",
            &AnswerCallbackRequest {
                callback_query_id: callback_id,
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_serializes_as_inline_markup() {
        let keyboard = vec![vec![Button::new("Show answer", "q:abc")]];
        let request = SendMessageRequest {
            chat_id: 42,
            text: "hi",
            parse_mode: PARSE_MODE,
            reply_markup: Some(InlineKeyboard {
                inline_keyboard: &keyboard,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["chat_id"], 42);
        assert_eq!(
            json["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "q:abc"
        );
    }

    #[test]
    fn plain_message_omits_reply_markup() {
        let request = SendMessageRequest {
            chat_id: 1,
            text: "hi",
            parse_mode: PARSE_MODE,
            reply_markup: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("reply_markup").is_none());
    }

    #[test]
    fn urls_drop_trailing_slash() {
        let messenger = TelegramMessenger::new("https://api.telegram.org/", "T0KEN");
        assert_eq!(messenger.base_url, "https://api.telegram.org/botT0KEN");
        assert_eq!(messenger.file_url, "https://api.telegram.org/file/botT0KEN");
    }

    #[test]
    fn api_error_carries_description() {
        let parsed: ApiResponse<FileInfo> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: file is too big"}"#,
        )
        .unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.description.as_deref(), Some("Bad Request: file is too big"));
        assert!(parsed.result.is_none());
    }
}
