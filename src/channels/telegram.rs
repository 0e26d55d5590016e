//! Telegram channel — long-polls the Bot API for updates.
//!
//! Thin typed client over the HTTP API: update polling, message sending
//! with Markdown fallback, inline keyboards, and callback answering.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Placeholder text for forwarded media without a caption.
const MEDIA_PLACEHOLDER: &str = "[Медиа без текста]";

// ── Update envelopes ────────────────────────────────────────────────

/// One update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A Telegram user.
#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    /// First and last name joined, like the Bot API's `full_name`.
    pub fn full_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// A Telegram chat (only the id is needed here).
#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

/// Origin of a forwarded message (Bot API ≥ 7.0).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardOrigin {
    User {
        sender_user: TgUser,
        date: i64,
    },
    HiddenUser {
        sender_user_name: String,
        date: i64,
    },
    Chat {
        date: i64,
    },
    Channel {
        date: i64,
    },
}

/// An inbound chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub forward_origin: Option<ForwardOrigin>,
    // Legacy pre-7.0 forward fields, still sent by some gateways.
    #[serde(default)]
    pub forward_from: Option<TgUser>,
    #[serde(default)]
    pub forward_sender_name: Option<String>,
    #[serde(default)]
    pub forward_date: Option<i64>,
}

impl TgMessage {
    /// Message body: text, caption, or a media placeholder.
    pub fn body(&self) -> String {
        self.text
            .clone()
            .or_else(|| self.caption.clone())
            .unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string())
    }

    /// Interpret this message as a forward, if it is one.
    ///
    /// Prefers `forward_origin`; falls back to the legacy flat fields.
    pub fn as_forwarded(&self) -> Option<ForwardedMessage> {
        let (sender_user, sender_name, date) = match &self.forward_origin {
            Some(ForwardOrigin::User { sender_user, date }) => {
                (Some(sender_user.clone()), None, Some(*date))
            }
            Some(ForwardOrigin::HiddenUser {
                sender_user_name,
                date,
            }) => (None, Some(sender_user_name.clone()), Some(*date)),
            Some(ForwardOrigin::Chat { date }) | Some(ForwardOrigin::Channel { date }) => {
                (None, None, Some(*date))
            }
            None => {
                // Legacy shape: forward_date marks the message as forwarded.
                self.forward_date?;
                (
                    self.forward_from.clone(),
                    self.forward_sender_name.clone(),
                    self.forward_date,
                )
            }
        };

        Some(ForwardedMessage {
            message_id: self.message_id,
            text: self.body(),
            forward_date: date.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            sender_user,
            sender_name,
        })
    }
}

/// A forwarded-message envelope as the intake engine consumes it.
#[derive(Debug, Clone)]
pub struct ForwardedMessage {
    /// Id of the forwarding message (not the original).
    pub message_id: i64,
    /// Text or caption of the original message.
    pub text: String,
    /// When the original message was sent.
    pub forward_date: Option<DateTime<Utc>>,
    /// Original sender, when their privacy settings expose the account.
    pub sender_user: Option<TgUser>,
    /// Free-text sender name for hidden accounts.
    pub sender_name: Option<String>,
}

/// An inline-button press.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Stream of typed updates from long polling.
pub type UpdateStream = std::pin::Pin<Box<dyn futures::Stream<Item = Update> + Send>>;

// ── API client ──────────────────────────────────────────────────────

/// Telegram Bot API client.
pub struct TelegramApi {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// POST a JSON body to a Bot API method, mapping failures to ChannelError.
    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::ApiFailed {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }

    /// Verify the token by calling `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::ApiFailed {
                method: "getMe".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::ApiFailed {
                method: "getMe".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk, None).await?;
        }
        Ok(())
    }

    /// Send a message with an inline keyboard attached.
    pub async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: serde_json::Value,
    ) -> Result<(), ChannelError> {
        self.send_message_chunk(chat_id, text, Some(keyboard)).await
    }

    /// Send a single chunk (≤4096 chars), Markdown-first with plain fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if let Some(ref kb) = keyboard {
            markdown_body["reply_markup"] = kb.clone();
        }

        let markdown_resp = self.call("sendMessage", &markdown_body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = kb;
        }

        let plain_resp = self.call("sendMessage", &plain_body).await?;
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                chat_id,
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }

        Ok(())
    }

    /// Replace the text (and keyboard) of a previously sent message.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = kb;
        }

        let resp = self.call("editMessageText", &body).await?;
        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::ApiFailed {
                method: "editMessageText".into(),
                reason: err,
            });
        }
        Ok(())
    }

    /// Answer a callback query, optionally with a toast text.
    pub async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
        }

        // Best effort — a stale callback id is not worth failing the handler.
        if let Err(e) = self.call("answerCallbackQuery", &body).await {
            tracing::debug!("answerCallbackQuery failed: {e}");
        }
        Ok(())
    }

    /// Show the "typing…" presence indicator in a chat.
    pub async fn send_typing(&self, chat_id: i64) {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        if let Err(e) = self.call("sendChatAction", &body).await {
            tracing::debug!("sendChatAction failed: {e}");
        }
    }

    /// Delete a message (used to retract a resolved prompt).
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        let resp = self.call("deleteMessage", &body).await?;
        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::ApiFailed {
                method: "deleteMessage".into(),
                reason: err,
            });
        }
        Ok(())
    }

    /// Start the long-poll loop and return a stream of typed updates.
    pub fn update_stream(&self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for raw in results {
                    if let Some(uid) = raw.get("update_id").and_then(serde_json::Value::as_i64) {
                        offset = uid + 1;
                    }

                    let update: Update = match serde_json::from_value(raw.clone()) {
                        Ok(u) => u,
                        Err(e) => {
                            tracing::warn!("Skipping unparseable update: {e}");
                            continue;
                        }
                    };

                    if tx.send(update).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|update| (update, rx))
        }))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let chunk = &remaining[..max_len];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(max_len);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { max_len } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_api_url() {
        let api = TelegramApi::new("123:ABC".into());
        assert_eq!(
            api.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn full_name_joins_parts() {
        let user = TgUser {
            id: 1,
            first_name: Some("Ivan".into()),
            last_name: Some("Petrov".into()),
            username: None,
        };
        assert_eq!(user.full_name(), "Ivan Petrov");

        let user = TgUser {
            id: 1,
            first_name: Some("Ivan".into()),
            last_name: None,
            username: None,
        };
        assert_eq!(user.full_name(), "Ivan");
    }

    // ── Forward envelope parsing ────────────────────────────────────

    fn parse_message(json: serde_json::Value) -> TgMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn forwarded_from_visible_user() {
        let msg = parse_message(serde_json::json!({
            "message_id": 10,
            "chat": {"id": 555},
            "text": "предложение о рекламе",
            "forward_origin": {
                "type": "user",
                "sender_user": {"id": 42, "first_name": "Ivan", "username": "ivan"},
                "date": 1700000000
            }
        }));

        let fwd = msg.as_forwarded().unwrap();
        assert_eq!(fwd.message_id, 10);
        assert_eq!(fwd.text, "предложение о рекламе");
        assert_eq!(fwd.sender_user.as_ref().map(|u| u.id), Some(42));
        assert!(fwd.sender_name.is_none());
        assert!(fwd.forward_date.is_some());
    }

    #[test]
    fn forwarded_from_hidden_user() {
        let msg = parse_message(serde_json::json!({
            "message_id": 11,
            "chat": {"id": 555},
            "text": "привет",
            "forward_origin": {
                "type": "hidden_user",
                "sender_user_name": "Ivan Petrov",
                "date": 1700000000
            }
        }));

        let fwd = msg.as_forwarded().unwrap();
        assert!(fwd.sender_user.is_none());
        assert_eq!(fwd.sender_name.as_deref(), Some("Ivan Petrov"));
    }

    #[test]
    fn forwarded_legacy_fields() {
        let msg = parse_message(serde_json::json!({
            "message_id": 12,
            "chat": {"id": 555},
            "text": "привет",
            "forward_from": {"id": 42, "first_name": "Ivan"},
            "forward_date": 1700000000
        }));

        let fwd = msg.as_forwarded().unwrap();
        assert_eq!(fwd.sender_user.as_ref().map(|u| u.id), Some(42));
    }

    #[test]
    fn forwarded_channel_post_is_fully_anonymous() {
        let msg = parse_message(serde_json::json!({
            "message_id": 13,
            "chat": {"id": 555},
            "text": "пост",
            "forward_origin": {"type": "channel", "date": 1700000000}
        }));

        let fwd = msg.as_forwarded().unwrap();
        assert!(fwd.sender_user.is_none());
        assert!(fwd.sender_name.is_none());
    }

    #[test]
    fn plain_message_is_not_forwarded() {
        let msg = parse_message(serde_json::json!({
            "message_id": 14,
            "chat": {"id": 555},
            "text": "/leads"
        }));
        assert!(msg.as_forwarded().is_none());
    }

    #[test]
    fn caption_fallback_and_media_placeholder() {
        let msg = parse_message(serde_json::json!({
            "message_id": 15,
            "chat": {"id": 555},
            "caption": "подпись к фото",
            "forward_origin": {"type": "hidden_user", "sender_user_name": "X", "date": 1}
        }));
        assert_eq!(msg.as_forwarded().unwrap().text, "подпись к фото");

        let msg = parse_message(serde_json::json!({
            "message_id": 16,
            "chat": {"id": 555},
            "forward_origin": {"type": "hidden_user", "sender_user_name": "X", "date": 1}
        }));
        assert_eq!(msg.as_forwarded().unwrap().text, MEDIA_PLACEHOLDER);
    }

    #[test]
    fn callback_query_parses() {
        let cb: CallbackQuery = serde_json::from_value(serde_json::json!({
            "id": "cb-1",
            "from": {"id": 77, "first_name": "Anna"},
            "message": {"message_id": 20, "chat": {"id": 555}, "text": "card"},
            "data": "status:3:replied"
        }))
        .unwrap();

        assert_eq!(cb.from.id, 77);
        assert_eq!(cb.data.as_deref(), Some("status:3:replied"));
        assert_eq!(cb.message.as_ref().map(|m| m.chat.id), Some(555));
    }

    #[test]
    fn update_with_unknown_fields_parses() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": 2}, "text": "hi", "entities": []},
            "some_future_field": {"x": 1}
        }))
        .unwrap();
        assert_eq!(update.update_id, 1);
        assert!(update.callback_query.is_none());
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }
}
