//! Telegram implementation of the intake engine's outbound surface.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::bot::{format, keyboards};
use crate::channels::TelegramApi;
use crate::intake::Outbound;
use crate::store::Lead;

/// Sends intake-engine notifications through the Bot API. Best effort:
/// failures are logged, never propagated into the engine.
pub struct TelegramOutbound {
    api: Arc<TelegramApi>,
}

impl TelegramOutbound {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_typing(&self, chat_id: i64) {
        self.api.send_typing(chat_id).await;
    }

    async fn announce_new_lead(&self, chat_id: i64, lead: &Lead, message_count: usize) {
        let text = format::format_new_lead(lead, message_count);
        if let Err(e) = self
            .api
            .send_message_with_keyboard(chat_id, &text, keyboards::lead_keyboard(lead.id, lead.is_hot))
            .await
        {
            warn!(chat_id, lead_id = lead.id, "Failed to announce new lead: {e}");
        }
    }

    async fn prompt_merge(&self, chat_id: i64, candidate: &Lead) {
        let text = format!(
            "🔄 Найден недавний лид от этого контакта:\n#{} — {}\n\n\
             Добавить сообщения к существующему лиду?",
            candidate.id,
            candidate.brand_label(),
        );
        if let Err(e) = self
            .api
            .send_message_with_keyboard(
                chat_id,
                &text,
                keyboards::add_to_lead_keyboard(candidate.id, candidate.brand_label()),
            )
            .await
        {
            warn!(chat_id, candidate_id = candidate.id, "Failed to send merge prompt: {e}");
        }
    }
}
