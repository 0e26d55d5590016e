//! Bot dispatcher — wires the Telegram update stream to commands,
//! callbacks, forwarded-message intake, and the edit flow.

pub mod callbacks;
pub mod commands;
pub mod edit;
pub mod format;
pub mod keyboards;
pub mod outbound;

pub use outbound::TelegramOutbound;

use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info};

use crate::channels::{TelegramApi, TgMessage, Update};
use crate::config::BotConfig;
use crate::error::Result;
use crate::intake::IntakeEngine;
use crate::store::{Lead, LeadStore};

/// The bot: one long-poll loop dispatching updates to handlers.
pub struct Bot {
    pub(crate) api: Arc<TelegramApi>,
    pub(crate) store: Arc<dyn LeadStore>,
    pub(crate) intake: Arc<IntakeEngine>,
    pub(crate) edits: edit::EditSessions,
    pub(crate) config: BotConfig,
}

impl Bot {
    pub fn new(
        api: Arc<TelegramApi>,
        store: Arc<dyn LeadStore>,
        intake: Arc<IntakeEngine>,
        config: BotConfig,
    ) -> Self {
        Self {
            api,
            store,
            intake,
            edits: edit::EditSessions::new(),
            config,
        }
    }

    /// Run the dispatch loop until the update stream closes.
    ///
    /// Failures of individual updates are logged and do not stop the loop.
    pub async fn run(&self) -> Result<()> {
        info!("Bot starting...");
        let mut updates = self.api.update_stream();

        while let Some(update) = updates.next().await {
            if let Err(e) = self.dispatch(update).await {
                error!("Update handling failed: {e}");
            }
        }

        info!("Update stream closed, bot stopping");
        Ok(())
    }

    async fn dispatch(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            self.handle_message(message).await?;
        } else if let Some(cb) = update.callback_query {
            self.handle_callback(cb).await?;
        }
        Ok(())
    }

    /// Route an inbound message: forwards go to intake, then commands,
    /// then a possible pending edit value.
    async fn handle_message(&self, message: TgMessage) -> Result<()> {
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        let user_id = from.id;
        let chat_id = message.chat.id;

        if let Some(envelope) = message.as_forwarded() {
            self.intake.ingest(user_id, chat_id, &envelope).await;
            return Ok(());
        }

        let text = message.text.as_deref().unwrap_or("").trim().to_string();

        if text == "/start" {
            return self.cmd_start(user_id, chat_id, None).await;
        }
        if let Some(rest) = text.strip_prefix("/start ") {
            return self.cmd_start(user_id, chat_id, non_empty(rest)).await;
        }
        if text == "/leads" {
            return self.cmd_leads(user_id, chat_id).await;
        }
        if text == "/search" {
            return self.cmd_search(user_id, chat_id, "").await;
        }
        if let Some(query) = text.strip_prefix("/search ") {
            return self.cmd_search(user_id, chat_id, query).await;
        }
        if text == "/stats" {
            return self.cmd_stats(user_id, chat_id).await;
        }

        if let Some(session) = self.edits.get(user_id).await {
            return self.handle_edit_value(user_id, chat_id, session, &text).await;
        }

        // Anything else is ignored, like the rest of the chat noise.
        Ok(())
    }

    /// Consume the next message from a user with an active edit session.
    async fn handle_edit_value(
        &self,
        user_id: i64,
        chat_id: i64,
        session: edit::EditSession,
        text: &str,
    ) -> Result<()> {
        self.edits.clear(user_id).await;

        if edit::is_cancel(text) {
            match self.store.get_lead(session.lead_id, user_id).await? {
                Some(lead) => {
                    let count = self.store.get_messages(lead.id).await?.len();
                    self.api
                        .send_message_with_keyboard(
                            chat_id,
                            &format!(
                                "❌ Редактирование отменено.\n\n{}",
                                format::format_lead(&lead, count)
                            ),
                            keyboards::lead_keyboard(lead.id, lead.is_hot),
                        )
                        .await?;
                }
                None => {
                    self.api
                        .send_message(chat_id, "❌ Редактирование отменено.")
                        .await?;
                }
            }
            return Ok(());
        }

        self.store
            .update_field(session.lead_id, user_id, session.field, text.trim())
            .await?;
        info!(
            user_id,
            lead_id = session.lead_id,
            field = session.field.as_str(),
            "Lead field edited"
        );

        let Some(lead) = self.store.get_lead(session.lead_id, user_id).await? else {
            self.api.send_message(chat_id, "❌ Лид не найден.").await?;
            return Ok(());
        };
        let count = self.store.get_messages(lead.id).await?.len();
        self.api
            .send_message_with_keyboard(
                chat_id,
                &format!("✅ Обновлено!\n\n{}", format::format_lead(&lead, count)),
                keyboards::lead_keyboard(lead.id, lead.is_hot),
            )
            .await?;
        Ok(())
    }

    /// Re-render a lead card in place.
    pub(crate) async fn render_lead_card(
        &self,
        chat_id: i64,
        message_id: i64,
        lead: &Lead,
    ) -> Result<()> {
        let count = self.store.get_messages(lead.id).await?.len();
        self.api
            .edit_message_text(
                chat_id,
                message_id,
                &format::format_lead(lead, count),
                Some(keyboards::lead_keyboard(lead.id, lead.is_hot)),
            )
            .await?;
        Ok(())
    }
}

/// `Some(trimmed)` when the command tail has content.
fn non_empty(rest: &str) -> Option<&str> {
    let trimmed = rest.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(" lead_4 "), Some("lead_4"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }
}
