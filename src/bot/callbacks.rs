//! Callback-query handlers — inline button presses on lead cards and prompts.

use tracing::info;

use crate::bot::{Bot, format, keyboards};
use crate::channels::CallbackQuery;
use crate::error::{Error, IntakeError, Result};
use crate::store::{EditableField, LeadStatus, LeadStore};

/// Toast shown when a button references data that is no longer there.
const NOT_FOUND_LEAD: &str = "Лид не найден";
const NOT_FOUND_MESSAGES: &str = "Сообщения не найдены";

impl Bot {
    /// Route one callback query by its data prefix.
    pub(crate) async fn handle_callback(&self, cb: CallbackQuery) -> Result<()> {
        let user_id = cb.from.id;
        let (Some(data), Some(message)) = (cb.data.as_deref(), cb.message.as_ref()) else {
            self.api.answer_callback(&cb.id, None).await?;
            return Ok(());
        };
        let chat_id = message.chat.id;
        let message_id = message.message_id;

        if let Some(rest) = data.strip_prefix("status:") {
            let Some((lead_id, status)) = rest
                .split_once(':')
                .and_then(|(id, s)| Some((id.parse().ok()?, LeadStatus::parse(s))))
            else {
                self.api.answer_callback(&cb.id, None).await?;
                return Ok(());
            };
            self.change_status(&cb.id, user_id, chat_id, message_id, lead_id, status)
                .await
        } else if let Some(lead_id) = parse_id(data, "toggle_hot:") {
            self.toggle_hot(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if let Some(lead_id) = parse_id(data, "originals:") {
            self.show_originals(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if let Some(lead_id) = parse_id(data, "back:")
            .or_else(|| parse_id(data, "view_lead:"))
        {
            self.back_to_lead(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if let Some(lead_id) = parse_id(data, "edit:") {
            self.show_edit_menu(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if let Some(rest) = data.strip_prefix("edit_field:") {
            let Some((lead_id, field)) = rest
                .split_once(':')
                .and_then(|(id, f)| Some((id.parse().ok()?, EditableField::parse(f)?)))
            else {
                self.api.answer_callback(&cb.id, None).await?;
                return Ok(());
            };
            self.start_field_edit(&cb.id, user_id, chat_id, message_id, lead_id, field)
                .await
        } else if let Some(lead_id) = parse_id(data, "cancel_edit:") {
            self.cancel_field_edit(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if let Some(lead_id) = parse_id(data, "add_to_lead:") {
            self.resolve_merge_callback(&cb.id, user_id, chat_id, message_id, lead_id)
                .await
        } else if data == "create_new_lead" {
            self.resolve_create_callback(&cb.id, user_id, chat_id, message_id)
                .await
        } else {
            self.api.answer_callback(&cb.id, None).await?;
            Ok(())
        }
    }

    // ── Lead card actions ───────────────────────────────────────────

    async fn change_status(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
        status: LeadStatus,
    ) -> Result<()> {
        self.store.update_status(lead_id, user_id, status).await?;

        let Some(lead) = self.store.get_lead(lead_id, user_id).await? else {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        };
        self.render_lead_card(chat_id, message_id, &lead).await?;
        self.api.answer_callback(cb_id, Some("Статус изменён")).await?;
        Ok(())
    }

    async fn toggle_hot(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        let new_value = match self.store.toggle_hot(lead_id, user_id).await {
            Ok(v) => v,
            Err(crate::error::DatabaseError::NotFound { .. }) => {
                self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(lead) = self.store.get_lead(lead_id, user_id).await? else {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        };
        self.render_lead_card(chat_id, message_id, &lead).await?;
        self.api
            .answer_callback(cb_id, Some(if new_value { "🔥 Важный!" } else { "Снято" }))
            .await?;
        Ok(())
    }

    async fn show_originals(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        if self.store.get_lead(lead_id, user_id).await?.is_none() {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        }

        let messages = self.store.get_messages(lead_id).await?;
        let mut text = format::format_originals(&messages);
        if text.chars().count() > 4000 {
            text = text.chars().take(4000).collect::<String>() + "\n\n... (сообщение обрезано)";
        }

        self.api
            .edit_message_text(chat_id, message_id, &text, Some(keyboards::back_keyboard(lead_id)))
            .await?;
        self.api.answer_callback(cb_id, None).await?;
        Ok(())
    }

    async fn back_to_lead(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        let Some(lead) = self.store.get_lead(lead_id, user_id).await? else {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        };
        self.render_lead_card(chat_id, message_id, &lead).await?;
        self.api.answer_callback(cb_id, None).await?;
        Ok(())
    }

    // ── Field editing ───────────────────────────────────────────────

    async fn show_edit_menu(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        if self.store.get_lead(lead_id, user_id).await?.is_none() {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        }

        self.api
            .edit_message_text(
                chat_id,
                message_id,
                "✏️ Выберите поле для редактирования:",
                Some(keyboards::edit_keyboard(lead_id)),
            )
            .await?;
        self.api.answer_callback(cb_id, None).await?;
        Ok(())
    }

    async fn start_field_edit(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
        field: EditableField,
    ) -> Result<()> {
        if self.store.get_lead(lead_id, user_id).await?.is_none() {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        }

        self.edits.begin(user_id, lead_id, field).await;

        let text = format!(
            "✏️ Редактирование: {}\n\n💡 {}\n\nВведите новое значение или нажмите Отмена:",
            field.display_name(),
            field.hint(),
        );
        self.api
            .edit_message_text(
                chat_id,
                message_id,
                &text,
                Some(keyboards::cancel_edit_keyboard(lead_id)),
            )
            .await?;
        self.api.answer_callback(cb_id, None).await?;
        Ok(())
    }

    async fn cancel_field_edit(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        self.edits.clear(user_id).await;

        let Some(lead) = self.store.get_lead(lead_id, user_id).await? else {
            self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            return Ok(());
        };
        self.render_lead_card(chat_id, message_id, &lead).await?;
        self.api
            .answer_callback(cb_id, Some("Редактирование отменено"))
            .await?;
        Ok(())
    }

    // ── Merge-or-create resolution ──────────────────────────────────

    async fn resolve_merge_callback(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
        lead_id: i64,
    ) -> Result<()> {
        match self.intake.resolve_merge(user_id, chat_id, lead_id).await {
            Ok(outcome) => {
                info!(user_id, lead_id, added = outcome.added, "Batch merged into lead");
                let text = format!(
                    "📎 Добавлено {} сообщений!\n\n{}",
                    outcome.added,
                    format::format_lead(&outcome.lead, outcome.total_messages),
                );
                self.api
                    .edit_message_text(
                        chat_id,
                        message_id,
                        &text,
                        Some(keyboards::lead_keyboard(outcome.lead.id, outcome.lead.is_hot)),
                    )
                    .await?;
                self.api.answer_callback(cb_id, None).await?;
            }
            Err(IntakeError::NoPendingDecision { .. }) => {
                self.api
                    .answer_callback(cb_id, Some(NOT_FOUND_MESSAGES))
                    .await?;
            }
            Err(IntakeError::LeadNotFound { .. }) => {
                self.api.answer_callback(cb_id, Some(NOT_FOUND_LEAD)).await?;
            }
            Err(e) => return Err(Error::Intake(e)),
        }
        Ok(())
    }

    async fn resolve_create_callback(
        &self,
        cb_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<()> {
        match self.intake.resolve_create_new(user_id, chat_id).await {
            Ok(lead) => {
                info!(user_id, lead_id = lead.id, "Batch resolved to a new lead");
                // The new-lead announcement was already sent; retract the prompt.
                if let Err(e) = self.api.delete_message(chat_id, message_id).await {
                    tracing::debug!("Could not delete merge prompt: {e}");
                }
                self.api.answer_callback(cb_id, None).await?;
            }
            Err(IntakeError::NoPendingDecision { .. }) => {
                self.api
                    .answer_callback(cb_id, Some(NOT_FOUND_MESSAGES))
                    .await?;
            }
            Err(e) => return Err(Error::Intake(e)),
        }
        Ok(())
    }
}

/// Parse `"{prefix}{i64}"` callback data.
fn parse_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}
