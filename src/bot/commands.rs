//! Command handlers — /start (with deep links), /leads, /search, /stats.

use std::sync::OnceLock;

use regex::Regex;

use crate::bot::{Bot, format, keyboards};
use crate::error::Result;
use crate::store::LeadStore;

/// Deep-link payload carried in /start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartParam {
    /// Open a specific lead: `lead_<id>` (an optional `_page_<n>` suffix is
    /// accepted and ignored — the card view has no pages).
    Lead(i64),
    /// Open a page of the lead list: `leads_page_<n>`.
    LeadsPage(usize),
}

/// Parse the argument of a /start deep link.
pub fn parse_start_param(arg: &str) -> Option<StartParam> {
    static LEAD_RE: OnceLock<Regex> = OnceLock::new();
    static PAGE_RE: OnceLock<Regex> = OnceLock::new();

    let lead_re = LEAD_RE.get_or_init(|| Regex::new(r"^lead_(\d+)").expect("valid regex"));
    let page_re =
        PAGE_RE.get_or_init(|| Regex::new(r"^leads_page_(\d+)$").expect("valid regex"));

    if let Some(caps) = lead_re.captures(arg) {
        return caps[1].parse().ok().map(StartParam::Lead);
    }
    if let Some(caps) = page_re.captures(arg) {
        return caps[1].parse().ok().map(StartParam::LeadsPage);
    }
    None
}

impl Bot {
    /// /start — greeting, or a deep link into a lead or list page.
    pub(crate) async fn cmd_start(
        &self,
        user_id: i64,
        chat_id: i64,
        arg: Option<&str>,
    ) -> Result<()> {
        match arg.and_then(parse_start_param) {
            Some(StartParam::Lead(lead_id)) => {
                let Some(lead) = self.store.get_lead(lead_id, user_id).await? else {
                    self.api
                        .send_message(chat_id, "❌ Лид не найден или у вас нет доступа.")
                        .await?;
                    return Ok(());
                };
                let count = self.store.get_messages(lead_id).await?.len();
                self.api
                    .send_message_with_keyboard(
                        chat_id,
                        &format::format_lead(&lead, count),
                        keyboards::lead_keyboard(lead.id, lead.is_hot),
                    )
                    .await?;
            }
            Some(StartParam::LeadsPage(page)) => {
                self.show_leads_page(user_id, chat_id, page).await?;
            }
            None => {
                self.api
                    .send_message(chat_id, format::format_greeting())
                    .await?;
            }
        }
        Ok(())
    }

    /// /leads — the paginated list.
    pub(crate) async fn cmd_leads(&self, user_id: i64, chat_id: i64) -> Result<()> {
        self.show_leads_page(user_id, chat_id, 1).await
    }

    pub(crate) async fn show_leads_page(
        &self,
        user_id: i64,
        chat_id: i64,
        page: usize,
    ) -> Result<()> {
        let leads = self.store.list_leads(user_id).await?;
        if leads.is_empty() {
            self.api.send_message(chat_id, "📋 Нет лидов.").await?;
            return Ok(());
        }

        let (text, total_pages) = format::format_leads_page(
            &leads,
            page,
            self.config.leads_per_page,
            &self.config.bot_username,
        );

        match keyboards::leads_pagination_keyboard(&self.config.bot_username, page, total_pages) {
            Some(keyboard) => {
                self.api
                    .send_message_with_keyboard(chat_id, &text, keyboard)
                    .await?
            }
            None => self.api.send_message(chat_id, &text).await?,
        }
        Ok(())
    }

    /// /search <query> — match brand, contact name or username.
    pub(crate) async fn cmd_search(&self, user_id: i64, chat_id: i64, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            self.api
                .send_message(chat_id, "Использование: /search <запрос>")
                .await?;
            return Ok(());
        }

        let leads = self.store.search(user_id, query).await?;
        if leads.is_empty() {
            self.api
                .send_message(chat_id, &format!("🔍 По запросу «{query}» ничего не найдено."))
                .await?;
            return Ok(());
        }

        let mut text = format!("🔍 Результаты по «{query}»:\n\n");
        for lead in &leads {
            text.push_str(&format::format_lead_short(lead));
            text.push('\n');
        }
        self.api.send_message(chat_id, &text).await?;
        Ok(())
    }

    /// /stats — conversion statistics.
    pub(crate) async fn cmd_stats(&self, user_id: i64, chat_id: i64) -> Result<()> {
        let stats = self.store.stats(user_id).await?;
        self.api
            .send_message(chat_id, &format::format_stats(&stats))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lead_deep_link() {
        assert_eq!(parse_start_param("lead_42"), Some(StartParam::Lead(42)));
        assert_eq!(
            parse_start_param("lead_42_page_2"),
            Some(StartParam::Lead(42))
        );
    }

    #[test]
    fn parses_leads_page_deep_link() {
        assert_eq!(
            parse_start_param("leads_page_3"),
            Some(StartParam::LeadsPage(3))
        );
    }

    #[test]
    fn rejects_unknown_params() {
        assert_eq!(parse_start_param("lead_abc"), None);
        assert_eq!(parse_start_param("leads_page_"), None);
        assert_eq!(parse_start_param("promo"), None);
        assert_eq!(parse_start_param(""), None);
    }
}
