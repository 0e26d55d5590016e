//! Message formatters — user-facing text for lead cards, lists and stats.

use crate::store::{Lead, LeadMessage, LeadStats, LeadStatus};

/// Maximum brand length in list lines before truncation.
const BRAND_MAX_CHARS: usize = 25;

/// Format a lead card.
pub fn format_lead(lead: &Lead, message_count: usize) -> String {
    let hot_badge = if lead.is_hot { "🔥 " } else { "" };

    format!(
        "{hot_badge}📥 Лид #{id}\n\n\
         🏢 Бренд: {brand}\n\
         📝 Запрос: {request}\n\
         👤 Контакт: {contact}\n\
         📅 Даты: {dates}\n\
         📨 Сообщений: {message_count}\n\n\
         📊 Статус: {emoji} {status}",
        id = lead.id,
        brand = lead.brand.as_deref().unwrap_or("—"),
        request = lead.request.as_deref().unwrap_or("—"),
        contact = lead.contact_name.as_deref().unwrap_or("—"),
        dates = lead.dates.as_deref().unwrap_or("—"),
        emoji = lead.status.emoji(),
        status = lead.status.display_name(),
    )
}

/// Format the announcement for a freshly created lead.
pub fn format_new_lead(lead: &Lead, message_count: usize) -> String {
    format!(
        "📥 Новый лид!\n\n\
         🏢 Бренд: {brand}\n\
         📝 Запрос: {request}\n\
         👤 Контакт: {contact}\n\
         📅 Даты: {dates}\n\
         📨 Сообщений: {message_count}\n\n\
         📊 Статус: {emoji} {status}",
        brand = lead.brand.as_deref().unwrap_or("—"),
        request = lead.request.as_deref().unwrap_or("—"),
        contact = lead.contact_name.as_deref().unwrap_or("—"),
        dates = lead.dates.as_deref().unwrap_or("—"),
        emoji = lead.status.emoji(),
        status = lead.status.display_name(),
    )
}

/// One-line lead summary for search results.
pub fn format_lead_short(lead: &Lead) -> String {
    let mut line = format!(
        "{} #{} {}",
        lead.status.emoji(),
        lead.id,
        lead.brand.as_deref().unwrap_or("Без бренда"),
    );
    if let Some(contact) = lead.contact_name.as_deref() {
        line.push_str(&format!(" ({contact})"));
    }
    line
}

/// Format a lead's original messages for display.
pub fn format_originals(messages: &[LeadMessage]) -> String {
    if messages.is_empty() {
        return "Нет сохранённых сообщений.".to_string();
    }

    let mut out = String::from("📜 Оригинальные сообщения:\n\n");
    for (i, msg) in messages.iter().enumerate() {
        let date_str = msg
            .forward_date
            .map(|d| format!(" | {}", d.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        out.push_str(&format!("— Сообщение {}{} —\n", i + 1, date_str));
        out.push_str(&msg.raw_text);
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

/// Format conversion statistics.
pub fn format_stats(stats: &LeadStats) -> String {
    let mut out = String::from("📊 Статистика CRM\n\n");
    out.push_str(&format!("📥 Всего лидов: {}\n", stats.total_leads));
    out.push_str(&format!("📨 Всего сообщений: {}\n\n", stats.total_messages));

    out.push_str("По статусам:\n");
    for status in LeadStatus::ALL {
        let count = stats.by_status.get(&status).copied().unwrap_or(0);
        out.push_str(&format!(
            "{} {}: {}\n",
            status.emoji(),
            status.display_name(),
            count
        ));
    }

    let contracts = stats
        .by_status
        .get(&LeadStatus::Contract)
        .copied()
        .unwrap_or(0);
    if stats.total_leads > 0 {
        let rate = (contracts as f64 / stats.total_leads as f64) * 100.0;
        out.push_str(&format!("\n✅ Конверсия в контракт: {rate:.1}%"));
    }

    out
}

/// Format one page of the lead list as deep links, hot leads first, the
/// rest grouped by status. Returns the text and the total page count.
pub fn format_leads_page(
    leads: &[Lead],
    page: usize,
    per_page: usize,
    bot_username: &str,
) -> (String, usize) {
    // Hot leads first, then the display-order status groups.
    let mut ordered: Vec<(&'static str, &Lead)> = leads
        .iter()
        .filter(|l| l.is_hot)
        .map(|l| ("🔥 ВАЖНЫЕ", l))
        .collect();
    for status in LeadStatus::DISPLAY_ORDER {
        ordered.extend(
            leads
                .iter()
                .filter(|l| !l.is_hot && l.status == status)
                .map(|l| (status.display_name(), l)),
        );
    }

    let total_pages = ordered.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let page_slice = ordered
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page);

    let mut lines = vec!["📋 *Все лиды:*\n".to_string()];
    let mut current_section = "";
    for &(section, lead) in page_slice {
        if section != current_section {
            current_section = section;
            if section == "🔥 ВАЖНЫЕ" {
                lines.push("\n*🔥 ВАЖНЫЕ*".to_string());
            } else {
                lines.push(format!(
                    "\n*{} {}*",
                    lead.status.emoji(),
                    section.to_uppercase()
                ));
            }
        }
        lines.push(lead_link_line(lead, bot_username));
    }

    if total_pages > 1 {
        lines.push(format!("\n📄 Страница {page}/{total_pages}"));
    }

    (lines.join("\n"), total_pages)
}

/// One clickable deep-link line for the lead list.
fn lead_link_line(lead: &Lead, bot_username: &str) -> String {
    let hot_badge = if lead.is_hot { "🔥" } else { "" };
    format!(
        "[{hot_badge}{} #{} {}](https://t.me/{bot_username}?start=lead_{})",
        lead.status.emoji(),
        lead.id,
        truncate_brand(lead.brand.as_deref().unwrap_or("Без бренда")),
        lead.id,
    )
}

/// Truncate long brand names for list lines (character-based, not bytes).
fn truncate_brand(brand: &str) -> String {
    if brand.chars().count() > BRAND_MAX_CHARS {
        let short: String = brand.chars().take(BRAND_MAX_CHARS - 3).collect();
        format!("{short}...")
    } else {
        brand.to_string()
    }
}

/// The /start greeting.
pub fn format_greeting() -> &'static str {
    "🤖 CRM Бот запущен!\n\n\
     Перешлите мне сообщения от рекламодателей, и я создам лид.\n\n\
     Команды:\n\
     /leads — все лиды\n\
     /search <запрос> — поиск\n\
     /stats — статистика"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn lead(id: i64, status: LeadStatus, is_hot: bool, brand: Option<&str>) -> Lead {
        Lead {
            id,
            user_id: 1,
            contact_telegram_id: None,
            contact_name: Some("Иван".into()),
            contact_username: None,
            brand: brand.map(String::from),
            request: Some("Интеграция".into()),
            dates: None,
            status,
            is_hot,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn lead_card_includes_fields_and_status() {
        let text = format_lead(&lead(3, LeadStatus::Negotiating, false, Some("Acme")), 4);
        assert!(text.contains("Лид #3"));
        assert!(text.contains("🏢 Бренд: Acme"));
        assert!(text.contains("👤 Контакт: Иван"));
        assert!(text.contains("📨 Сообщений: 4"));
        assert!(text.contains("🤝 Negotiating"));
        assert!(!text.starts_with("🔥"));
    }

    #[test]
    fn hot_lead_card_is_badged() {
        let text = format_lead(&lead(3, LeadStatus::New, true, None), 1);
        assert!(text.starts_with("🔥 "));
        assert!(text.contains("🏢 Бренд: —"));
    }

    #[test]
    fn short_format_appends_contact() {
        let text = format_lead_short(&lead(9, LeadStatus::New, false, Some("Acme")));
        assert_eq!(text, "🆕 #9 Acme (Иван)");
    }

    #[test]
    fn originals_enumerates_messages() {
        let messages = vec![
            LeadMessage {
                id: "a".into(),
                lead_id: 1,
                raw_text: "первое".into(),
                forward_date: None,
                created_at: Utc::now(),
            },
            LeadMessage {
                id: "b".into(),
                lead_id: 1,
                raw_text: "второе".into(),
                forward_date: None,
                created_at: Utc::now(),
            },
        ];
        let text = format_originals(&messages);
        assert!(text.contains("— Сообщение 1 —"));
        assert!(text.contains("— Сообщение 2 —"));
        assert!(text.contains("первое"));
        assert!(text.ends_with("второе"));

        assert_eq!(format_originals(&[]), "Нет сохранённых сообщений.");
    }

    #[test]
    fn stats_show_conversion_rate() {
        let mut by_status = HashMap::new();
        by_status.insert(LeadStatus::Contract, 1);
        by_status.insert(LeadStatus::New, 3);
        let stats = LeadStats {
            total_leads: 4,
            total_messages: 10,
            by_status,
        };
        let text = format_stats(&stats);
        assert!(text.contains("Всего лидов: 4"));
        assert!(text.contains("✅ Contract: 1"));
        assert!(text.contains("Конверсия в контракт: 25.0%"));
    }

    #[test]
    fn stats_without_leads_omit_conversion() {
        let text = format_stats(&LeadStats::default());
        assert!(!text.contains("Конверсия"));
    }

    #[test]
    fn leads_page_puts_hot_first_and_groups_by_status() {
        let leads = vec![
            lead(1, LeadStatus::New, false, Some("Regular")),
            lead(2, LeadStatus::Contract, false, Some("Signed")),
            lead(3, LeadStatus::Lost, true, Some("HotOne")),
        ];
        let (text, pages) = format_leads_page(&leads, 1, 15, "crm_bot");
        assert_eq!(pages, 1);

        let hot_pos = text.find("HotOne").unwrap();
        let contract_pos = text.find("Signed").unwrap();
        let new_pos = text.find("Regular").unwrap();
        assert!(hot_pos < contract_pos && contract_pos < new_pos);
        assert!(text.contains("*🔥 ВАЖНЫЕ*"));
        assert!(text.contains("https://t.me/crm_bot?start=lead_3"));
        assert!(!text.contains("Страница"));
    }

    #[test]
    fn leads_page_slices_and_reports_total() {
        let leads: Vec<Lead> = (1..=20)
            .map(|i| lead(i, LeadStatus::New, false, Some("Brand")))
            .collect();
        let (first, pages) = format_leads_page(&leads, 1, 15, "crm_bot");
        assert_eq!(pages, 2);
        assert!(first.contains("lead_1)"));
        assert!(!first.contains("lead_16)"));
        assert!(first.contains("Страница 1/2"));

        let (second, _) = format_leads_page(&leads, 2, 15, "crm_bot");
        assert!(second.contains("lead_16)"));
        assert!(!second.contains("lead_15)"));
    }

    #[test]
    fn brand_truncation_is_char_aware() {
        let long = "Очень длинное название бренда компании";
        let truncated = truncate_brand(long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), BRAND_MAX_CHARS);
        assert_eq!(truncate_brand("Acme"), "Acme");
    }
}
