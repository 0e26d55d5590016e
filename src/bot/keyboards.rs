//! Inline keyboard builders — JSON payloads for Telegram `reply_markup`.

use serde_json::{Value, json};

use crate::store::LeadStatus;

/// Keyboard shown under a lead card: status buttons, hot toggle, actions.
pub fn lead_keyboard(lead_id: i64, is_hot: bool) -> Value {
    let status_buttons: Vec<Value> = LeadStatus::ALL
        .iter()
        .map(|status| {
            json!({
                "text": status.emoji(),
                "callback_data": format!("status:{lead_id}:{status}"),
            })
        })
        .collect();

    // Two rows of statuses (4 + 3), then the hot toggle, then actions.
    let (status_row1, status_row2) = status_buttons.split_at(4);

    let hot_button = json!({
        "text": if is_hot { "🔥 Снять важность" } else { "🔥 Важный" },
        "callback_data": format!("toggle_hot:{lead_id}"),
    });

    json!({
        "inline_keyboard": [
            status_row1,
            status_row2,
            [hot_button],
            [
                {"text": "📜 Оригиналы", "callback_data": format!("originals:{lead_id}")},
                {"text": "✏️ Редактировать", "callback_data": format!("edit:{lead_id}")},
            ],
        ]
    })
}

/// Merge-or-create prompt keyboard.
pub fn add_to_lead_keyboard(existing_lead_id: i64, brand: &str) -> Value {
    let brand_short: String = brand.chars().take(20).collect();
    json!({
        "inline_keyboard": [
            [{
                "text": format!("📎 Добавить к «{brand_short}»"),
                "callback_data": format!("add_to_lead:{existing_lead_id}"),
            }],
            [{
                "text": "🆕 Создать новый лид",
                "callback_data": "create_new_lead",
            }],
        ]
    })
}

/// Single back button returning to the lead card.
pub fn back_keyboard(lead_id: i64) -> Value {
    json!({
        "inline_keyboard": [
            [{"text": "◀️ Назад", "callback_data": format!("back:{lead_id}")}],
        ]
    })
}

/// Field picker for editing a lead.
pub fn edit_keyboard(lead_id: i64) -> Value {
    json!({
        "inline_keyboard": [
            [
                {"text": "🏢 Бренд", "callback_data": format!("edit_field:{lead_id}:brand")},
                {"text": "📝 Запрос", "callback_data": format!("edit_field:{lead_id}:request")},
            ],
            [
                {"text": "👤 Контакт", "callback_data": format!("edit_field:{lead_id}:contact")},
                {"text": "📅 Даты", "callback_data": format!("edit_field:{lead_id}:dates")},
            ],
            [{"text": "◀️ Назад", "callback_data": format!("back:{lead_id}")}],
        ]
    })
}

/// Cancel button shown while awaiting a new field value.
pub fn cancel_edit_keyboard(lead_id: i64) -> Value {
    json!({
        "inline_keyboard": [
            [{"text": "❌ Отмена", "callback_data": format!("cancel_edit:{lead_id}")}],
        ]
    })
}

/// Prev/next deep-link buttons for the paginated lead list.
/// Returns None when everything fits on one page.
pub fn leads_pagination_keyboard(bot_username: &str, page: usize, total_pages: usize) -> Option<Value> {
    if total_pages <= 1 {
        return None;
    }

    let mut buttons = Vec::new();
    if page > 1 {
        buttons.push(json!({
            "text": "⬅️ Назад",
            "url": format!("https://t.me/{bot_username}?start=leads_page_{}", page - 1),
        }));
    }
    if page < total_pages {
        buttons.push(json!({
            "text": "Вперёд ➡️",
            "url": format!("https://t.me/{bot_username}?start=leads_page_{}", page + 1),
        }));
    }

    Some(json!({ "inline_keyboard": [buttons] }))
}
