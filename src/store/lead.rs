//! Lead domain models — the persisted CRM records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visible delimiter between messages when joining a lead's history
/// into one text for extraction.
pub const MESSAGE_DELIMITER: &str = "\n\n---\n\n";

/// Pipeline status of a lead.
///
/// Order of variants is the progression the user walks a deal through;
/// `display_order()` is the grouping order for the /leads list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Replied,
    Waiting,
    Negotiating,
    Signing,
    Contract,
    Lost,
}

impl LeadStatus {
    /// All statuses in pipeline order (used for stats and keyboards).
    pub const ALL: [LeadStatus; 7] = [
        Self::New,
        Self::Replied,
        Self::Waiting,
        Self::Negotiating,
        Self::Signing,
        Self::Contract,
        Self::Lost,
    ];

    /// Order for displaying leads in the list, most advanced first.
    pub const DISPLAY_ORDER: [LeadStatus; 7] = [
        Self::Contract,
        Self::Signing,
        Self::Negotiating,
        Self::Waiting,
        Self::Replied,
        Self::New,
        Self::Lost,
    ];

    /// Database string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Replied => "replied",
            Self::Waiting => "waiting",
            Self::Negotiating => "negotiating",
            Self::Signing => "signing",
            Self::Contract => "contract",
            Self::Lost => "lost",
        }
    }

    /// Parse a status string from the DB. Unknown values fall back to `New`.
    pub fn parse(s: &str) -> Self {
        match s {
            "replied" => Self::Replied,
            "waiting" => Self::Waiting,
            "negotiating" => Self::Negotiating,
            "signing" => Self::Signing,
            "contract" => Self::Contract,
            "lost" => Self::Lost,
            _ => Self::New,
        }
    }

    /// Emoji badge shown next to the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::New => "🆕",
            Self::Replied => "📤",
            Self::Waiting => "⏳",
            Self::Negotiating => "🤝",
            Self::Signing => "📝",
            Self::Contract => "✅",
            Self::Lost => "❌",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Replied => "Replied",
            Self::Waiting => "Waiting",
            Self::Negotiating => "Negotiating",
            Self::Signing => "Signing",
            Self::Contract => "Contract",
            Self::Lost => "Lost",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted lead.
#[derive(Debug, Clone)]
pub struct Lead {
    pub id: i64,
    /// Bot user on whose behalf this lead is tracked.
    pub user_id: i64,
    pub contact_telegram_id: Option<i64>,
    pub contact_name: Option<String>,
    pub contact_username: Option<String>,
    pub brand: Option<String>,
    pub request: Option<String>,
    pub dates: Option<String>,
    pub status: LeadStatus,
    pub is_hot: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Brand label for prompts and lists, with a placeholder for unset brands.
    pub fn brand_label(&self) -> &str {
        self.brand.as_deref().unwrap_or("Без названия")
    }
}

/// Fields for creating a lead.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub user_id: i64,
    pub contact_telegram_id: Option<i64>,
    pub contact_name: Option<String>,
    pub contact_username: Option<String>,
    pub brand: Option<String>,
    pub request: Option<String>,
    pub dates: Option<String>,
}

/// A forwarded message not yet attached to a lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub text: String,
    pub forward_date: Option<DateTime<Utc>>,
}

/// A message persisted under a lead.
#[derive(Debug, Clone)]
pub struct LeadMessage {
    pub id: String,
    pub lead_id: i64,
    pub raw_text: String,
    pub forward_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Conversion statistics for one user.
#[derive(Debug, Clone, Default)]
pub struct LeadStats {
    pub total_leads: usize,
    pub total_messages: usize,
    pub by_status: std::collections::HashMap<LeadStatus, usize>,
}

/// User-editable lead field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Brand,
    Request,
    Contact,
    Dates,
}

impl EditableField {
    /// Callback-data token for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Request => "request",
            Self::Contact => "contact",
            Self::Dates => "dates",
        }
    }

    /// Parse a callback-data token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brand" => Some(Self::Brand),
            "request" => Some(Self::Request),
            "contact" => Some(Self::Contact),
            "dates" => Some(Self::Dates),
            _ => None,
        }
    }

    /// Database column this field maps to.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Request => "request",
            Self::Contact => "contact_name",
            Self::Dates => "dates",
        }
    }

    /// Field name as shown in the edit prompt.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Brand => "бренд",
            Self::Request => "запрос",
            Self::Contact => "контакт",
            Self::Dates => "даты",
        }
    }

    /// Example hint shown under the edit prompt.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Brand => "Название компании, например: Magssory",
            Self::Request => "Кратко что хотят, например: Интеграция в Reels",
            Self::Contact => "Имя контактного лица",
            Self::Dates => "Любой формат: 12.02.2026, февраль, Q1 и т.д.",
        }
    }
}
