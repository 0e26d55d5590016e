//! libSQL backend — async `LeadStore` implementation.
//!
//! Local file or in-memory databases; timestamps are stored as RFC 3339
//! TEXT so window comparisons work lexicographically.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extract::ExtractedFields;
use crate::store::lead::{
    EditableField, Lead, LeadMessage, LeadStats, LeadStatus, MESSAGE_DELIMITER, NewLead,
    RawMessage,
};
use crate::store::traits::LeadStore;

const LEAD_COLUMNS: &str = "id, user_id, contact_telegram_id, contact_name, contact_username, \
     brand, request, dates, status, is_hot, created_at, updated_at";

/// libSQL-backed lead store.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct SqliteLeadStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl SqliteLeadStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS leads (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    contact_telegram_id INTEGER,
                    contact_name TEXT,
                    contact_username TEXT,
                    brand TEXT,
                    request TEXT,
                    dates TEXT,
                    status TEXT NOT NULL DEFAULT 'new',
                    is_hot INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_leads_user ON leads(user_id);
                CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
                CREATE INDEX IF NOT EXISTS idx_leads_contact ON leads(contact_telegram_id);
                CREATE INDEX IF NOT EXISTS idx_leads_updated ON leads(updated_at);

                CREATE TABLE IF NOT EXISTS lead_messages (
                    id TEXT PRIMARY KEY,
                    lead_id INTEGER NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
                    raw_text TEXT NOT NULL,
                    forward_date TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_lead_messages_lead ON lead_messages(lead_id);",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Insert raw messages under a lead, preserving arrival order.
    async fn insert_messages(
        &self,
        lead_id: i64,
        messages: &[RawMessage],
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        for msg in messages {
            conn.execute(
                "INSERT INTO lead_messages (id, lead_id, raw_text, forward_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    lead_id,
                    msg.text.as_str(),
                    opt_text(msg.forward_date.map(|d| d.to_rfc3339())),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_messages: {e}")))?;
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Parse an RFC 3339 string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

/// Convert `Option<String>` to a libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to a libsql Value.
fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Map a libsql row (LEAD_COLUMNS order) to a Lead.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let status_str: String = row.get(8)?;
    let is_hot: i64 = row.get(9)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(Lead {
        id: row.get(0)?,
        user_id: row.get(1)?,
        contact_telegram_id: row.get::<i64>(2).ok(),
        contact_name: row.get::<String>(3).ok(),
        contact_username: row.get::<String>(4).ok(),
        brand: row.get::<String>(5).ok(),
        request: row.get::<String>(6).ok(),
        dates: row.get::<String>(7).ok(),
        status: LeadStatus::parse(&status_str),
        is_hot: is_hot != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Collect all lead rows from a query result, skipping unparseable rows.
async fn collect_leads(mut rows: libsql::Rows) -> Vec<Lead> {
    let mut leads = Vec::new();
    while let Ok(Some(row)) = rows.next().await {
        match row_to_lead(&row) {
            Ok(lead) => leads.push(lead),
            Err(e) => tracing::warn!("Skipping lead row: {e}"),
        }
    }
    leads
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn create_lead(
        &self,
        fields: NewLead,
        messages: &[RawMessage],
    ) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO leads (user_id, contact_telegram_id, contact_name, contact_username,
                 brand, request, dates, status, is_hot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'new', 0, ?8, ?8)",
            params![
                fields.user_id,
                opt_int(fields.contact_telegram_id),
                opt_text(fields.contact_name),
                opt_text(fields.contact_username),
                opt_text(fields.brand),
                opt_text(fields.request),
                opt_text(fields.dates),
                now.as_str(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("create_lead: {e}")))?;

        let lead_id = conn.last_insert_rowid();
        self.insert_messages(lead_id, messages).await?;

        debug!(lead_id, message_count = messages.len(), "Lead created");
        Ok(lead_id)
    }

    async fn get_lead(&self, lead_id: i64, user_id: i64) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1 AND user_id = ?2"),
                params![lead_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let lead = row_to_lead(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_lead row parse: {e}")))?;
                Ok(Some(lead))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn find_recent_by_contact(
        &self,
        user_id: i64,
        telegram_id: Option<i64>,
        name: Option<&str>,
        window_minutes: i64,
    ) -> Result<Option<Lead>, DatabaseError> {
        let cutoff = (Utc::now() - Duration::minutes(window_minutes)).to_rfc3339();

        let mut rows = if let Some(telegram_id) = telegram_id {
            self.conn()
                .query(
                    &format!(
                        "SELECT {LEAD_COLUMNS} FROM leads
                         WHERE user_id = ?1 AND contact_telegram_id = ?2 AND updated_at >= ?3
                         ORDER BY updated_at DESC LIMIT 1"
                    ),
                    params![user_id, telegram_id, cutoff],
                )
                .await
        } else if let Some(name) = name {
            self.conn()
                .query(
                    &format!(
                        "SELECT {LEAD_COLUMNS} FROM leads
                         WHERE user_id = ?1 AND contact_name = ?2 AND updated_at >= ?3
                         ORDER BY updated_at DESC LIMIT 1"
                    ),
                    params![user_id, name, cutoff],
                )
                .await
        } else {
            return Ok(None);
        }
        .map_err(|e| DatabaseError::Query(format!("find_recent_by_contact: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let lead = row_to_lead(&row).map_err(|e| {
                    DatabaseError::Query(format!("find_recent_by_contact row parse: {e}"))
                })?;
                Ok(Some(lead))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_recent_by_contact: {e}"))),
        }
    }

    async fn add_messages(
        &self,
        lead_id: i64,
        messages: &[RawMessage],
    ) -> Result<(), DatabaseError> {
        self.insert_messages(lead_id, messages).await?;

        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE leads SET updated_at = ?1 WHERE id = ?2",
                params![now, lead_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_messages touch: {e}")))?;

        debug!(lead_id, count = messages.len(), "Messages appended to lead");
        Ok(())
    }

    async fn update_extracted(
        &self,
        lead_id: i64,
        fields: &ExtractedFields,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE leads SET brand = ?1, request = ?2, dates = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                opt_text(fields.brand.clone()),
                opt_text(fields.request.clone()),
                opt_text(fields.dates.clone()),
                now,
                lead_id,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_extracted: {e}")))?;

        // Contact name only wins when the new extraction actually found one.
        if let Some(contact) = fields.contact.as_deref().filter(|c| !c.is_empty()) {
            conn.execute(
                "UPDATE leads SET contact_name = ?1 WHERE id = ?2",
                params![contact, lead_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_extracted contact: {e}")))?;
        }

        debug!(lead_id, "Extracted fields updated");
        Ok(())
    }

    async fn update_status(
        &self,
        lead_id: i64,
        user_id: i64,
        status: LeadStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![status.as_str(), now, lead_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_status: {e}")))?;

        debug!(lead_id, status = %status, "Lead status updated");
        Ok(())
    }

    async fn toggle_hot(&self, lead_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT is_hot FROM leads WHERE id = ?1 AND user_id = ?2",
                params![lead_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("toggle_hot: {e}")))?;

        let current: i64 = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("toggle_hot row parse: {e}")))?,
            Ok(None) => {
                return Err(DatabaseError::NotFound {
                    entity: "lead".into(),
                    id: lead_id.to_string(),
                });
            }
            Err(e) => return Err(DatabaseError::Query(format!("toggle_hot: {e}"))),
        };

        let new_value = current == 0;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE leads SET is_hot = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![new_value as i64, now, lead_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("toggle_hot update: {e}")))?;

        Ok(new_value)
    }

    async fn update_field(
        &self,
        lead_id: i64,
        user_id: i64,
        field: EditableField,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        // Column name comes from the EditableField enum, never from user input.
        let sql = format!(
            "UPDATE leads SET {} = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
            field.column()
        );
        self.conn()
            .execute(&sql, params![value, now, lead_id, user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("update_field: {e}")))?;

        debug!(lead_id, field = field.as_str(), "Lead field updated");
        Ok(())
    }

    async fn list_leads(&self, user_id: i64) -> Result<Vec<Lead>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE user_id = ?1 ORDER BY updated_at DESC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads: {e}")))?;

        Ok(collect_leads(rows).await)
    }

    async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Lead>, DatabaseError> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads
                     WHERE user_id = ?1
                       AND (lower(brand) LIKE ?2
                            OR lower(contact_name) LIKE ?2
                            OR lower(contact_username) LIKE ?2)
                     ORDER BY updated_at DESC"
                ),
                params![user_id, pattern],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("search: {e}")))?;

        Ok(collect_leads(rows).await)
    }

    async fn stats(&self, user_id: i64) -> Result<LeadStats, DatabaseError> {
        let mut stats = LeadStats::default();

        let mut rows = self
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM leads WHERE user_id = ?1 GROUP BY status",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stats: {e}")))?;

        while let Ok(Some(row)) = rows.next().await {
            let status_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("stats row parse: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("stats row parse: {e}")))?;
            stats
                .by_status
                .insert(LeadStatus::parse(&status_str), count as usize);
            stats.total_leads += count as usize;
        }

        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM lead_messages
                 JOIN leads ON leads.id = lead_messages.lead_id
                 WHERE leads.user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stats messages: {e}")))?;

        if let Ok(Some(row)) = rows.next().await {
            let count: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("stats messages parse: {e}")))?;
            stats.total_messages = count as usize;
        }

        Ok(stats)
    }

    async fn get_messages(&self, lead_id: i64) -> Result<Vec<LeadMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, lead_id, raw_text, forward_date, created_at FROM lead_messages
                 WHERE lead_id = ?1 ORDER BY created_at ASC, rowid ASC",
                params![lead_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let forward_str: Option<String> = row.get::<String>(3).ok();
            let created_str: String = row
                .get(4)
                .map_err(|e| DatabaseError::Query(format!("get_messages row parse: {e}")))?;
            messages.push(LeadMessage {
                id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_messages row parse: {e}")))?,
                lead_id: row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("get_messages row parse: {e}")))?,
                raw_text: row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("get_messages row parse: {e}")))?,
                forward_date: forward_str.as_deref().map(parse_datetime),
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(messages)
    }

    async fn combined_text(&self, lead_id: i64) -> Result<String, DatabaseError> {
        let messages = self.get_messages(lead_id).await?;
        Ok(messages
            .iter()
            .map(|m| m.raw_text.as_str())
            .collect::<Vec<_>>()
            .join(MESSAGE_DELIMITER))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
