//! Field-editing state — one awaiting-value session per user.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::store::EditableField;

/// Keywords that abandon an edit instead of storing the value.
pub const CANCEL_KEYWORDS: [&str; 5] = ["нет", "отмена", "cancel", "-", "/cancel"];

/// An in-progress edit: the next plain message from this user is the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditSession {
    pub lead_id: i64,
    pub field: EditableField,
}

/// Per-user edit sessions. A user has at most one; starting a new edit
/// replaces the old one.
#[derive(Default)]
pub struct EditSessions {
    inner: Mutex<HashMap<i64, EditSession>>,
}

impl EditSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or replace) an edit session for a user.
    pub async fn begin(&self, user_id: i64, lead_id: i64, field: EditableField) {
        self.inner
            .lock()
            .await
            .insert(user_id, EditSession { lead_id, field });
    }

    /// The user's active session, if any.
    pub async fn get(&self, user_id: i64) -> Option<EditSession> {
        self.inner.lock().await.get(&user_id).copied()
    }

    /// End the user's session, returning it.
    pub async fn clear(&self, user_id: i64) -> Option<EditSession> {
        self.inner.lock().await.remove(&user_id)
    }
}

/// Whether a reply means "abort the edit".
pub fn is_cancel(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    CANCEL_KEYWORDS.iter().any(|k| *k == lowered)
}
