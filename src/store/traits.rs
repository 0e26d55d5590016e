//! `LeadStore` trait — single async interface for lead persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::extract::ExtractedFields;
use crate::store::lead::{
    EditableField, Lead, LeadMessage, LeadStats, LeadStatus, NewLead, RawMessage,
};

/// Backend-agnostic persistence trait for leads and their messages.
///
/// Every read and mutation is scoped to the owning user where the operation
/// is user-triggered; message-level operations take a lead id that the
/// caller has already verified ownership of.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Create a new lead with its initial raw messages. Returns the lead id.
    async fn create_lead(
        &self,
        fields: NewLead,
        messages: &[RawMessage],
    ) -> Result<i64, DatabaseError>;

    /// Get a lead by id, only if it belongs to `user_id`.
    async fn get_lead(&self, lead_id: i64, user_id: i64) -> Result<Option<Lead>, DatabaseError>;

    /// Find the most recently updated lead of `user_id` whose contact matches,
    /// updated within the last `window_minutes`.
    ///
    /// Matching rule: exact telegram-id equality when `telegram_id` is given,
    /// else exact name equality when `name` is given, else no candidate.
    async fn find_recent_by_contact(
        &self,
        user_id: i64,
        telegram_id: Option<i64>,
        name: Option<&str>,
        window_minutes: i64,
    ) -> Result<Option<Lead>, DatabaseError>;

    /// Append raw messages to an existing lead and touch its update timestamp.
    async fn add_messages(
        &self,
        lead_id: i64,
        messages: &[RawMessage],
    ) -> Result<(), DatabaseError>;

    /// Overwrite extracted fields after a re-extraction pass.
    ///
    /// Brand, request and dates are always overwritten; the contact name is
    /// only overwritten when the newly extracted contact is non-empty.
    async fn update_extracted(
        &self,
        lead_id: i64,
        fields: &ExtractedFields,
    ) -> Result<(), DatabaseError>;

    /// Update a lead's status (only if it belongs to `user_id`).
    async fn update_status(
        &self,
        lead_id: i64,
        user_id: i64,
        status: LeadStatus,
    ) -> Result<(), DatabaseError>;

    /// Toggle the hot flag. Returns the new value.
    async fn toggle_hot(&self, lead_id: i64, user_id: i64) -> Result<bool, DatabaseError>;

    /// Set a single user-editable field.
    async fn update_field(
        &self,
        lead_id: i64,
        user_id: i64,
        field: EditableField,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// All leads of a user, most recently updated first.
    async fn list_leads(&self, user_id: i64) -> Result<Vec<Lead>, DatabaseError>;

    /// Search a user's leads by brand, contact name or username.
    async fn search(&self, user_id: i64, query: &str) -> Result<Vec<Lead>, DatabaseError>;

    /// Conversion statistics for a user.
    async fn stats(&self, user_id: i64) -> Result<LeadStats, DatabaseError>;

    /// All messages of a lead in insertion order.
    async fn get_messages(&self, lead_id: i64) -> Result<Vec<LeadMessage>, DatabaseError>;

    /// The lead's full message history joined for re-extraction.
    async fn combined_text(&self, lead_id: i64) -> Result<String, DatabaseError>;
}
