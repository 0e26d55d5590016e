//! Lead materializer — turns a finalized batch into storage operations.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::IntakeError;
use crate::extract::{ExtractedFields, Extractor};
use crate::intake::Outbound;
use crate::intake::identity::SenderInfo;
use crate::store::{Lead, LeadStore, MESSAGE_DELIMITER, NewLead, RawMessage};

/// Creates leads from batches and appends batches to existing leads.
pub struct LeadMaterializer {
    store: Arc<dyn LeadStore>,
    extractor: Arc<dyn Extractor>,
    outbound: Arc<dyn Outbound>,
}

impl LeadMaterializer {
    pub fn new(
        store: Arc<dyn LeadStore>,
        extractor: Arc<dyn Extractor>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            store,
            extractor,
            outbound,
        }
    }

    /// Create a new lead from a batch and announce it in the chat.
    ///
    /// Extraction failure degrades to empty fields; the sender info fills in
    /// whatever the extractor could not.
    pub async fn create_from_batch(
        &self,
        owner: i64,
        chat_id: i64,
        messages: &[RawMessage],
        sender_info: &SenderInfo,
    ) -> Result<Lead, IntakeError> {
        let combined = messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(MESSAGE_DELIMITER);

        let fields = self.extract_or_empty(&combined).await;

        let lead_id = self
            .store
            .create_lead(
                NewLead {
                    user_id: owner,
                    contact_telegram_id: sender_info.telegram_id,
                    contact_name: fields.contact.clone().or_else(|| sender_info.name.clone()),
                    contact_username: sender_info.username.clone(),
                    brand: fields.brand.clone(),
                    request: fields.request.clone(),
                    dates: fields.dates.clone(),
                },
                messages,
            )
            .await?;

        let lead = self
            .store
            .get_lead(lead_id, owner)
            .await?
            .ok_or(IntakeError::LeadNotFound { lead_id, owner })?;

        info!(
            lead_id,
            owner,
            message_count = messages.len(),
            brand = lead.brand.as_deref().unwrap_or("-"),
            "Lead created"
        );

        self.outbound
            .announce_new_lead(chat_id, &lead, messages.len())
            .await;

        Ok(lead)
    }

    /// Append a batch's messages to an existing lead and touch its timestamp.
    ///
    /// Does not run extraction — the merge resolution re-extracts from the
    /// full history, which needs more than this batch.
    pub async fn append_to_lead(
        &self,
        lead_id: i64,
        messages: &[RawMessage],
    ) -> Result<(), IntakeError> {
        self.store.add_messages(lead_id, messages).await?;
        info!(lead_id, count = messages.len(), "Messages appended to lead");
        Ok(())
    }

    /// Run extraction, recovering any failure to all-empty fields.
    pub async fn extract_or_empty(&self, combined_text: &str) -> ExtractedFields {
        match self.extractor.extract(combined_text).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Extraction failed, continuing with empty fields: {e}");
                ExtractedFields::default()
            }
        }
    }
}
