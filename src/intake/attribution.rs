//! Attribution decider — routes a flushed batch to a new lead or to a
//! merge-or-create prompt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::intake::Outbound;
use crate::intake::buffer::{BatchSink, FlushedBatch};
use crate::intake::materializer::LeadMaterializer;
use crate::intake::pending::{PendingDecision, PendingDecisions};
use crate::store::LeadStore;

/// Decides, per flushed batch, between auto-create and a user prompt.
pub struct Attributor {
    store: Arc<dyn LeadStore>,
    pending: Arc<PendingDecisions>,
    materializer: Arc<LeadMaterializer>,
    outbound: Arc<dyn Outbound>,
    same_lead_window_minutes: i64,
}

impl Attributor {
    pub fn new(
        store: Arc<dyn LeadStore>,
        pending: Arc<PendingDecisions>,
        materializer: Arc<LeadMaterializer>,
        outbound: Arc<dyn Outbound>,
        same_lead_window_minutes: i64,
    ) -> Self {
        Self {
            store,
            pending,
            materializer,
            outbound,
            same_lead_window_minutes,
        }
    }
}

#[async_trait]
impl BatchSink for Attributor {
    async fn flush(&self, batch: FlushedBatch) {
        info!(
            owner = batch.owner,
            count = batch.messages.len(),
            "Processing batch"
        );

        // Anonymous batches can never match an existing lead.
        let candidate = if batch.sender_info.is_anonymous() {
            None
        } else {
            match self
                .store
                .find_recent_by_contact(
                    batch.owner,
                    batch.sender_info.telegram_id,
                    batch.sender_info.name.as_deref(),
                    self.same_lead_window_minutes,
                )
                .await
            {
                Ok(candidate) => candidate,
                Err(e) => {
                    // Batches are not durable; a failed lookup drops this one.
                    error!(owner = batch.owner, "Candidate lookup failed, batch lost: {e}");
                    return;
                }
            }
        };

        match candidate {
            Some(lead) => {
                info!(
                    owner = batch.owner,
                    candidate_id = lead.id,
                    "Recent lead matches contact, asking the user"
                );
                self.pending
                    .put(
                        batch.owner,
                        batch.chat_id,
                        PendingDecision {
                            messages: batch.messages,
                            sender_info: batch.sender_info,
                            candidate_id: lead.id,
                            candidate_brand: lead.brand_label().to_string(),
                        },
                    )
                    .await;
                self.outbound.prompt_merge(batch.chat_id, &lead).await;
            }
            None => {
                if let Err(e) = self
                    .materializer
                    .create_from_batch(
                        batch.owner,
                        batch.chat_id,
                        &batch.messages,
                        &batch.sender_info,
                    )
                    .await
                {
                    error!(owner = batch.owner, "Lead creation failed, batch lost: {e}");
                }
            }
        }
    }
}
