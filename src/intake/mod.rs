//! Intake engine — message coalescing, lead attribution, and decision
//! resolution.
//!
//! The only part of the bot with real concurrency: per-key debounce timers
//! over a shared buffer table, plus the pending-decision registry resolved
//! from button presses.

pub mod attribution;
pub mod buffer;
pub mod identity;
pub mod materializer;
pub mod pending;

pub use buffer::{BufferKey, FlushedBatch, MessageBuffer};
pub use identity::{SenderIdentity, SenderInfo};
pub use pending::{PendingDecision, PendingDecisions};

use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::ForwardedMessage;
use crate::config::BotConfig;
use crate::error::IntakeError;
use crate::extract::Extractor;
use crate::intake::attribution::Attributor;
use crate::intake::materializer::LeadMaterializer;
use crate::store::{Lead, LeadStore};

/// Outbound chat surface the intake engine talks to.
///
/// Implementations deliver best-effort: a failed send is logged, never
/// propagated — lead state must not depend on presentation.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Show a "typing…" presence indicator (cosmetic, covers the quiet period).
    async fn send_typing(&self, chat_id: i64);

    /// Announce a newly created lead.
    async fn announce_new_lead(&self, chat_id: i64, lead: &Lead, message_count: usize);

    /// Ask whether to merge the batch into `candidate` or create a new lead.
    async fn prompt_merge(&self, chat_id: i64, candidate: &Lead);
}

/// Result of a successful merge resolution, for display.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub lead: Lead,
    /// Messages added by this batch.
    pub added: usize,
    /// Message count of the lead after the merge.
    pub total_messages: usize,
}

/// The intake engine: buffer, attribution, pending registry, materializer,
/// wired together with constructor-injected collaborators.
pub struct IntakeEngine {
    buffer: Arc<MessageBuffer>,
    pending: Arc<PendingDecisions>,
    materializer: Arc<LeadMaterializer>,
    store: Arc<dyn LeadStore>,
}

impl IntakeEngine {
    pub fn new(
        config: &BotConfig,
        store: Arc<dyn LeadStore>,
        extractor: Arc<dyn Extractor>,
        outbound: Arc<dyn Outbound>,
    ) -> Arc<Self> {
        let pending = Arc::new(PendingDecisions::new());
        let materializer = Arc::new(LeadMaterializer::new(
            Arc::clone(&store),
            extractor,
            Arc::clone(&outbound),
        ));
        let attributor = Arc::new(Attributor::new(
            Arc::clone(&store),
            Arc::clone(&pending),
            Arc::clone(&materializer),
            Arc::clone(&outbound),
            config.same_lead_window_minutes(),
        ));
        let buffer = MessageBuffer::new(config.batch_quiet_period, outbound, attributor);

        Arc::new(Self {
            buffer,
            pending,
            materializer,
            store,
        })
    }

    /// Buffer one forwarded message for coalescing.
    pub async fn ingest(&self, owner: i64, chat_id: i64, envelope: &ForwardedMessage) {
        self.buffer.ingest(owner, chat_id, envelope).await;
    }

    /// Merge the pending batch into an existing lead and re-extract fields
    /// from the lead's entire message history.
    pub async fn resolve_merge(
        &self,
        owner: i64,
        chat_id: i64,
        lead_id: i64,
    ) -> Result<MergeOutcome, IntakeError> {
        // Verify before consuming, so a failed merge leaves the prompt
        // answerable.
        if self.pending.peek(owner, chat_id).await.is_none() {
            return Err(IntakeError::NoPendingDecision { owner, chat_id });
        }
        if self.store.get_lead(lead_id, owner).await?.is_none() {
            return Err(IntakeError::LeadNotFound { lead_id, owner });
        }

        let decision = self
            .pending
            .take(owner, chat_id)
            .await
            .ok_or(IntakeError::NoPendingDecision { owner, chat_id })?;
        let added = decision.messages.len();

        self.materializer
            .append_to_lead(lead_id, &decision.messages)
            .await?;

        // Re-extract from the entire history, not just the new batch.
        let full_text = self.store.combined_text(lead_id).await?;
        let fields = self.materializer.extract_or_empty(&full_text).await;
        self.store.update_extracted(lead_id, &fields).await?;

        let lead = self
            .store
            .get_lead(lead_id, owner)
            .await?
            .ok_or(IntakeError::LeadNotFound { lead_id, owner })?;
        let total_messages = self.store.get_messages(lead_id).await?.len();

        Ok(MergeOutcome {
            lead,
            added,
            total_messages,
        })
    }

    /// Create a new lead from the pending batch, ignoring the candidate.
    pub async fn resolve_create_new(&self, owner: i64, chat_id: i64) -> Result<Lead, IntakeError> {
        let decision = self
            .pending
            .take(owner, chat_id)
            .await
            .ok_or(IntakeError::NoPendingDecision { owner, chat_id })?;

        self.materializer
            .create_from_batch(owner, chat_id, &decision.messages, &decision.sender_info)
            .await
    }

    /// Number of currently open batches (observability).
    pub async fn open_batches(&self) -> usize {
        self.buffer.open_batches().await
    }
}
