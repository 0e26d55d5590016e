//! Pending-decision registry — at most one outstanding merge/create
//! decision per (owner, chat).

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::intake::identity::SenderInfo;
use crate::store::RawMessage;

/// A flushed batch waiting for the user to pick merge or create-new.
#[derive(Debug, Clone)]
pub struct PendingDecision {
    pub messages: Vec<RawMessage>,
    pub sender_info: SenderInfo,
    /// The recently-active lead the batch was matched against.
    pub candidate_id: i64,
    pub candidate_brand: String,
}

/// Registry of unresolved decisions, keyed by (owner, chat).
///
/// A new decision for an occupied key replaces the old one (last write
/// wins); the displaced batch is dropped and logged — its messages never
/// reach a lead.
#[derive(Default)]
pub struct PendingDecisions {
    inner: Mutex<HashMap<(i64, i64), PendingDecision>>,
}

impl PendingDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision for (owner, chat_id), displacing any unresolved one.
    pub async fn put(&self, owner: i64, chat_id: i64, decision: PendingDecision) {
        let mut inner = self.inner.lock().await;
        if let Some(displaced) = inner.insert((owner, chat_id), decision) {
            warn!(
                owner,
                chat_id,
                orphaned_messages = displaced.messages.len(),
                candidate_id = displaced.candidate_id,
                "Unresolved pending decision overwritten; its batch is dropped"
            );
        } else {
            debug!(owner, chat_id, "Pending decision recorded");
        }
    }

    /// Look at the decision for a key without consuming it.
    pub async fn peek(&self, owner: i64, chat_id: i64) -> Option<PendingDecision> {
        self.inner.lock().await.get(&(owner, chat_id)).cloned()
    }

    /// Consume the decision for a key.
    pub async fn take(&self, owner: i64, chat_id: i64) -> Option<PendingDecision> {
        self.inner.lock().await.remove(&(owner, chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(candidate_id: i64, texts: &[&str]) -> PendingDecision {
        PendingDecision {
            messages: texts
                .iter()
                .map(|t| RawMessage {
                    text: t.to_string(),
                    forward_date: None,
                })
                .collect(),
            sender_info: SenderInfo::default(),
            candidate_id,
            candidate_brand: "Acme".into(),
        }
    }

    #[tokio::test]
    async fn take_consumes_exactly_once() {
        let pending = PendingDecisions::new();
        pending.put(1, 555, decision(7, &["hi"])).await;

        assert!(pending.peek(1, 555).await.is_some());
        let taken = pending.take(1, 555).await.unwrap();
        assert_eq!(taken.candidate_id, 7);

        // Second resolve attempt finds nothing.
        assert!(pending.take(1, 555).await.is_none());
        assert!(pending.peek(1, 555).await.is_none());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let pending = PendingDecisions::new();
        pending.put(1, 555, decision(7, &["a"])).await;
        pending.put(2, 555, decision(8, &["b"])).await;
        pending.put(1, 556, decision(9, &["c"])).await;

        assert_eq!(pending.take(1, 555).await.unwrap().candidate_id, 7);
        assert_eq!(pending.take(2, 555).await.unwrap().candidate_id, 8);
        assert_eq!(pending.take(1, 556).await.unwrap().candidate_id, 9);
    }

    #[tokio::test]
    async fn second_put_displaces_first() {
        let pending = PendingDecisions::new();
        pending.put(1, 555, decision(7, &["old batch"])).await;
        pending.put(1, 555, decision(8, &["new batch"])).await;

        let taken = pending.take(1, 555).await.unwrap();
        assert_eq!(taken.candidate_id, 8);
        assert_eq!(taken.messages[0].text, "new batch");
    }
}
