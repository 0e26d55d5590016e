//! Coalescing buffer — per-(user, sender) batching with a restart-on-arrival
//! debounce timer.
//!
//! Every arrival appends to its batch and replaces the batch's expiry timer;
//! only the timer surviving the last arrival ever fires, so exactly one flush
//! happens per uninterrupted run of forwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channels::ForwardedMessage;
use crate::intake::Outbound;
use crate::intake::identity::{self, SenderIdentity, SenderInfo};
use crate::store::RawMessage;

/// Key of an open batch: owner plus resolved sender identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub owner: i64,
    pub identity: SenderIdentity,
}

/// An open batch, owned exclusively by the buffer table.
struct OpenBatch {
    messages: Vec<RawMessage>,
    /// Captured from the first message; later messages never update it.
    sender_info: SenderInfo,
    chat_id: i64,
    owner: i64,
    /// The one live expiry timer. Replaced (and the old one aborted) on
    /// every arrival.
    timer: Option<JoinHandle<()>>,
}

type BufferTable = Arc<Mutex<HashMap<BufferKey, OpenBatch>>>;

/// A batch detached from the buffer, ready for attribution.
#[derive(Debug, Clone)]
pub struct FlushedBatch {
    pub owner: i64,
    pub chat_id: i64,
    pub sender_info: SenderInfo,
    pub messages: Vec<RawMessage>,
}

/// Receives batches once their quiet period elapses.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn flush(&self, batch: FlushedBatch);
}

/// Per-key message coalescing with debounce.
pub struct MessageBuffer {
    table: BufferTable,
    quiet_period: Duration,
    outbound: Arc<dyn Outbound>,
    sink: Arc<dyn BatchSink>,
}

impl MessageBuffer {
    pub fn new(
        quiet_period: Duration,
        outbound: Arc<dyn Outbound>,
        sink: Arc<dyn BatchSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            quiet_period,
            outbound,
            sink,
        })
    }

    /// Buffer one forwarded message and (re)start its batch's expiry timer.
    pub async fn ingest(&self, owner: i64, chat_id: i64, envelope: &ForwardedMessage) {
        let (identity, sender_info) = identity::resolve(envelope);
        let key = BufferKey { owner, identity };
        let message = RawMessage {
            text: envelope.text.clone(),
            forward_date: envelope.forward_date,
        };

        let mut table = self.table.lock().await;
        let batch = table.entry(key.clone()).or_insert_with(|| OpenBatch {
            messages: Vec::new(),
            sender_info,
            chat_id,
            owner,
            timer: None,
        });
        batch.messages.push(message);

        // Restart-on-arrival: the previous timer must never fire. Abort is a
        // hard cancellation — an aborted timer performs no buffer mutation
        // and no downstream call.
        if let Some(old) = batch.timer.take() {
            old.abort();
        }
        batch.timer = Some(tokio::spawn(expire_after(
            Arc::clone(&self.table),
            self.quiet_period,
            Arc::clone(&self.outbound),
            Arc::clone(&self.sink),
            key,
            batch.chat_id,
        )));

        debug!(
            owner,
            buffered = batch.messages.len(),
            "Buffered forwarded message"
        );
    }

    /// Number of open batches (for observability and tests).
    pub async fn open_batches(&self) -> usize {
        self.table.lock().await.len()
    }
}

/// Expiry timer body: wait out the quiet period, then detach and flush the
/// batch. Runs to completion at most once per uninterrupted run of arrivals
/// for a key.
async fn expire_after(
    table: BufferTable,
    quiet_period: Duration,
    outbound: Arc<dyn Outbound>,
    sink: Arc<dyn BatchSink>,
    key: BufferKey,
    chat_id: i64,
) {
    outbound.send_typing(chat_id).await;
    tokio::time::sleep(quiet_period).await;

    let batch = {
        let mut table = table.lock().await;
        table.remove(&key)
    };
    // Guard: the batch may already be gone if an arrival won the race after
    // our sleep finished. A new ingest for this key starts fresh.
    let Some(batch) = batch else {
        return;
    };
    if batch.messages.is_empty() {
        return;
    }

    debug!(
        owner = batch.owner,
        count = batch.messages.len(),
        "Quiet period elapsed, flushing batch"
    );

    sink.flush(FlushedBatch {
        owner: batch.owner,
        chat_id: batch.chat_id,
        sender_info: batch.sender_info,
        messages: batch.messages,
    })
    .await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::TgUser;
    use crate::store::Lead;
    use tokio::sync::Mutex as AsyncMutex;

    const QUIET: Duration = Duration::from_millis(80);

    struct SilentOutbound;

    #[async_trait]
    impl Outbound for SilentOutbound {
        async fn send_typing(&self, _chat_id: i64) {}
        async fn announce_new_lead(&self, _chat_id: i64, _lead: &Lead, _message_count: usize) {}
        async fn prompt_merge(&self, _chat_id: i64, _candidate: &Lead) {}
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: AsyncMutex<Vec<FlushedBatch>>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn flush(&self, batch: FlushedBatch) {
            self.batches.lock().await.push(batch);
        }
    }

    fn buffer_with_sink() -> (Arc<MessageBuffer>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let buffer = MessageBuffer::new(QUIET, Arc::new(SilentOutbound), sink.clone());
        (buffer, sink)
    }

    fn from_user(message_id: i64, user_id: i64, text: &str) -> ForwardedMessage {
        ForwardedMessage {
            message_id,
            text: text.into(),
            forward_date: None,
            sender_user: Some(TgUser {
                id: user_id,
                first_name: Some("Ivan".into()),
                last_name: None,
                username: None,
            }),
            sender_name: None,
        }
    }

    fn anonymous(message_id: i64, text: &str) -> ForwardedMessage {
        ForwardedMessage {
            message_id,
            text: text.into(),
            forward_date: None,
            sender_user: None,
            sender_name: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(QUIET * 3).await;
    }

    #[tokio::test]
    async fn rapid_messages_coalesce_into_one_batch() {
        let (buffer, sink) = buffer_with_sink();

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            buffer.ingest(1, 555, &from_user(i as i64, 42, text)).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1, "exactly one flush per run");
        let texts: Vec<&str> = batches[0].messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(batches[0].owner, 1);
        assert_eq!(batches[0].chat_id, 555);
        drop(batches);

        assert_eq!(buffer.open_batches().await, 0);
    }

    #[tokio::test]
    async fn gap_longer_than_quiet_period_splits_batches() {
        let (buffer, sink) = buffer_with_sink();

        buffer.ingest(1, 555, &from_user(1, 42, "first run")).await;
        settle().await;
        buffer.ingest(1, 555, &from_user(2, 42, "second run")).await;
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].messages[0].text, "first run");
        assert_eq!(batches[1].messages[0].text, "second run");
    }

    #[tokio::test]
    async fn different_senders_do_not_coalesce() {
        let (buffer, sink) = buffer_with_sink();

        buffer.ingest(1, 555, &from_user(1, 42, "from ivan")).await;
        buffer.ingest(1, 555, &from_user(2, 43, "from pavel")).await;
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn same_sender_different_owners_do_not_coalesce() {
        let (buffer, sink) = buffer_with_sink();

        buffer.ingest(1, 555, &from_user(1, 42, "to owner 1")).await;
        buffer.ingest(2, 777, &from_user(2, 42, "to owner 2")).await;
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn anonymous_forwards_never_coalesce() {
        let (buffer, sink) = buffer_with_sink();

        buffer.ingest(1, 555, &anonymous(1, "anon one")).await;
        buffer.ingest(1, 555, &anonymous(2, "anon two")).await;
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.messages.len() == 1));
        assert!(batches.iter().all(|b| b.sender_info.is_anonymous()));
    }

    #[tokio::test]
    async fn sender_info_comes_from_first_message() {
        let (buffer, sink) = buffer_with_sink();

        let mut first = from_user(1, 42, "one");
        first.sender_user.as_mut().unwrap().username = Some("ivan".into());
        let mut second = from_user(2, 42, "two");
        second.sender_user.as_mut().unwrap().username = Some("renamed".into());

        buffer.ingest(1, 555, &first).await;
        buffer.ingest(1, 555, &second).await;
        settle().await;

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].sender_info.username.as_deref(), Some("ivan"));
    }

    #[tokio::test]
    async fn timer_replacement_extends_the_quiet_period() {
        let (buffer, sink) = buffer_with_sink();

        buffer.ingest(1, 555, &from_user(1, 42, "one")).await;
        // Keep poking the batch well before the timer would fire; in total
        // more than one quiet period passes without a flush.
        for i in 0..6 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            buffer.ingest(1, 555, &from_user(2 + i, 42, "more")).await;
        }
        assert_eq!(sink.batches.lock().await.len(), 0);

        settle().await;
        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].messages.len(), 7);
    }
}
