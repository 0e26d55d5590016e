//! End-to-end intake tests: coalescing, attribution, and decision
//! resolution over an in-memory store with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use lead_assist::channels::{ForwardedMessage, TgUser};
use lead_assist::config::BotConfig;
use lead_assist::error::{ExtractError, IntakeError};
use lead_assist::extract::{ExtractedFields, Extractor};
use lead_assist::intake::{IntakeEngine, Outbound};
use lead_assist::store::{Lead, LeadStore, SqliteLeadStore};

const OWNER: i64 = 1000;
const CHAT: i64 = 555;
const QUIET: Duration = Duration::from_millis(80);

// ── Scripted collaborators ──────────────────────────────────────────

/// Extractor returning whatever the test scripted last.
#[derive(Default)]
struct ScriptedExtractor {
    fields: Mutex<ExtractedFields>,
}

impl ScriptedExtractor {
    async fn script(&self, fields: ExtractedFields) {
        *self.fields.lock().await = fields;
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _combined_text: &str) -> Result<ExtractedFields, ExtractError> {
        Ok(self.fields.lock().await.clone())
    }
}

/// Extractor that always fails — the engine must degrade to empty fields.
struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(&self, _combined_text: &str) -> Result<ExtractedFields, ExtractError> {
        Err(ExtractError::RequestFailed("scripted failure".into()))
    }
}

/// Records everything the engine sends to the chat.
#[derive(Default)]
struct RecordingOutbound {
    /// (chat_id, lead_id, message_count)
    announced: Mutex<Vec<(i64, i64, usize)>>,
    /// (chat_id, candidate_lead_id)
    prompts: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_typing(&self, _chat_id: i64) {}

    async fn announce_new_lead(&self, chat_id: i64, lead: &Lead, message_count: usize) {
        self.announced
            .lock()
            .await
            .push((chat_id, lead.id, message_count));
    }

    async fn prompt_merge(&self, chat_id: i64, candidate: &Lead) {
        self.prompts.lock().await.push((chat_id, candidate.id));
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    engine: Arc<IntakeEngine>,
    store: Arc<SqliteLeadStore>,
    extractor: Arc<ScriptedExtractor>,
    outbound: Arc<RecordingOutbound>,
}

fn test_config(window_minutes: u64) -> BotConfig {
    BotConfig {
        batch_quiet_period: QUIET,
        same_lead_window: Duration::from_secs(window_minutes * 60),
        ..BotConfig::default()
    }
}

async fn harness(window_minutes: u64) -> Harness {
    let store = Arc::new(SqliteLeadStore::new_memory().await.unwrap());
    let extractor = Arc::new(ScriptedExtractor::default());
    let outbound = Arc::new(RecordingOutbound::default());

    let engine = IntakeEngine::new(
        &test_config(window_minutes),
        Arc::clone(&store) as Arc<dyn LeadStore>,
        Arc::clone(&extractor) as Arc<dyn Extractor>,
        Arc::clone(&outbound) as Arc<dyn Outbound>,
    );

    Harness {
        engine,
        store,
        extractor,
        outbound,
    }
}

fn from_ivan(message_id: i64, text: &str) -> ForwardedMessage {
    ForwardedMessage {
        message_id,
        text: text.into(),
        forward_date: None,
        sender_user: Some(TgUser {
            id: 42,
            first_name: Some("Ivan".into()),
            last_name: None,
            username: Some("ivan".into()),
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

/// Wait out the quiet period plus slack so flushes complete.
async fn settle() {
    tokio::time::sleep(QUIET * 3).await;
}

/// Forward a run of messages with sub-quiet-period gaps and settle.
async fn forward_run(h: &Harness, envelopes: &[ForwardedMessage]) {
    for envelope in envelopes {
        h.engine.ingest(OWNER, CHAT, envelope).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    settle().await;
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn rapid_run_creates_one_lead_with_all_messages() {
    let h = harness(30).await;
    h.extractor
        .script(ExtractedFields {
            brand: Some("Magssory".into()),
            request: Some("Интеграция в Reels".into()),
            contact: None,
            dates: None,
        })
        .await;

    forward_run(
        &h,
        &[
            from_ivan(1, "Привет!"),
            from_ivan(2, "Мы бренд Magssory"),
            from_ivan(3, "Хотим интеграцию в Reels"),
        ],
    )
    .await;

    let leads = h.store.list_leads(OWNER).await.unwrap();
    assert_eq!(leads.len(), 1, "one batch, one lead");
    let lead = &leads[0];
    assert_eq!(lead.brand.as_deref(), Some("Magssory"));
    // Extractor found no contact, so sender info fills in.
    assert_eq!(lead.contact_name.as_deref(), Some("Ivan"));
    assert_eq!(lead.contact_telegram_id, Some(42));
    assert_eq!(lead.contact_username.as_deref(), Some("ivan"));

    let messages = h.store.get_messages(lead.id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].raw_text, "Привет!");
    assert_eq!(messages[2].raw_text, "Хотим интеграцию в Reels");

    assert_eq!(*h.outbound.announced.lock().await, vec![(CHAT, lead.id, 3)]);
    assert!(h.outbound.prompts.lock().await.is_empty());
    assert_eq!(h.engine.open_batches().await, 0);
}

#[tokio::test]
async fn second_run_within_window_prompts_and_merges() {
    let h = harness(30).await;
    forward_run(&h, &[from_ivan(1, "first"), from_ivan(2, "second")]).await;

    let candidate = h.store.list_leads(OWNER).await.unwrap().remove(0);

    // Second run from the same contact lands in the window.
    forward_run(&h, &[from_ivan(3, "third, later")]).await;

    assert_eq!(*h.outbound.prompts.lock().await, vec![(CHAT, candidate.id)]);
    assert_eq!(
        h.outbound.announced.lock().await.len(),
        1,
        "no auto-create while the decision is pending"
    );

    // The user picks "merge"; new extraction sees the whole history.
    h.extractor
        .script(ExtractedFields {
            brand: Some("Updated Brand".into()),
            request: None,
            contact: Some("Иван Петров".into()),
            dates: Some("февраль".into()),
        })
        .await;

    let outcome = h
        .engine
        .resolve_merge(OWNER, CHAT, candidate.id)
        .await
        .unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.total_messages, 3);

    // Merge created no new lead and re-extracted over all messages.
    let leads = h.store.list_leads(OWNER).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].brand.as_deref(), Some("Updated Brand"));
    assert_eq!(leads[0].contact_name.as_deref(), Some("Иван Петров"));
    assert_eq!(leads[0].dates.as_deref(), Some("февраль"));
    assert_eq!(h.store.get_messages(candidate.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn create_new_ignores_the_candidate() {
    let h = harness(30).await;
    forward_run(&h, &[from_ivan(1, "first lead")]).await;
    let candidate = h.store.list_leads(OWNER).await.unwrap().remove(0);

    forward_run(&h, &[from_ivan(2, "actually a new deal")]).await;
    assert_eq!(h.outbound.prompts.lock().await.len(), 1);

    let created = h.engine.resolve_create_new(OWNER, CHAT).await.unwrap();
    assert_ne!(created.id, candidate.id);

    let leads = h.store.list_leads(OWNER).await.unwrap();
    assert_eq!(leads.len(), 2);
    // The candidate kept only its own message.
    assert_eq!(h.store.get_messages(candidate.id).await.unwrap().len(), 1);
    assert_eq!(h.store.get_messages(created.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn double_resolution_reports_not_found_and_mutates_nothing() {
    let h = harness(30).await;
    forward_run(&h, &[from_ivan(1, "first")]).await;
    let candidate = h.store.list_leads(OWNER).await.unwrap().remove(0);

    forward_run(&h, &[from_ivan(2, "second run")]).await;
    h.engine
        .resolve_merge(OWNER, CHAT, candidate.id)
        .await
        .unwrap();
    let count_after_merge = h.store.get_messages(candidate.id).await.unwrap().len();

    // A stale double-tap on either button.
    assert!(matches!(
        h.engine.resolve_merge(OWNER, CHAT, candidate.id).await,
        Err(IntakeError::NoPendingDecision { .. })
    ));
    assert!(matches!(
        h.engine.resolve_create_new(OWNER, CHAT).await,
        Err(IntakeError::NoPendingDecision { .. })
    ));

    assert_eq!(h.store.list_leads(OWNER).await.unwrap().len(), 1);
    assert_eq!(
        h.store.get_messages(candidate.id).await.unwrap().len(),
        count_after_merge
    );
}

#[tokio::test]
async fn merge_into_foreign_lead_keeps_decision_answerable() {
    let h = harness(30).await;
    forward_run(&h, &[from_ivan(1, "first")]).await;
    let candidate = h.store.list_leads(OWNER).await.unwrap().remove(0);

    forward_run(&h, &[from_ivan(2, "second run")]).await;

    // Wrong lead id: NotFound, and the pending decision survives.
    assert!(matches!(
        h.engine.resolve_merge(OWNER, CHAT, 999_999).await,
        Err(IntakeError::LeadNotFound { .. })
    ));

    // The prompt can still be answered correctly afterwards.
    let outcome = h
        .engine
        .resolve_merge(OWNER, CHAT, candidate.id)
        .await
        .unwrap();
    assert_eq!(outcome.added, 1);
}

#[tokio::test]
async fn runs_outside_window_never_prompt() {
    // Window of zero minutes: every candidate is already stale.
    let h = harness(0).await;
    forward_run(&h, &[from_ivan(1, "first")]).await;
    forward_run(&h, &[from_ivan(2, "second, much later")]).await;

    assert!(h.outbound.prompts.lock().await.is_empty());
    assert_eq!(h.store.list_leads(OWNER).await.unwrap().len(), 2);
}

#[tokio::test]
async fn anonymous_forwards_each_become_their_own_lead() {
    let h = harness(30).await;

    // Arriving in immediate succession, without waiting in between.
    h.engine.ingest(OWNER, CHAT, &anonymous(1, "anon one")).await;
    h.engine.ingest(OWNER, CHAT, &anonymous(2, "anon two")).await;
    settle().await;

    let leads = h.store.list_leads(OWNER).await.unwrap();
    assert_eq!(leads.len(), 2);
    assert!(leads.iter().all(|l| l.contact_telegram_id.is_none()));
    // Anonymous batches skip the candidate query, so no prompt ever.
    assert!(h.outbound.prompts.lock().await.is_empty());
}

#[tokio::test]
async fn extraction_failure_still_creates_lead_from_sender_info() {
    let store = Arc::new(SqliteLeadStore::new_memory().await.unwrap());
    let outbound = Arc::new(RecordingOutbound::default());
    let engine = IntakeEngine::new(
        &test_config(30),
        Arc::clone(&store) as Arc<dyn LeadStore>,
        Arc::new(FailingExtractor) as Arc<dyn Extractor>,
        Arc::clone(&outbound) as Arc<dyn Outbound>,
    );

    // Hidden-user forward: only a free-text name is known.
    engine
        .ingest(
            OWNER,
            CHAT,
            &ForwardedMessage {
                message_id: 1,
                text: "предложение".into(),
                forward_date: None,
                sender_user: None,
                sender_name: Some("Ivan Petrov".into()),
            },
        )
        .await;
    settle().await;

    let leads = store.list_leads(OWNER).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].contact_name.as_deref(), Some("Ivan Petrov"));
    assert!(leads[0].brand.is_none());
    assert_eq!(outbound.announced.lock().await.len(), 1);
}

#[tokio::test]
async fn batches_are_isolated_per_owner() {
    let h = harness(30).await;

    h.engine.ingest(OWNER, CHAT, &from_ivan(1, "to owner A")).await;
    h.engine.ingest(2000, 777, &from_ivan(2, "to owner B")).await;
    settle().await;

    assert_eq!(h.store.list_leads(OWNER).await.unwrap().len(), 1);
    assert_eq!(h.store.list_leads(2000).await.unwrap().len(), 1);
    // Same contact, but different owners never share a prompt or a lead.
    assert!(h.outbound.prompts.lock().await.is_empty());
}
