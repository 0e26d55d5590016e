use std::sync::Arc;

use lead_assist::bot::{Bot, TelegramOutbound};
use lead_assist::channels::TelegramApi;
use lead_assist::config::BotConfig;
use lead_assist::extract::{Extractor, NoopExtractor, OpenAiExtractor};
use lead_assist::intake::IntakeEngine;
use lead_assist::store::{LeadStore, SqliteLeadStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    let config = BotConfig::from_env()?;

    eprintln!("🤖 Lead Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Quiet period: {:?}", config.batch_quiet_period);
    eprintln!(
        "   Same-lead window: {} min",
        config.same_lead_window_minutes()
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::env::var("LEAD_ASSIST_DB_PATH")
        .unwrap_or_else(|_| "./data/lead-assist.db".to_string());

    let store: Arc<dyn LeadStore> = Arc::new(
        SqliteLeadStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Extraction ───────────────────────────────────────────────────────
    let extractor: Arc<dyn Extractor> = match std::env::var("OPENAI_API_KEY") {
        Ok(api_key) => {
            let model = std::env::var("LEAD_ASSIST_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string());
            eprintln!("   Extraction: enabled (model: {model})");
            Arc::new(OpenAiExtractor::new(
                secrecy::SecretString::from(api_key),
                model,
            )?)
        }
        Err(_) => {
            eprintln!("   Extraction: disabled (OPENAI_API_KEY not set)");
            Arc::new(NoopExtractor)
        }
    };

    // ── Telegram + intake engine ─────────────────────────────────────────
    let api = Arc::new(TelegramApi::new(bot_token));
    if let Err(e) = api.health_check().await {
        eprintln!("   Warning: Telegram health check failed: {e}");
    }

    let outbound = Arc::new(TelegramOutbound::new(Arc::clone(&api)));
    let intake = IntakeEngine::new(&config, Arc::clone(&store), extractor, outbound);

    let bot = Bot::new(api, store, intake, config);
    bot.run().await?;

    Ok(())
}
