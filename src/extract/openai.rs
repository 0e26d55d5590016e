//! OpenAI-backed extractor via rig-core.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::error::ExtractError;
use crate::extract::{ExtractedFields, Extractor};

/// Temperature for extraction (near-deterministic).
const EXTRACT_TEMPERATURE: f64 = 0.1;

/// Max tokens for the extraction call — the output is a small JSON object.
const EXTRACT_MAX_TOKENS: u64 = 500;

const SYSTEM_PROMPT: &str = r#"Ты анализируешь сообщения о рекламном сотрудничестве. Извлеки информацию:

- brand: Название компании/бренда
- request: Что хотят (1 короткое предложение на русском)
- contact: Имя контактного лица
- dates: Упомянутые даты/дедлайны

Верни ТОЛЬКО валидный JSON без markdown:
{"brand": "...", "request": "...", "contact": "...", "dates": "..."}

Если что-то не найдено, используй null."#;

/// Extractor backed by the OpenAI chat completions API.
pub struct OpenAiExtractor {
    client: rig::client::Client<openai::client::OpenAIResponsesExt>,
    model: String,
}

impl OpenAiExtractor {
    /// Create an extractor for the given model.
    pub fn new(api_key: secrecy::SecretString, model: impl Into<String>) -> Result<Self, ExtractError> {
        let model = model.into();
        let client = openai::Client::new(api_key.expose_secret())
            .map_err(|e| ExtractError::RequestFailed(format!("client setup: {e}")))?;
        tracing::info!(model = %model, "Extractor configured");
        Ok(Self { client, model })
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(&self, combined_text: &str) -> Result<ExtractedFields, ExtractError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(SYSTEM_PROMPT)
            .temperature(EXTRACT_TEMPERATURE)
            .max_tokens(EXTRACT_MAX_TOKENS)
            .build();

        let raw = agent
            .prompt(combined_text)
            .await
            .map_err(|e| ExtractError::RequestFailed(e.to_string()))?;

        parse_extraction(&raw)
    }
}

/// Parse the model output into fields, tolerating a markdown code fence.
fn parse_extraction(raw: &str) -> Result<ExtractedFields, ExtractError> {
    let content = strip_code_fence(raw.trim());

    let parsed: RawExtraction = serde_json::from_str(content)
        .map_err(|e| ExtractError::InvalidResponse(format!("{e}: {content}")))?;

    Ok(ExtractedFields {
        brand: normalize(parsed.brand),
        request: normalize(parsed.request),
        contact: normalize(parsed.contact),
        dates: normalize(parsed.dates),
    })
}

/// Raw JSON shape as returned by the model.
#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    request: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    dates: Option<String>,
}

/// Treat blank strings as absent.
fn normalize(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Strip a surrounding ```/```json fence if the model added one anyway.
fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}
