//! Field extraction — turns combined message text into structured lead fields.
//!
//! The extractor is a collaborator of the intake engine: it may fail or
//! return nothing, and the engine treats both the same way (empty fields).

pub mod openai;

pub use openai::OpenAiExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Structured fields extracted from forwarded messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Company/brand name.
    pub brand: Option<String>,
    /// What they want, one short sentence.
    pub request: Option<String>,
    /// Contact person's name.
    pub contact: Option<String>,
    /// Mentioned dates or deadlines, free form.
    pub dates: Option<String>,
}

impl ExtractedFields {
    /// Whether extraction produced nothing at all.
    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.request.is_none()
            && self.contact.is_none()
            && self.dates.is_none()
    }
}

/// Async extraction collaborator.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract structured fields from combined message text.
    async fn extract(&self, combined_text: &str) -> Result<ExtractedFields, ExtractError>;
}

/// Extractor used when no API key is configured — always returns empty fields.
pub struct NoopExtractor;

#[async_trait]
impl Extractor for NoopExtractor {
    async fn extract(&self, _combined_text: &str) -> Result<ExtractedFields, ExtractError> {
        Ok(ExtractedFields::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_detected() {
        assert!(ExtractedFields::default().is_empty());
        let fields = ExtractedFields {
            brand: Some("Acme".into()),
            ..Default::default()
        };
        assert!(!fields.is_empty());
    }

    #[tokio::test]
    async fn noop_extractor_returns_empty() {
        let fields = NoopExtractor.extract("anything").await.unwrap();
        assert!(fields.is_empty());
    }
}
