//! Text-generation backend abstraction.
//!
//! Workflow nodes only need "prompt in, text out". Richer provider features
//! (system prompts, structured output) stay behind the implementations.

use crate::error::GenerationError;
use async_trait::async_trait;

/// Trait for text-generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails or the prompt is empty.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Returns the backend name, used in logs and node output.
    fn name(&self) -> &str;
}

/// Deterministic offline generator.
///
/// Produces a short piece of text derived from the prompt. Used as the
/// default backend so that workflows run end to end without a model server.
#[derive(Debug, Clone)]
pub struct CannedGenerator {
    closing: String,
}

impl CannedGenerator {
    /// Creates a generator with the default closing sentence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            closing: "Generated offline; configure a model backend for richer output.".to_string(),
        }
    }

    /// Replaces the closing sentence appended to every response.
    #[must_use]
    pub fn with_closing(mut self, closing: impl Into<String>) -> Self {
        self.closing = closing.into();
        self
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let mut subject = prompt.to_string();
        if let Some(first) = subject.get(..1) {
            let upper = first.to_uppercase();
            subject.replace_range(..1, &upper);
        }
        let subject = subject.trim_end_matches(['.', '!', '?']);

        Ok(format!("{subject}. {}", self.closing))
    }

    fn name(&self) -> &str {
        "canned"
    }
}
