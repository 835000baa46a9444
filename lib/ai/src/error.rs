//! Error types for the AI crate.

use std::fmt;

/// Errors from text-generation backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The prompt was empty after trimming.
    EmptyPrompt,
    /// Provider is unavailable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request failed.
    RequestFailed { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPrompt => write!(f, "prompt is empty"),
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "generation provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "generation request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse generation response: {reason}")
            }
        }
    }
}

impl std::error::Error for GenerationError {}
