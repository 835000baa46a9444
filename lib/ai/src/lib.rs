//! Text-generation capability for the aura workflow engine.
//!
//! Node executors depend only on the [`TextGenerator`] trait. This crate
//! provides two implementations:
//!
//! - [`CannedGenerator`]: deterministic, offline composition used when no
//!   model backend is configured
//! - [`OllamaGenerator`]: a local Ollama instance over HTTP

pub mod backend;
pub mod error;
pub mod ollama;

pub use backend::{CannedGenerator, TextGenerator};
pub use error::GenerationError;
pub use ollama::{OllamaConfig, OllamaGenerator};
