//! Core types and utilities for the aura workflow engine.
//!
//! This crate provides the identifier types and the error-handling
//! foundation shared by every other aura crate.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, IdGenerator, ParseIdError, WorkflowId};
