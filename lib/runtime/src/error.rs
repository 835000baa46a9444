//! Error types for the runtime crate.

use std::fmt;

/// Errors from controlling the automation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// `start` was called on a running service.
    AlreadyStarted,
    /// `start` was called after `shutdown`.
    ShutDown,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "automation service already started"),
            Self::ShutDown => write!(f, "automation service has been shut down"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Error returned by a status subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberCallbackError {
    pub message: String,
}

impl SubscriberCallbackError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SubscriberCallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber callback failed: {}", self.message)
    }
}

impl std::error::Error for SubscriberCallbackError {}
