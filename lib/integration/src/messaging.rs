//! Outbound messaging capability.

use crate::error::MessagingError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Confirmation that a message was accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Transport-assigned message identifier.
    pub message_id: String,
    /// Where the message went.
    pub target: String,
    /// When the transport accepted it.
    pub delivered_at: DateTime<Utc>,
}

/// Sends messages to a named target (channel, address, chat).
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends `message` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is rejected.
    async fn send(&self, target: &str, message: &str) -> Result<DeliveryReceipt, MessagingError>;
}

/// A message captured by [`Outbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: String,
    pub message: String,
    pub receipt: DeliveryReceipt,
}

/// In-memory sender that records every message it accepts.
///
/// Stands in for a real chat or mail transport; the recorded messages can be
/// inspected with [`Outbox::sent`].
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentMessage>>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessageSender for Outbox {
    async fn send(&self, target: &str, message: &str) -> Result<DeliveryReceipt, MessagingError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(MessagingError::MissingTarget);
        }
        if message.trim().is_empty() {
            return Err(MessagingError::EmptyMessage);
        }

        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        let receipt = DeliveryReceipt {
            message_id: format!("msg-{}", sent.len() + 1),
            target: target.to_string(),
            delivered_at: Utc::now(),
        };
        sent.push(SentMessage {
            target: target.to_string(),
            message: message.to_string(),
            receipt: receipt.clone(),
        });

        info!(target, message_id = %receipt.message_id, "message recorded in outbox");
        Ok(receipt)
    }
}
