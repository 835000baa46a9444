//! Error types for the integration crate.

use std::fmt;

/// Errors from outbound messaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// No delivery target was given.
    MissingTarget,
    /// The message body was empty.
    EmptyMessage,
    /// The underlying transport rejected the message.
    DeliveryFailed { target: String, reason: String },
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => write!(f, "message target is empty"),
            Self::EmptyMessage => write!(f, "message body is empty"),
            Self::DeliveryFailed { target, reason } => {
                write!(f, "delivery to '{target}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for MessagingError {}

/// Errors from outbound HTTP calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The URL could not be parsed.
    InvalidUrl { url: String, reason: String },
    /// The method is not supported.
    UnsupportedMethod { method: String },
    /// The request could not be sent or timed out.
    RequestFailed { reason: String },
    /// The response body could not be read.
    ResponseUnreadable { reason: String },
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => write!(f, "invalid url '{url}': {reason}"),
            Self::UnsupportedMethod { method } => write!(f, "unsupported http method: {method}"),
            Self::RequestFailed { reason } => write!(f, "http request failed: {reason}"),
            Self::ResponseUnreadable { reason } => {
                write!(f, "http response unreadable: {reason}")
            }
        }
    }
}

impl std::error::Error for HttpError {}
