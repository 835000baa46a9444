//! Outbound capabilities used by aura workflow nodes.
//!
//! This crate provides:
//!
//! - **Messaging**: [`MessageSender`] trait and the recording [`Outbox`]
//! - **HTTP**: [`HttpCaller`] trait and the reqwest-backed [`ReqwestCaller`]

pub mod error;
pub mod http;
pub mod messaging;

pub use error::{HttpError, MessagingError};
pub use http::{HttpCaller, HttpMethod, HttpRequest, HttpResponse, ReqwestCaller};
pub use messaging::{DeliveryReceipt, MessageSender, Outbox, SentMessage};
