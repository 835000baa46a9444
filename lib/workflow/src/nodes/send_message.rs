//! `sendMessage`: sends one message per row.

use crate::error::NodeError;
use crate::node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, Row,
};
use async_trait::async_trait;
use aura_integration::MessageSender;
use std::sync::Arc;

pub const SEND_MESSAGE: &str = "sendMessage";

#[must_use]
pub fn send_message(sender: Arc<dyn MessageSender>) -> NodeType {
    let descriptor = NodeTypeDescriptor::new(SEND_MESSAGE, "Send Message", NodeGroup::Action)
        .with_description("Sends a message to a channel or address")
        .with_property(PropertyDecl::string("target", "Target").required())
        .with_property(PropertyDecl::string("message", "Message").required());
    NodeType::new(descriptor, SendMessage { sender })
}

struct SendMessage {
    sender: Arc<dyn MessageSender>,
}

#[async_trait]
impl NodeBehavior for SendMessage {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        let target = params.require_str("target")?;
        let message = params.require_str("message")?;

        let mut outputs = Vec::with_capacity(inputs.len());
        for mut row in inputs {
            let receipt = self
                .sender
                .send(target, message)
                .await
                .map_err(|e| NodeError::from_error(&e))?;
            let receipt = serde_json::to_value(&receipt).map_err(|e| NodeError::from_error(&e))?;
            row.insert("delivery".to_string(), receipt);
            outputs.push(row);
        }
        Ok(outputs)
    }
}
