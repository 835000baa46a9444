//! `generateText`: calls the text-generation capability once per row.

use crate::error::NodeError;
use crate::node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, Row,
};
use async_trait::async_trait;
use aura_ai::TextGenerator;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const GENERATE_TEXT: &str = "generateText";

#[must_use]
pub fn generate_text(generator: Arc<dyn TextGenerator>) -> NodeType {
    let descriptor = NodeTypeDescriptor::new(GENERATE_TEXT, "Generate Text", NodeGroup::Action)
        .with_description("Generates text from a prompt")
        .with_property(PropertyDecl::string("prompt", "Prompt").required())
        .with_property(
            PropertyDecl::string("output_field", "Output Field").with_default(json!("text")),
        );
    NodeType::new(descriptor, GenerateText { generator })
}

struct GenerateText {
    generator: Arc<dyn TextGenerator>,
}

#[async_trait]
impl NodeBehavior for GenerateText {
    async fn execute(
        &self,
        ctx: &NodeContext,
        params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        let prompt = params.require_str("prompt")?;
        let output_field = params.str("output_field").unwrap_or("text");

        let mut outputs = Vec::with_capacity(inputs.len());
        for mut row in inputs {
            let text = self
                .generator
                .generate(prompt)
                .await
                .map_err(|e| NodeError::from_error(&e))?;
            debug!(node_id = %ctx.node_id, backend = self.generator.name(), chars = text.len(), "text generated");
            row.insert(output_field.to_string(), json!(text));
            outputs.push(row);
        }
        Ok(outputs)
    }
}
