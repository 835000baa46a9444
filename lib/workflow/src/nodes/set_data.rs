//! `setData`: merges fixed values into every row.

use crate::error::NodeError;
use crate::node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, Row,
};
use async_trait::async_trait;
use serde_json::json;

pub const SET_DATA: &str = "setData";

#[must_use]
pub fn set_data() -> NodeType {
    let descriptor = NodeTypeDescriptor::new(SET_DATA, "Set Data", NodeGroup::Transform)
        .with_description("Adds or overwrites fields on each item")
        .with_property(PropertyDecl::collection("values", "Values").with_default(json!({})))
        .with_property(
            PropertyDecl::boolean("keep_input", "Keep Input Fields").with_default(json!(true)),
        );
    NodeType::new(descriptor, SetData)
}

struct SetData;

#[async_trait]
impl NodeBehavior for SetData {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        let values = params.object("values").cloned().unwrap_or_default();
        let keep_input = params.bool("keep_input").unwrap_or(true);

        Ok(inputs
            .into_iter()
            .map(|row| {
                let mut out = if keep_input { row } else { Row::new() };
                out.extend(values.clone());
                out
            })
            .collect())
    }
}
