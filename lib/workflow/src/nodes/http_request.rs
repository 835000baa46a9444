//! `httpRequest`: performs one HTTP call per row.

use crate::error::NodeError;
use crate::node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, Row,
};
use async_trait::async_trait;
use aura_integration::{HttpCaller, HttpMethod, HttpRequest, HttpResponse};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

pub const HTTP_REQUEST: &str = "httpRequest";

#[must_use]
pub fn http_request(http: Arc<dyn HttpCaller>) -> NodeType {
    let descriptor = NodeTypeDescriptor::new(HTTP_REQUEST, "HTTP Request", NodeGroup::Action)
        .with_description("Calls an HTTP endpoint")
        .with_property(
            PropertyDecl::options("method", "Method", ["GET", "POST", "PUT", "PATCH", "DELETE"])
                .with_default(json!("GET")),
        )
        .with_property(PropertyDecl::string("url", "URL").required())
        .with_property(PropertyDecl::collection("headers", "Headers").with_default(json!({})))
        .with_property(
            PropertyDecl::collection("body", "Body")
                .shown_when("method", [json!("POST"), json!("PUT"), json!("PATCH")]),
        )
        .with_property(
            PropertyDecl::boolean("fail_on_error_status", "Fail On Error Status")
                .with_default(json!(true)),
        );
    NodeType::new(descriptor, HttpRequestNode { http })
}

struct HttpRequestNode {
    http: Arc<dyn HttpCaller>,
}

impl HttpRequestNode {
    fn build(params: &Parameters) -> Result<HttpRequest, NodeError> {
        let method: HttpMethod = params
            .str("method")
            .unwrap_or("GET")
            .parse()
            .map_err(|e: aura_integration::HttpError| {
                NodeError::invalid_parameter("method", e.to_string())
            })?;
        let mut request = HttpRequest::new(method, params.require_str("url")?);

        if let Some(headers) = params.object("headers") {
            for (name, value) in headers {
                let value = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.with_header(name.clone(), value);
            }
        }
        if method.has_body()
            && let Some(body) = params.get("body")
        {
            request = request.with_body(body.clone());
        }
        Ok(request)
    }
}

#[async_trait]
impl NodeBehavior for HttpRequestNode {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        let request = Self::build(params)?;
        let fail_on_error_status = params.bool("fail_on_error_status").unwrap_or(true);

        let mut outputs = Vec::with_capacity(inputs.len());
        for _ in &inputs {
            let response = self
                .http
                .request(request.clone())
                .await
                .map_err(|e| NodeError::from_error(&e))?;
            if fail_on_error_status && response.status >= 400 {
                return Err(NodeError::failed(format!(
                    "{} {} returned status {}",
                    request.method, request.url, response.status
                )));
            }
            outputs.push(response_row(response));
        }
        Ok(outputs)
    }
}

fn response_row(response: HttpResponse) -> Row {
    let mut row = Row::new();
    row.insert("status".to_string(), json!(response.status));
    row.insert("headers".to_string(), json!(response.headers));
    row.insert("body".to_string(), response.body);
    row
}
