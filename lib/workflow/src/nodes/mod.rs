//! Built-in node types.
//!
//! Action nodes reach the outside world only through the capabilities in
//! [`Capabilities`], so hosts decide which backends a deployment uses.

mod generate_text;
mod http_request;
mod send_message;
mod set_data;
mod trigger;

pub use generate_text::{GENERATE_TEXT, generate_text};
pub use http_request::{HTTP_REQUEST, http_request};
pub use send_message::{SEND_MESSAGE, send_message};
pub use set_data::{SET_DATA, set_data};
pub use trigger::{MANUAL_TRIGGER, SCHEDULE_TRIGGER, WEEKDAYS, manual_trigger, schedule_trigger};

use crate::registry::NodeTypeRegistry;
use aura_ai::TextGenerator;
use aura_integration::{HttpCaller, MessageSender};
use std::fmt;
use std::sync::Arc;

/// External capabilities used by the built-in action nodes.
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn TextGenerator>,
    pub messenger: Arc<dyn MessageSender>,
    pub http: Arc<dyn HttpCaller>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("generator", &self.generator.name())
            .finish_non_exhaustive()
    }
}

/// Registers every built-in node type.
pub fn register_builtin(registry: &NodeTypeRegistry, capabilities: &Capabilities) {
    registry.register(schedule_trigger());
    registry.register(manual_trigger());
    registry.register(set_data());
    registry.register(generate_text(Arc::clone(&capabilities.generator)));
    registry.register(send_message(Arc::clone(&capabilities.messenger)));
    registry.register(http_request(Arc::clone(&capabilities.http)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Node, NodeId, Workflow, WorkflowDefinition};
    use crate::engine::{ExecutionEngine, NoopObserver, RunRequest};
    use crate::execution::{Execution, ExecutionMode, ExecutionStatus};
    use crate::node_type::TriggerKind;
    use async_trait::async_trait;
    use aura_ai::CannedGenerator;
    use aura_core::{ExecutionId, WorkflowId};
    use aura_integration::{HttpError, HttpMethod, HttpRequest, HttpResponse, Outbox};
    use serde_json::{Value as JsonValue, json};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Answers every request with a fixed status and records what it saw.
    struct FakeHttp {
        status: u16,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl FakeHttp {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpCaller for FakeHttp {
        async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status: self.status,
                headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
                body: json!({"url": request.url}),
            })
        }
    }

    struct Fixture {
        registry: Arc<NodeTypeRegistry>,
        engine: ExecutionEngine,
        outbox: Arc<Outbox>,
        http: Arc<FakeHttp>,
    }

    fn fixture(status: u16) -> Fixture {
        let outbox = Arc::new(Outbox::new());
        let http = FakeHttp::new(status);
        let registry = Arc::new(NodeTypeRegistry::new());
        register_builtin(
            &registry,
            &Capabilities {
                generator: Arc::new(CannedGenerator::new().with_closing("Done.")),
                messenger: outbox.clone(),
                http: http.clone(),
            },
        );
        Fixture {
            engine: ExecutionEngine::new(Arc::clone(&registry)),
            registry,
            outbox,
            http,
        }
    }

    async fn run(fixture: &Fixture, definition: WorkflowDefinition) -> Execution {
        let request = RunRequest {
            execution_id: ExecutionId::new(),
            workflow: Workflow::from_definition(WorkflowId::new(), definition),
            mode: ExecutionMode::Manual,
            seed: None,
        };
        fixture
            .engine
            .run(request, CancellationToken::new(), &NoopObserver)
            .await
    }

    fn output(execution: &Execution, node: &str) -> Vec<serde_json::Map<String, JsonValue>> {
        execution
            .result_for(&NodeId::from(node))
            .map(|r| r.output.clone())
            .unwrap_or_default()
    }

    #[test]
    fn builtin_types_are_registered() {
        let fixture = fixture(200);
        let names: Vec<String> = fixture
            .registry
            .list()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            [
                GENERATE_TEXT,
                HTTP_REQUEST,
                MANUAL_TRIGGER,
                SCHEDULE_TRIGGER,
                SEND_MESSAGE,
                SET_DATA
            ]
        );
        let schedule = fixture.registry.get(SCHEDULE_TRIGGER).expect("registered");
        assert_eq!(schedule.trigger_kind(), Some(TriggerKind::Schedule));
    }

    #[tokio::test]
    async fn scheduled_digest_runs_end_to_end() {
        let fixture = fixture(200);
        let definition = WorkflowDefinition::new("daily digest")
            .with_node(
                Node::new("trigger", "Every morning", SCHEDULE_TRIGGER)
                    .with_parameters(json!({"schedule": "daily", "time": "09:00"})),
            )
            .with_node(
                Node::new("topic", "Pick topic", SET_DATA)
                    .with_parameters(json!({"values": {"topic": "demo"}})),
            )
            .with_node(
                Node::new("write", "Write", GENERATE_TEXT)
                    .with_parameters(json!({"prompt": "write about {{topic}}"})),
            )
            .connect("trigger", "topic")
            .connect("topic", "write");

        let execution = run(&fixture, definition).await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        let order: Vec<&str> = execution.results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(order, ["trigger", "topic", "write"]);

        let trigger = output(&execution, "trigger");
        assert!(trigger[0].contains_key("triggered_at"));
        assert_eq!(trigger[0]["mode"], json!("manual"));

        let written = output(&execution, "write");
        assert_eq!(written[0]["topic"], json!("demo"));
        assert_eq!(written[0]["text"], json!("Write about demo. Done."));
    }

    #[tokio::test]
    async fn set_data_can_drop_input_fields() {
        let fixture = fixture(200);
        let definition = WorkflowDefinition::new("replace")
            .with_node(Node::new("t", "Start", MANUAL_TRIGGER))
            .with_node(
                Node::new("s", "Replace", SET_DATA)
                    .with_parameters(json!({"values": {"a": 1}, "keep_input": false})),
            )
            .connect("t", "s");

        let execution = run(&fixture, definition).await;

        let rows = output(&execution, "s");
        assert_eq!(rows.len(), 1);
        assert_eq!(JsonValue::Object(rows[0].clone()), json!({"a": 1}));
    }

    #[tokio::test]
    async fn send_message_delivers_and_emits_receipt() {
        let fixture = fixture(200);
        let definition = WorkflowDefinition::new("notify")
            .with_node(Node::new("t", "Start", MANUAL_TRIGGER))
            .with_node(
                Node::new("m", "Notify", SEND_MESSAGE)
                    .with_parameters(json!({"target": "#ops", "message": "hello"})),
            )
            .connect("t", "m");

        let execution = run(&fixture, definition).await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        let sent = fixture.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "hello");
        let rows = output(&execution, "m");
        assert_eq!(rows[0]["delivery"]["target"], json!("#ops"));
    }

    #[tokio::test]
    async fn send_message_without_target_fails_the_run() {
        let fixture = fixture(200);
        let definition = WorkflowDefinition::new("notify")
            .with_node(
                Node::new("m", "Notify", SEND_MESSAGE).with_parameters(json!({"message": "hello"})),
            );

        let execution = run(&fixture, definition).await;

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.results[0].attempts, 0);
        assert!(fixture.outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn http_request_ignores_body_for_get() {
        let fixture = fixture(200);
        let definition = WorkflowDefinition::new("fetch").with_node(
            Node::new("h", "Fetch", HTTP_REQUEST).with_parameters(json!({
                "url": "https://example.test/items",
                "headers": {"x-attempt": 1},
                "body": {"ignored": true}
            })),
        );

        let execution = run(&fixture, definition).await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        let seen = fixture.http.seen.lock().unwrap().clone();
        assert_eq!(seen[0].method, HttpMethod::Get);
        assert_eq!(seen[0].body, None);
        assert_eq!(seen[0].headers.get("x-attempt").map(String::as_str), Some("1"));

        let rows = output(&execution, "h");
        assert_eq!(rows[0]["status"], json!(200));
        assert_eq!(rows[0]["body"]["url"], json!("https://example.test/items"));
    }

    #[tokio::test]
    async fn http_request_sends_body_for_post() {
        let fixture = fixture(201);
        let definition = WorkflowDefinition::new("create").with_node(
            Node::new("h", "Create", HTTP_REQUEST).with_parameters(json!({
                "method": "POST",
                "url": "https://example.test/items",
                "body": {"name": "x"}
            })),
        );

        run(&fixture, definition).await;

        let seen = fixture.http.seen.lock().unwrap().clone();
        assert_eq!(seen[0].body, Some(json!({"name": "x"})));
    }

    #[tokio::test]
    async fn http_error_status_fails_unless_disabled() {
        let fixture = fixture(503);
        let strict = WorkflowDefinition::new("strict").with_node(
            Node::new("h", "Fetch", HTTP_REQUEST)
                .with_parameters(json!({"url": "https://example.test/down"})),
        );
        let lenient = WorkflowDefinition::new("lenient").with_node(
            Node::new("h", "Fetch", HTTP_REQUEST).with_parameters(
                json!({"url": "https://example.test/down", "fail_on_error_status": false}),
            ),
        );

        let failed = run(&fixture, strict).await;
        let passed = run(&fixture, lenient).await;

        assert_eq!(failed.status, ExecutionStatus::Error);
        let message = failed.error.map(|e| e.message).unwrap_or_default();
        assert!(message.contains("503"), "{message}");
        assert_eq!(passed.status, ExecutionStatus::Success);
        assert_eq!(output(&passed, "h")[0]["status"], json!(503));
    }
}
