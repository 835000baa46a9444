//! Trigger node types.
//!
//! Triggers are seeded by the engine with a single row (empty, or the run's
//! seed row) and stamp it with the time the run was triggered.

use crate::error::NodeError;
use crate::node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, Row, TriggerKind,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

pub const SCHEDULE_TRIGGER: &str = "scheduleTrigger";
pub const MANUAL_TRIGGER: &str = "manualTrigger";

/// Weekday names accepted by the `weekday` property.
pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// `scheduleTrigger`: fired by the trigger scheduler.
#[must_use]
pub fn schedule_trigger() -> NodeType {
    let descriptor = NodeTypeDescriptor::new(SCHEDULE_TRIGGER, "Schedule Trigger", NodeGroup::Trigger)
        .trigger(TriggerKind::Schedule)
        .with_description("Starts the workflow on a daily, weekly, monthly or cron schedule")
        .with_property(
            PropertyDecl::options("schedule", "Schedule", ["daily", "weekly", "monthly", "cron"])
                .with_default(json!("daily")),
        )
        .with_property(
            PropertyDecl::string("time", "Time (HH:MM)")
                .with_default(json!("09:00"))
                .shown_when("schedule", [json!("daily"), json!("weekly"), json!("monthly")]),
        )
        .with_property(
            PropertyDecl::options("weekday", "Weekday", WEEKDAYS)
                .with_default(json!("monday"))
                .shown_when("schedule", [json!("weekly")]),
        )
        .with_property(
            PropertyDecl::number("day_of_month", "Day of Month")
                .with_default(json!(1))
                .shown_when("schedule", [json!("monthly")]),
        )
        .with_property(
            PropertyDecl::string("cron_expression", "Cron Expression")
                .required()
                .shown_when("schedule", [json!("cron")]),
        );
    NodeType::new(descriptor, ScheduleTrigger)
}

/// `manualTrigger`: fired on explicit request.
#[must_use]
pub fn manual_trigger() -> NodeType {
    let descriptor = NodeTypeDescriptor::new(MANUAL_TRIGGER, "Manual Trigger", NodeGroup::Trigger)
        .trigger(TriggerKind::Manual)
        .with_description("Starts the workflow when run by hand");
    NodeType::new(descriptor, ManualTrigger)
}

struct ScheduleTrigger;

#[async_trait]
impl NodeBehavior for ScheduleTrigger {
    async fn execute(
        &self,
        ctx: &NodeContext,
        _params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        Ok(stamp(inputs, |row| {
            row.insert("mode".to_string(), json!(ctx.mode.as_str()));
        }))
    }
}

struct ManualTrigger;

#[async_trait]
impl NodeBehavior for ManualTrigger {
    async fn execute(
        &self,
        _ctx: &NodeContext,
        _params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError> {
        Ok(stamp(inputs, |_| {}))
    }
}

fn stamp(inputs: Vec<Row>, extra: impl Fn(&mut Row)) -> Vec<Row> {
    let triggered_at = JsonValue::String(Utc::now().to_rfc3339());
    inputs
        .into_iter()
        .map(|mut row| {
            row.insert("triggered_at".to_string(), triggered_at.clone());
            extra(&mut row);
            row
        })
        .collect()
}
