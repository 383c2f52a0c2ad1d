//! 📨 Dispatch messages: one envelope per batch, addressed to the ingest workflow.
//!
//! A message is the per-run template with three things layered on top:
//! - `meta`: child workflow meta, the group's collection and provider, the PDR (if any),
//!   and the workflow name. Later layers win.
//! - `cumulus_meta`: the state machine ARN, a fresh execution name, the queue URL, and the
//!   parent execution ARN (if any).
//! - `payload`: `{ "granules": [...] }`.
//!
//! Every other top-level key of the template is copied through untouched.
//!
//! ⚠️ Built once, never mutated. If you need to change a message after building it,
//! you need a different message.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::common::{Collection, DispatchHandle, Granule, Provider, WorkflowDefinition};

/// 🗝️ Where the message template lives in the resource store.
pub fn template_key(stack_name: &str) -> String {
    format!("{stack_name}/workflow_template.json")
}

/// 🗝️ Where a workflow's definition (`{name, arn}`) lives in the resource store.
pub fn workflow_file_key(stack_name: &str, workflow_name: &str) -> String {
    format!("{stack_name}/workflows/{workflow_name}.json")
}

/// 🏷️ `{prefix}{uuid v4}`. Unique enough that two batches never share an execution.
pub fn execution_name(prefix: Option<&str>) -> String {
    format!("{}{}", prefix.unwrap_or_default(), Uuid::new_v4())
}

/// 🔗 Turn a state machine ARN plus an execution name into the execution's ARN.
///
/// `arn:aws:states:us-east-1:1234:stateMachine:Ingest` + `abc` →
/// `arn:aws:states:us-east-1:1234:execution:Ingest:abc`. Either input empty → `None`.
pub fn build_execution_arn(state_machine_arn: &str, execution_name: &str) -> Option<String> {
    if state_machine_arn.is_empty() || execution_name.is_empty() {
        return None;
    }
    Some(format!(
        "{}:{}",
        state_machine_arn.replace(":stateMachine:", ":execution:"),
        execution_name
    ))
}

/// 📨 One batch, fully addressed and ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub queue_url: String,
    pub execution_arn: String,
    pub body: Value,
}

impl DispatchMessage {
    /// 🎟️ The handle a successful dispatch of this message yields.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle(self.execution_arn.clone())
    }

    /// 🌾 Granule ids carried in the payload, in batch order.
    pub fn granule_ids(&self) -> Vec<&str> {
        self.body["payload"]["granules"]
            .as_array()
            .map(|granules| {
                granules
                    .iter()
                    .filter_map(|granule| granule["granuleId"].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 🧰 Everything that is the same for every batch of one run. Read-only once built.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub template: Value,
    pub workflow: WorkflowDefinition,
    pub queue_url: String,
    pub parent_execution_arn: Option<String>,
    pub execution_name_prefix: Option<String>,
    pub child_workflow_meta: Map<String, Value>,
    pub pdr: Option<Value>,
}

impl DispatchContext {
    /// 📨 Build the message for one batch of one group.
    pub fn build_message(
        &self,
        collection: &Collection,
        provider: &Provider,
        granules: &[Granule],
    ) -> Result<DispatchMessage> {
        let mut custom_meta = self.child_workflow_meta.clone();
        custom_meta.insert(
            "collection".to_string(),
            serde_json::to_value(collection).context("💀 collection metadata refused to serialize")?,
        );
        custom_meta.insert(
            "provider".to_string(),
            serde_json::to_value(provider).context("💀 provider metadata refused to serialize")?,
        );
        if let Some(pdr) = &self.pdr {
            custom_meta.insert("pdr".to_string(), pdr.clone());
        }

        let execution_name = execution_name(self.execution_name_prefix.as_deref());
        let payload = json!({ "granules": granules });
        let body = build_queue_message(QueueMessageParts {
            template: &self.template,
            workflow: &self.workflow,
            queue_url: &self.queue_url,
            parent_execution_arn: self.parent_execution_arn.as_deref(),
            execution_name: &execution_name,
            custom_meta,
            payload,
        });

        let execution_arn = build_execution_arn(&self.workflow.arn, &execution_name)
            .with_context(|| {
                format!(
                    "💀 Workflow '{}' has no state machine ARN, so there is nowhere to send this batch. \
                     Check the workflow definition in the resource store.",
                    self.workflow.name
                )
            })?;

        Ok(DispatchMessage {
            queue_url: self.queue_url.clone(),
            execution_arn,
            body,
        })
    }
}

/// 🧩 The pieces [`build_queue_message`] stitches together.
#[derive(Debug)]
pub struct QueueMessageParts<'a> {
    pub template: &'a Value,
    pub workflow: &'a WorkflowDefinition,
    pub queue_url: &'a str,
    pub parent_execution_arn: Option<&'a str>,
    pub execution_name: &'a str,
    pub custom_meta: Map<String, Value>,
    pub payload: Value,
}

/// 🧵 Layer the per-batch bits over the template. Template keys we don't touch survive.
///
/// `null` custom meta values do not override the template (an absent collection stays
/// whatever the template said).
pub fn build_queue_message(parts: QueueMessageParts<'_>) -> Value {
    let mut message = parts.template.as_object().cloned().unwrap_or_default();

    let mut meta = object_at(parts.template, "meta");
    for (key, value) in parts.custom_meta {
        if !value.is_null() {
            meta.insert(key, value);
        }
    }
    meta.insert("workflow_name".to_string(), Value::from(parts.workflow.name.clone()));

    let mut cumulus_meta = object_at(parts.template, "cumulus_meta");
    cumulus_meta.insert("state_machine".to_string(), Value::from(parts.workflow.arn.clone()));
    cumulus_meta.insert("execution_name".to_string(), Value::from(parts.execution_name));
    cumulus_meta.insert("queueUrl".to_string(), Value::from(parts.queue_url));
    if let Some(parent) = parts.parent_execution_arn {
        cumulus_meta.insert("parentExecutionArn".to_string(), Value::from(parent));
    }

    message.insert("meta".to_string(), Value::Object(meta));
    message.insert("cumulus_meta".to_string(), Value::Object(cumulus_meta));
    message.insert("payload".to_string(), parts.payload);
    Value::Object(message)
}

fn object_at(value: &Value, key: &str) -> Map<String, Value> {
    value.get(key).and_then(Value::as_object).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "IngestGranule".to_string(),
            arn: "arn:aws:states:us-east-1:123:stateMachine:stack-IngestGranule".to_string(),
        }
    }

    #[test]
    fn the_one_where_the_execution_arn_is_derived_from_the_state_machine() {
        assert_eq!(
            build_execution_arn("arn:aws:states:us-east-1:123:stateMachine:wf", "run-1").as_deref(),
            Some("arn:aws:states:us-east-1:123:execution:wf:run-1")
        );
        assert_eq!(build_execution_arn("", "run-1"), None);
        assert_eq!(build_execution_arn("arn:aws:states:x:1:stateMachine:wf", ""), None);
    }

    #[test]
    fn the_one_where_execution_names_wear_the_prefix_and_never_repeat() {
        let a = execution_name(Some("prefix-"));
        let b = execution_name(Some("prefix-"));
        assert!(a.starts_with("prefix-"));
        assert_ne!(a, b, "two batches, two executions. that's the deal.");
        assert_eq!(execution_name(None).len(), 36, "bare uuid when there is no prefix");
    }

    #[test]
    fn the_one_where_the_template_keeps_what_we_do_not_touch() {
        let template = json!({
            "foo": "bar",
            "meta": { "template": "s3://bucket/template.json", "collection": "fake" },
            "cumulus_meta": { "message_source": "sfn", "queueUrl": "stale" }
        });
        let wf = workflow();
        let mut custom_meta = Map::new();
        custom_meta.insert("collection".to_string(), json!({"name": "MOD09GQ"}));
        custom_meta.insert("provider".to_string(), Value::Null);

        let message = build_queue_message(QueueMessageParts {
            template: &template,
            workflow: &wf,
            queue_url: "https://queue/url",
            parent_execution_arn: Some("arn:parent"),
            execution_name: "exec-1",
            custom_meta,
            payload: json!({"granules": []}),
        });

        assert_eq!(message["foo"], "bar");
        assert_eq!(message["meta"]["template"], "s3://bucket/template.json");
        assert_eq!(message["meta"]["collection"]["name"], "MOD09GQ", "custom meta overrides template");
        assert!(message["meta"].get("provider").is_none(), "null custom meta is ignored");
        assert_eq!(message["meta"]["workflow_name"], "IngestGranule");
        assert_eq!(message["cumulus_meta"]["message_source"], "sfn");
        assert_eq!(message["cumulus_meta"]["queueUrl"], "https://queue/url");
        assert_eq!(message["cumulus_meta"]["state_machine"], wf.arn);
        assert_eq!(message["cumulus_meta"]["execution_name"], "exec-1");
        assert_eq!(message["cumulus_meta"]["parentExecutionArn"], "arn:parent");
        assert_eq!(message["payload"], json!({"granules": []}));
    }

    #[test]
    fn the_one_where_a_batch_becomes_a_fully_addressed_message() -> Result<()> {
        let mut child_meta = Map::new();
        child_meta.insert("priority".to_string(), json!("high"));
        let context = DispatchContext {
            template: json!({}),
            workflow: workflow(),
            queue_url: "https://queue/url".to_string(),
            parent_execution_arn: None,
            execution_name_prefix: Some("pfx-".to_string()),
            child_workflow_meta: child_meta,
            pdr: Some(json!({"name": "abc.PDR"})),
        };
        let collection = Collection {
            name: "MOD09GQ".to_string(),
            version: "006".to_string(),
            extra: Map::new(),
        };
        let mut g1 = Granule::new("g-1");
        g1.collection_id = Some("MOD09GQ___006".to_string());
        let g2 = Granule::new("g-2");

        let message = context.build_message(&collection, &Provider::new("prov"), &[g1, g2])?;

        assert_eq!(message.queue_url, "https://queue/url");
        assert!(message.execution_arn.starts_with("arn:aws:states:us-east-1:123:execution:stack-IngestGranule:pfx-"));
        assert_eq!(message.granule_ids(), vec!["g-1", "g-2"]);
        assert_eq!(message.body["meta"]["priority"], "high");
        assert_eq!(message.body["meta"]["provider"]["id"], "prov");
        assert_eq!(message.body["meta"]["pdr"]["name"], "abc.PDR");
        assert!(message.body["cumulus_meta"].get("parentExecutionArn").is_none());
        assert_eq!(message.handle().0, message.execution_arn);
        Ok(())
    }
}
