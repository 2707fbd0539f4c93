use async_trait::async_trait;
use serde_json::{json, Map, Value};

use ensemble_core::agent::{AgentInvoker, InvokeError};

use crate::catalog::AgentCatalog;
use crate::definition::{AgentDefinition, AgentKind};

/// Deterministic, offline agent runner backed by a catalog.
///
/// Mock agents answer from their `mock_behavior` when it parses as
/// JSON, otherwise with a synthesized payload echoing the call. Real
/// agents are not wired up yet and answer with a stub notice.
pub struct SimulatedInvoker {
    catalog: AgentCatalog,
}

impl SimulatedInvoker {
    pub fn new(catalog: AgentCatalog) -> Self {
        Self { catalog }
    }

    /// Invoker over the default contract-assistant roster
    pub fn with_default_agents() -> Self {
        Self::new(AgentCatalog::with_default_agents())
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }
}

#[async_trait]
impl AgentInvoker for SimulatedInvoker {
    async fn invoke(
        &self,
        agent_id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, InvokeError> {
        let definition = match self.catalog.get(agent_id) {
            Some(definition) if definition.enabled => definition,
            _ => {
                return Err(InvokeError::UnknownAgent {
                    agent_id: agent_id.to_string(),
                    available: self.catalog.enabled_ids(),
                })
            }
        };

        if definition.kind == AgentKind::Real {
            return Ok(json!({ "info": "Real agent execution coming soon." }));
        }

        if let Some(behavior) = &definition.mock_behavior {
            if let Ok(canned) = serde_json::from_str::<Value>(behavior) {
                return Ok(canned);
            }
        }

        Ok(synthesize_output(definition, parameters))
    }
}

fn synthesize_output(definition: &AgentDefinition, parameters: &Map<String, Value>) -> Value {
    let mut output = json!({
        "agent_id": definition.id,
        "status": "ok",
        "summary": format!(
            "{} processed {} parameter(s).",
            definition.name,
            parameters.len()
        ),
        "received": Value::Object(parameters.clone()),
    });
    // Free-text behavior notes ride along instead of steering an LLM.
    if let Some(behavior) = &definition.mock_behavior {
        output["note"] = Value::String(behavior.clone());
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(invoker: &SimulatedInvoker, agent_id: &str) -> Result<Value, InvokeError> {
        tokio_test::block_on(invoker.invoke(agent_id, &Map::new()))
    }

    #[test]
    fn test_unknown_agent_lists_enabled_ids() {
        let invoker = SimulatedInvoker::new(AgentCatalog::new(vec![
            AgentDefinition::mock("a", "A", "first", "always"),
            AgentDefinition::mock("b", "B", "second", "never").disabled(),
        ]));
        let error = invoke(&invoker, "missing").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unknown agent id: missing. Choose from: a or import the correct profile."
        );
        // Disabled agents are treated as unknown too.
        assert!(invoke(&invoker, "b").is_err());
    }

    #[test]
    fn test_real_agents_answer_with_stub_notice() {
        let mut real = AgentDefinition::mock("live", "Live", "real integration", "later");
        real.kind = AgentKind::Real;
        let invoker = SimulatedInvoker::new(AgentCatalog::new(vec![real]));

        let output = invoke(&invoker, "live").unwrap();
        assert_eq!(output, json!({ "info": "Real agent execution coming soon." }));
    }

    #[test]
    fn test_mock_behavior_json_overrides_output() {
        let agent = AgentDefinition::mock("scripted", "Scripted", "canned", "tests")
            .with_mock_behavior(r#"{"documentId": "doc-7", "changes": 3}"#);
        let invoker = SimulatedInvoker::new(AgentCatalog::new(vec![agent]));

        let output = invoke(&invoker, "scripted").unwrap();
        assert_eq!(output, json!({ "documentId": "doc-7", "changes": 3 }));
    }

    #[test]
    fn test_synthesized_output_echoes_call() {
        let invoker = SimulatedInvoker::with_default_agents();
        let mut parameters = Map::new();
        parameters.insert("documentId".to_string(), json!("doc-12"));

        let output =
            tokio_test::block_on(invoker.invoke("talk_to_document", &parameters)).unwrap();
        assert_eq!(output["agent_id"], "talk_to_document");
        assert_eq!(output["received"]["documentId"], "doc-12");
        assert_eq!(
            output["summary"],
            "Talk To Document processed 1 parameter(s)."
        );
    }

    #[test]
    fn test_free_text_behavior_rides_along() {
        let agent = AgentDefinition::mock("noted", "Noted", "freeform", "tests")
            .with_mock_behavior("always return three issues");
        let invoker = SimulatedInvoker::new(AgentCatalog::new(vec![agent]));

        let output = invoke(&invoker, "noted").unwrap();
        assert_eq!(output["status"], "ok");
        assert_eq!(output["note"], "always return three issues");
    }
}
