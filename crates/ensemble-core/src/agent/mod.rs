//! Agent invocation boundary
//!
//! This module defines the executor's contract with external workers:
//! - AgentInvoker: the async dispatch trait
//! - InvokeError: dispatch failures
//! - Reserved agent ids that suspend execution instead of dispatching
//! - Canonicalization of declared agent ids

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Reserved id: pause the run and ask the human operator.
pub const HUMAN_ASSISTANT: &str = "human_assistant";

/// Reserved id: pause the plan for conditional re-planning.
pub const BRANCH_ORCHESTRATOR: &str = "branch_orchestrator";

/// Errors dispatching an agent call.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The canonical id matches no enabled agent
    #[error("Unknown agent id: {agent_id}. Choose from: {} or import the correct profile.", available.join(", "))]
    UnknownAgent {
        agent_id: String,
        available: Vec<String>,
    },
    /// The agent ran and reported failure
    #[error("{0}")]
    Failed(String),
}

/// Dispatch boundary for agent-call steps.
///
/// Implementations receive the canonicalized agent id and the fully
/// resolved parameter map. The two reserved ids never reach an invoker.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent_id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Value, InvokeError>;
}

/// Canonicalize a declared agent id: strip one trailing parenthesized
/// annotation (`"name(label)"` becomes `"name"`) and surrounding
/// whitespace.
pub fn canonicalize_agent_id(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_trailing_ws = raw.trim_end();
    if without_trailing_ws.ends_with(')') {
        if let Some(open) = without_trailing_ws.find('(') {
            return without_trailing_ws[..open].trim().to_string();
        }
    }
    raw.trim().to_string()
}

/// Detect the in-band failure marker on an agent payload.
///
/// A payload whose `error` key holds a truthy value reports failure even
/// though the call itself returned. The failure message is the payload's
/// top-level `details` string when present, otherwise the serialized
/// `error` value.
pub fn error_marker(output: &Value) -> Option<String> {
    let error = output.get("error")?;
    if !is_truthy(error) {
        return None;
    }
    match output.get("details") {
        Some(Value::String(details)) => Some(details.clone()),
        _ => Some(error.to_string()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_strips_trailing_annotation() {
        assert_eq!(
            canonicalize_agent_id("ai_redlining(apply_redlines)"),
            "ai_redlining"
        );
        assert_eq!(canonicalize_agent_id("name (label) "), "name");
        assert_eq!(canonicalize_agent_id("a(b)(c)"), "a");
    }

    #[test]
    fn test_canonicalize_leaves_plain_ids_alone() {
        assert_eq!(canonicalize_agent_id("talk_to_corpus"), "talk_to_corpus");
        assert_eq!(canonicalize_agent_id("  spaced  "), "spaced");
        assert_eq!(canonicalize_agent_id(""), "");
    }

    #[test]
    fn test_canonicalize_requires_closing_paren_at_end() {
        assert_eq!(canonicalize_agent_id("a(b) extra"), "a(b) extra");
        assert_eq!(canonicalize_agent_id("weird)"), "weird)");
    }

    #[test]
    fn test_error_marker_prefers_details_string() {
        let output = json!({ "error": true, "details": "document not found" });
        assert_eq!(error_marker(&output).as_deref(), Some("document not found"));
    }

    #[test]
    fn test_error_marker_serializes_error_value() {
        let output = json!({ "error": { "code": 404 } });
        assert_eq!(
            error_marker(&output).as_deref(),
            Some("{\"code\":404}")
        );
    }

    #[test]
    fn test_error_marker_ignores_falsy_values() {
        for output in [
            json!({ "error": null }),
            json!({ "error": false }),
            json!({ "error": 0 }),
            json!({ "error": "" }),
            json!({ "ok": true }),
        ] {
            assert!(error_marker(&output).is_none(), "false positive on {output}");
        }
    }
}
