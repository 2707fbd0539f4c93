//! Parameter resolution
//!
//! Raw step parameters may reference earlier results with the token
//! `{{steps.<stepId>.<dotted.path>}}`. Resolution is a pure function over
//! the execution state: a string that is exactly one token becomes the
//! typed referenced value; tokens embedded in surrounding text are
//! replaced by the value's string form; anything unresolvable stays
//! verbatim. Only top-level string values of the raw map are examined.

use crate::types::{ExecutionState, StepId, StepStatus};
use serde_json::{Map, Value};

const TOKEN_PREFIX: &str = "{{steps.";
const TOKEN_SUFFIX: &str = "}}";

/// Resolve one raw parameter map against the current execution state.
pub fn resolve_parameters(raw: &Map<String, Value>, state: &ExecutionState) -> Map<String, Value> {
    let mut resolved = Map::new();
    for (key, value) in raw {
        let resolved_value = match value {
            Value::String(text) => resolve_string(text, state),
            other => other.clone(),
        };
        resolved.insert(key.clone(), resolved_value);
    }
    resolved
}

fn resolve_string(text: &str, state: &ExecutionState) -> Value {
    if let Some(inner) = whole_token(text) {
        return match lookup(inner, state) {
            Some(value) => value,
            None => Value::String(text.to_string()),
        };
    }
    Value::String(resolve_inline(text, state))
}

/// The entire string is exactly one token; yields its inner path.
fn whole_token(text: &str) -> Option<&str> {
    let inner = text
        .strip_prefix(TOKEN_PREFIX)?
        .strip_suffix(TOKEN_SUFFIX)?;
    if inner.is_empty() || inner.contains('}') {
        return None;
    }
    Some(inner)
}

fn resolve_inline(text: &str, state: &ExecutionState) -> String {
    let mut result = String::new();
    let mut rest = text;
    while let Some(start) = rest.find(TOKEN_PREFIX) {
        let (before, candidate) = rest.split_at(start);
        result.push_str(before);
        let after_prefix = &candidate[TOKEN_PREFIX.len()..];
        match after_prefix.find(TOKEN_SUFFIX) {
            Some(end) if end > 0 && !after_prefix[..end].contains('}') => {
                let inner = &after_prefix[..end];
                let token_len = TOKEN_PREFIX.len() + end + TOKEN_SUFFIX.len();
                match lookup(inner, state) {
                    Some(value) => result.push_str(&string_form(&value)),
                    None => result.push_str(&candidate[..token_len]),
                }
                rest = &candidate[token_len..];
            }
            _ => {
                // Not a closed token; keep the prefix literally.
                result.push_str(TOKEN_PREFIX);
                rest = after_prefix;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Walk `<stepId>.<dotted.path>` into the referenced step's result record.
///
/// The record is addressed as its serialized form, so the first path
/// segment is ordinarily `output`. Returns `None` when the step is absent,
/// not `succeeded`, or any segment fails to resolve.
fn lookup(inner: &str, state: &ExecutionState) -> Option<Value> {
    let mut segments = inner.split('.');
    let step_id = StepId::new(segments.next()?);
    let record = state.step(&step_id)?;
    if record.status != StepStatus::Succeeded {
        return None;
    }
    let root = serde_json::to_value(record).ok()?;
    let mut cursor = &root;
    for segment in segments {
        cursor = index_segment(cursor, segment)?;
    }
    Some(cursor.clone())
}

fn index_segment<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

/// String form used for inline substitution: strings verbatim, everything
/// else as its JSON text.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionState, Plan, Step, StepStatus};
    use chrono::Utc;
    use serde_json::json;

    fn state_with_succeeded(step_id: &str, output: Value) -> ExecutionState {
        let plan = Plan::new("t", "resolver fixture", Step::agent_call(step_id, "talk_to_corpus"));
        let mut state = ExecutionState::seed(&plan, Map::new()).unwrap();
        let record = state.steps.get_mut(&StepId::new(step_id)).unwrap();
        record.status = StepStatus::Succeeded;
        record.started_at = Some(Utc::now());
        record.ended_at = Some(Utc::now());
        record.output = output;
        state
    }

    fn raw(key: &str, value: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn test_whole_token_resolves_typed_value() {
        let state = state_with_succeeded("s1", json!({ "tcv": 1_000_000 }));
        let resolved = resolve_parameters(
            &raw("value", json!("{{steps.s1.output.tcv}}")),
            &state,
        );
        assert_eq!(resolved["value"], json!(1_000_000));
    }

    #[test]
    fn test_whole_token_passes_composites_untouched() {
        let state = state_with_succeeded("s1", json!({ "clauses": [1, 2, 3] }));
        let resolved = resolve_parameters(
            &raw("value", json!("{{steps.s1.output.clauses}}")),
            &state,
        );
        assert_eq!(resolved["value"], json!([1, 2, 3]));
    }

    #[test]
    fn test_inline_token_stringifies() {
        let state = state_with_succeeded("s1", json!({ "tcv": 1_000_000 }));
        let resolved = resolve_parameters(
            &raw("message", json!("TCV is {{steps.s1.output.tcv}}")),
            &state,
        );
        assert_eq!(resolved["message"], json!("TCV is 1000000"));
    }

    #[test]
    fn test_inline_resolves_every_occurrence() {
        let state = state_with_succeeded("s1", json!({ "a": "x", "b": 2 }));
        let resolved = resolve_parameters(
            &raw(
                "message",
                json!("{{steps.s1.output.a}} and {{steps.s1.output.b}}"),
            ),
            &state,
        );
        assert_eq!(resolved["message"], json!("x and 2"));
    }

    #[test]
    fn test_unsucceeded_step_leaves_token_verbatim() {
        let plan = Plan::new("t", "pending fixture", Step::agent_call("s1", "talk_to_corpus"));
        let state = ExecutionState::seed(&plan, Map::new()).unwrap();
        let resolved = resolve_parameters(
            &raw("value", json!("{{steps.s1.output.tcv}}")),
            &state,
        );
        assert_eq!(resolved["value"], json!("{{steps.s1.output.tcv}}"));
    }

    #[test]
    fn test_bad_path_leaves_token_verbatim() {
        let state = state_with_succeeded("s1", json!({ "tcv": 1 }));
        for token in [
            "{{steps.s1.output.missing}}",
            "{{steps.s1.output.tcv.deeper}}",
            "{{steps.nope.output}}",
        ] {
            let resolved = resolve_parameters(&raw("value", json!(token)), &state);
            assert_eq!(resolved["value"], json!(token), "token {token}");
        }
    }

    #[test]
    fn test_record_fields_are_addressable() {
        let state = state_with_succeeded("s1", json!({ "ok": true }));
        let resolved = resolve_parameters(&raw("value", json!("{{steps.s1.status}}")), &state);
        assert_eq!(resolved["value"], json!("succeeded"));
    }

    #[test]
    fn test_array_segments_index_numerically() {
        let state = state_with_succeeded("s1", json!({ "items": ["first", "second"] }));
        let resolved = resolve_parameters(
            &raw("value", json!("{{steps.s1.output.items.1}}")),
            &state,
        );
        assert_eq!(resolved["value"], json!("second"));
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let state = state_with_succeeded("s1", json!({ "tcv": 1 }));
        let mut params = Map::new();
        params.insert("count".to_string(), json!(3));
        params.insert(
            "nested".to_string(),
            json!({ "inner": "{{steps.s1.output.tcv}}" }),
        );
        let resolved = resolve_parameters(&params, &state);
        assert_eq!(resolved["count"], json!(3));
        // Nested strings are not examined.
        assert_eq!(resolved["nested"]["inner"], json!("{{steps.s1.output.tcv}}"));
    }

    #[test]
    fn test_malformed_tokens_stay_literal() {
        let state = state_with_succeeded("s1", json!({ "tcv": 1 }));
        for literal in ["{{steps.}}", "{{steps.s1.output.tcv", "plain text"] {
            let resolved = resolve_parameters(&raw("value", json!(literal)), &state);
            assert_eq!(resolved["value"], json!(literal), "literal {literal}");
        }
    }

    #[test]
    fn test_resolution_is_pure() {
        let state = state_with_succeeded("s1", json!({ "tcv": 7 }));
        let params = raw("value", json!("{{steps.s1.output.tcv}}"));
        let first = resolve_parameters(&params, &state);
        let second = resolve_parameters(&params, &state);
        assert_eq!(first, second);
    }
}
