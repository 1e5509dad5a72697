//! Shared JSON recovery for LLM responses
//!
//! Model output is free text that usually, but not always, contains a JSON
//! object. Recovery is attempted in a strict order:
//!
//! 1. a fenced ```json block
//! 2. any fenced ``` block
//! 3. the whole trimmed text
//! 4. the first top-level `{...}` span (string- and escape-aware)
//!
//! Anything that still fails degrades to [`AgentPayload::Degraded`]; this
//! function never returns an error and never panics. Downstream code must
//! check the degraded tag before trusting fields.

use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

const PARSE_ERROR_MESSAGE: &str = "Failed to parse JSON from response";

lazy_static! {
    static ref JSON_FENCE: Regex =
        Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("valid fence regex");
    static ref ANY_FENCE: Regex =
        Regex::new(r"```\s*([\s\S]*?)\s*```").expect("valid fence regex");
}

/// Structured output recovered from an agent response.
///
/// `Structured` holds the decoded string-keyed map; `Degraded` carries the
/// original text when every recovery step failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentPayload {
    Structured(Map<String, Value>),
    Degraded {
        raw_text: String,
        error_message: String,
    },
}

impl AgentPayload {
    /// Run the recovery procedure over raw response text.
    pub fn recover(text: &str) -> Self {
        if let Some(captures) = JSON_FENCE.captures(text) {
            if let Some(map) = parse_object(&captures[1]) {
                return AgentPayload::Structured(map);
            }
        }

        if let Some(captures) = ANY_FENCE.captures(text) {
            if let Some(map) = parse_object(&captures[1]) {
                return AgentPayload::Structured(map);
            }
        }

        if let Some(map) = parse_object(text) {
            return AgentPayload::Structured(map);
        }

        if let Some(span) = first_object_span(text) {
            if let Some(map) = parse_object(span) {
                return AgentPayload::Structured(map);
            }
        }

        AgentPayload::Degraded {
            raw_text: text.to_string(),
            error_message: PARSE_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AgentPayload::Degraded { .. })
    }

    /// Field lookup; always `None` on a degraded payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            AgentPayload::Structured(map) => map.get(key),
            AgentPayload::Degraded { .. } => None,
        }
    }

    /// String field convenience lookup.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The payload as a JSON value. A degraded payload serializes as
    /// `{"raw_text": ..., "parse_error": true, "error_message": ...}`.
    pub fn to_value(&self) -> Value {
        match self {
            AgentPayload::Structured(map) => Value::Object(map.clone()),
            AgentPayload::Degraded {
                raw_text,
                error_message,
            } => serde_json::json!({
                "raw_text": raw_text,
                "parse_error": true,
                "error_message": error_message,
            }),
        }
    }
}

impl Serialize for AgentPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AgentPayload::Structured(map) => map.serialize(serializer),
            AgentPayload::Degraded {
                raw_text,
                error_message,
            } => {
                let mut state = serializer.serialize_map(Some(3))?;
                state.serialize_entry("raw_text", raw_text)?;
                state.serialize_entry("parse_error", &true)?;
                state.serialize_entry("error_message", error_message)?;
                state.end()
            }
        }
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Find the first balanced `{ ... }` span, tracking string literals and
/// escapes so braces inside strings don't unbalance the match.
fn first_object_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        return start.map(|s| &text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(payload: &AgentPayload) -> &Map<String, Value> {
        match payload {
            AgentPayload::Structured(map) => map,
            AgentPayload::Degraded { .. } => panic!("expected structured payload"),
        }
    }

    #[test]
    fn test_all_recovery_forms_decode_identically() {
        let inputs = [
            "```json\n{\"ticker\": \"NVDA\", \"score\": 8}\n```",
            "```\n{\"ticker\": \"NVDA\", \"score\": 8}\n```",
            "{\"ticker\": \"NVDA\", \"score\": 8}",
            "Here is my analysis:\n{\"ticker\": \"NVDA\", \"score\": 8}\nHope that helps!",
        ];

        let expected = AgentPayload::recover(inputs[2]);
        for input in inputs {
            assert_eq!(AgentPayload::recover(input), expected, "input: {input}");
        }
        assert_eq!(expected.str_field("ticker"), Some("NVDA"));
    }

    #[test]
    fn test_unparsable_degrades_without_panicking() {
        for input in ["no json here at all", "", "{broken", "[1, 2, 3]", "42"] {
            let payload = AgentPayload::recover(input);
            assert!(payload.is_degraded(), "input: {input}");

            let value = payload.to_value();
            assert_eq!(value["parse_error"], true);
            assert_eq!(value["raw_text"], input);
            assert_eq!(value["error_message"], "Failed to parse JSON from response");
        }
    }

    #[test]
    fn test_invalid_fence_falls_through_to_object_span() {
        let text = "```json\nnot actually json\n``` but later: {\"ok\": true}";
        let payload = AgentPayload::recover(text);
        assert_eq!(payload.get("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_braces_inside_strings_stay_balanced() {
        let text = r#"Summary: {"note": "uses {curly} braces \" quoted", "n": 1} trailing"#;
        let payload = AgentPayload::recover(text);
        let map = structured(&payload);
        assert_eq!(map["n"], 1);
    }

    #[test]
    fn test_first_object_wins_over_later_objects() {
        let text = r#"{"first": 1} and then {"second": 2}"#;
        let payload = AgentPayload::recover(text);
        assert!(payload.get("first").is_some());
        assert!(payload.get("second").is_none());
    }

    #[test]
    fn test_degraded_serializes_with_parse_error_tag() {
        let payload = AgentPayload::recover("plain prose");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["parse_error"], true);
    }
}
