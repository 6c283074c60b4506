//! Turns a final-answer payload of any shape into one display string and an
//! attributed sender.
//!
//! Backends have sent plain strings, `{response: ...}`, `{content: ...}`,
//! `{content: {text: ...}}` and error envelopes over time. The payload is
//! first classified into a [`ResponsePayload`] and then handled by an ordered
//! match, so every accepted shape is listed in one place.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Sender used when the payload names no agent.
pub const DEFAULT_AGENT_NAME: &str = "Project Manager";
/// Sender used for clarification questions.
pub const DEFAULT_COORDINATOR_NAME: &str = "Chat Coordinator";
/// Shown when a payload carries no usable content.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "No response content was received.";
/// Shown when a payload cannot be rendered as text at all.
pub const UNRENDERABLE_RESPONSE: &str = "The response could not be displayed.";
/// Shown for an error envelope without any message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred while processing the request.";

/// Generic speakers that may appear as turn markers in generated text.
#[allow(clippy::expect_used)]
static GENERIC_TURN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(Human|User|AI|Machine|System|Assistant)\s*:\s?").expect("valid regex")
});

/// Names used when attributing a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Sender for payloads without `agent_name`/`processed_by`.
    #[serde(default = "default_agent")]
    pub default_agent: String,
    /// Sender for clarification questions.
    #[serde(default = "default_coordinator")]
    pub coordinator_agent: String,
}

fn default_agent() -> String {
    DEFAULT_AGENT_NAME.to_string()
}

fn default_coordinator() -> String {
    DEFAULT_COORDINATOR_NAME.to_string()
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            coordinator_agent: default_coordinator(),
        }
    }
}

/// Result of normalizing a response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedResponse {
    /// A displayable answer.
    Answer {
        /// Display text.
        content: String,
        /// Attributed sender.
        agent_name: String,
    },
    /// The payload reported a failure; callers surface it as an error.
    Failure {
        /// Error text.
        message: String,
        /// Agent named by the payload, if any, else the default.
        agent_name: String,
    },
}

impl NormalizedResponse {
    /// Attributed sender of either outcome.
    pub fn agent_name(&self) -> &str {
        match self {
            Self::Answer { agent_name, .. } | Self::Failure { agent_name, .. } => agent_name,
        }
    }
}

/// The shapes a response payload can take.
#[derive(Debug)]
enum ResponsePayload<'a> {
    /// A bare string.
    Text(&'a str),
    /// An object with well-known fields.
    Structured(&'a Map<String, Value>),
    /// `null`: nothing to show.
    Empty,
    /// Numbers, booleans, arrays: shown serialized.
    Opaque(&'a Value),
}

impl<'a> ResponsePayload<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Object(map) => Self::Structured(map),
            Value::Null => Self::Empty,
            other => Self::Opaque(other),
        }
    }
}

/// Normalize a response payload.
pub fn normalize(payload: &Value, config: &NormalizerConfig) -> NormalizedResponse {
    match ResponsePayload::classify(payload) {
        ResponsePayload::Text(text) => answer(text, &config.default_agent),
        ResponsePayload::Empty => NormalizedResponse::Answer {
            content: EMPTY_RESPONSE_PLACEHOLDER.to_string(),
            agent_name: config.default_agent.clone(),
        },
        ResponsePayload::Opaque(value) => answer(&serialize(value), &config.default_agent),
        ResponsePayload::Structured(map) => {
            let agent_name = agent_name_of(map).unwrap_or(&config.default_agent);

            if is_failure(map) {
                return NormalizedResponse::Failure {
                    message: failure_message(map),
                    agent_name: agent_name.to_string(),
                };
            }

            if let Some(questions) = clarification_questions(map) {
                return NormalizedResponse::Answer {
                    content: questions.join("\n"),
                    agent_name: config.coordinator_agent.clone(),
                };
            }

            let text = content_of(map).unwrap_or_else(|| serialize(payload));
            answer(&text, agent_name)
        }
    }
}

fn answer(text: &str, agent_name: &str) -> NormalizedResponse {
    let content = strip_scripted_dialogue(text, agent_name);
    NormalizedResponse::Answer {
        content: if content.is_empty() {
            EMPTY_RESPONSE_PLACEHOLDER.to_string()
        } else {
            content
        },
        agent_name: agent_name.to_string(),
    }
}

fn agent_name_of(map: &Map<String, Value>) -> Option<&str> {
    ["agent_name", "processed_by"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|name| !name.trim().is_empty())
}

fn is_failure(map: &Map<String, Value>) -> bool {
    let has_error = map.get("error").is_some_and(|e| !e.is_null());
    has_error || map.get("status").and_then(Value::as_str) == Some("error")
}

fn failure_message(map: &Map<String, Value>) -> String {
    match map.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(other) if !other.is_null() && !other.is_string() => other.to_string(),
        _ => content_of(map)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
    }
}

fn clarification_questions(map: &Map<String, Value>) -> Option<Vec<&str>> {
    if map.get("status").and_then(Value::as_str) != Some("clarification_needed") {
        return None;
    }
    let questions: Vec<&str> = map
        .get("clarification_questions")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    (!questions.is_empty()).then_some(questions)
}

fn content_of(map: &Map<String, Value>) -> Option<String> {
    if let Some(Value::String(s)) = map.get("content") {
        return Some(s.clone());
    }
    if let Some(Value::String(s)) = map.get("response") {
        return Some(s.clone());
    }
    map.get("content")
        .and_then(|c| c.get("text"))
        .map(crewlens_core::value_text)
}

fn serialize(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| UNRENDERABLE_RESPONSE.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    Agent,
    Other,
}

struct Turn<'a> {
    speaker: Speaker,
    lines: Vec<&'a str>,
}

/// Detect a turn marker at the start of `line`, returning the speaker and
/// the remainder of the line after the marker.
fn split_marker<'a>(line: &'a str, agent_name: &str) -> Option<(Speaker, &'a str)> {
    let trimmed = line.trim_start();
    if !agent_name.is_empty() {
        if let Some(rest) = trimmed
            .strip_prefix(agent_name)
            .and_then(|r| r.trim_start().strip_prefix(':'))
        {
            return Some((Speaker::Agent, rest.strip_prefix(' ').unwrap_or(rest)));
        }
    }

    let caps = GENERIC_TURN_MARKER.captures(line)?;
    let whole = caps.get(0)?;
    let speaker = match caps.get(1).map(|m| m.as_str()) {
        Some("AI" | "Machine" | "Assistant") => Speaker::Agent,
        _ => Speaker::Other,
    };
    Some((speaker, &line[whole.end()..]))
}

/// Remove multi-turn scratch dialogue that leaked into an answer.
///
/// When lines start with speaker markers (`Human:`, `AI:`, `<agent>:` ...),
/// only the trailing contiguous run of turns spoken by the agent is kept,
/// markers removed. Text before the first marker counts as the agent's.
/// If no turn belongs to the agent the result is empty. Without markers the
/// text is returned trimmed.
pub fn strip_scripted_dialogue(text: &str, agent_name: &str) -> String {
    let mut turns: Vec<Turn<'_>> = Vec::new();
    let mut saw_marker = false;

    for line in text.lines() {
        if let Some((speaker, rest)) = split_marker(line, agent_name) {
            saw_marker = true;
            turns.push(Turn {
                speaker,
                lines: vec![rest],
            });
        } else if let Some(turn) = turns.last_mut() {
            turn.lines.push(line);
        } else {
            turns.push(Turn {
                speaker: Speaker::Agent,
                lines: vec![line],
            });
        }
    }

    if !saw_marker {
        return text.trim().to_string();
    }

    let Some(last) = turns.iter().rposition(|t| t.speaker == Speaker::Agent) else {
        return String::new();
    };
    let mut first = last;
    while first > 0 && turns[first - 1].speaker == Speaker::Agent {
        first -= 1;
    }

    turns[first..=last]
        .iter()
        .flat_map(|t| t.lines.iter().copied())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(outcome: NormalizedResponse) -> String {
        match outcome {
            NormalizedResponse::Answer { content, .. } => content,
            NormalizedResponse::Failure { message, .. } => panic!("unexpected failure: {message}"),
        }
    }

    #[test]
    fn test_plain_string() {
        let out = normalize(&json!("Hello"), &NormalizerConfig::default());
        assert_eq!(out.agent_name(), DEFAULT_AGENT_NAME);
        assert_eq!(content(out), "Hello");
    }

    #[test]
    fn test_response_field() {
        let out = normalize(&json!({"response": "Plan created"}), &NormalizerConfig::default());
        assert_eq!(content(out), "Plan created");
    }

    #[test]
    fn test_content_text_field() {
        let out = normalize(
            &json!({"content": {"text": "Report attached"}}),
            &NormalizerConfig::default(),
        );
        assert_eq!(content(out), "Report attached");
    }

    #[test]
    fn test_content_string_wins_over_response() {
        let out = normalize(
            &json!({"content": "from content", "response": "from response"}),
            &NormalizerConfig::default(),
        );
        assert_eq!(content(out), "from content");
    }

    #[test]
    fn test_error_field_takes_failure_path() {
        let out = normalize(&json!({"error": "LLM timeout"}), &NormalizerConfig::default());
        assert_eq!(
            out,
            NormalizedResponse::Failure {
                message: "LLM timeout".into(),
                agent_name: DEFAULT_AGENT_NAME.into(),
            }
        );
    }

    #[test]
    fn test_error_status_uses_content_as_message() {
        let out = normalize(
            &json!({"status": "error", "agent_name": "System", "content": "Something broke"}),
            &NormalizerConfig::default(),
        );
        assert_eq!(
            out,
            NormalizedResponse::Failure {
                message: "Something broke".into(),
                agent_name: "System".into(),
            }
        );
    }

    #[test]
    fn test_error_status_without_text() {
        let out = normalize(&json!({"status": "error"}), &NormalizerConfig::default());
        match out {
            NormalizedResponse::Failure { message, .. } => assert_eq!(message, UNKNOWN_ERROR_MESSAGE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_null_error_is_not_a_failure() {
        let out = normalize(
            &json!({"agent_name": "Researcher", "content": "Found it", "error": null}),
            &NormalizerConfig::default(),
        );
        assert_eq!(out.agent_name(), "Researcher");
        assert_eq!(content(out), "Found it");
    }

    #[test]
    fn test_clarification_goes_to_coordinator() {
        let config = NormalizerConfig {
            default_agent: "PM".into(),
            coordinator_agent: "Coordinator".into(),
        };
        let out = normalize(
            &json!({
                "status": "clarification_needed",
                "processed_by": "Project Manager",
                "response": "I need some clarification",
                "clarification_questions": ["What budget?", "Which deadline?"],
            }),
            &config,
        );
        assert_eq!(out.agent_name(), "Coordinator");
        assert_eq!(content(out), "What budget?\nWhich deadline?");
    }

    #[test]
    fn test_clarification_with_empty_questions_falls_through() {
        let out = normalize(
            &json!({
                "status": "clarification_needed",
                "response": "Can you say more?",
                "clarification_questions": [],
            }),
            &NormalizerConfig::default(),
        );
        assert_eq!(out.agent_name(), DEFAULT_AGENT_NAME);
        assert_eq!(content(out), "Can you say more?");
    }

    #[test]
    fn test_agent_name_preferred_over_processed_by() {
        let out = normalize(
            &json!({"agent_name": "Code Reviewer", "processed_by": "Other", "content": "LGTM"}),
            &NormalizerConfig::default(),
        );
        assert_eq!(out.agent_name(), "Code Reviewer");
    }

    #[test]
    fn test_unknown_object_is_serialized() {
        let out = normalize(&json!({"tasks": [1, 2]}), &NormalizerConfig::default());
        assert_eq!(content(out), r#"{"tasks":[1,2]}"#);
    }

    #[test]
    fn test_null_and_blank_yield_placeholder() {
        let out = normalize(&Value::Null, &NormalizerConfig::default());
        assert_eq!(content(out), EMPTY_RESPONSE_PLACEHOLDER);

        let out = normalize(&json!("   \n "), &NormalizerConfig::default());
        assert_eq!(content(out), EMPTY_RESPONSE_PLACEHOLDER);
    }

    #[test]
    fn test_scripted_dialogue_keeps_agent_turn() {
        let out = normalize(
            &json!({
                "processed_by": "Project Manager",
                "response": "Human: hi\nProject Manager: Here is your plan.\n",
            }),
            &NormalizerConfig::default(),
        );
        assert_eq!(content(out), "Here is your plan.");
    }

    #[test]
    fn test_scripted_dialogue_keeps_trailing_run_only() {
        let text = "AI: first draft\nHuman: shorter please\nAI: Final plan:\n- design\n- build\nHuman: thanks";
        assert_eq!(
            strip_scripted_dialogue(text, "Project Manager"),
            "Final plan:\n- design\n- build"
        );
    }

    #[test]
    fn test_consecutive_agent_turns_are_joined() {
        let text = "User: go\nAssistant: step one\nProject Manager: step two";
        assert_eq!(
            strip_scripted_dialogue(text, "Project Manager"),
            "step one\nstep two"
        );
    }

    #[test]
    fn test_no_markers_passes_through_trimmed() {
        assert_eq!(
            strip_scripted_dialogue("  Ratio 3:1 is fine\n", "Project Manager"),
            "Ratio 3:1 is fine"
        );
    }

    #[test]
    fn test_machine_marker_is_the_agent() {
        assert_eq!(
            strip_scripted_dialogue("Human: hi\nMachine: Here is the plan.", "Project Manager"),
            "Here is the plan."
        );
        assert_eq!(
            strip_scripted_dialogue("Human: hi\nAI: Here is the plan.", "Project Manager"),
            "Here is the plan."
        );
    }

    #[test]
    fn test_only_foreign_speakers_yields_nothing() {
        assert_eq!(
            strip_scripted_dialogue("Human: hi\nSystem: be nice", "Project Manager"),
            ""
        );
        let out = normalize(
            &json!({"response": "System: you are helpful\nUser: plan it"}),
            &NormalizerConfig::default(),
        );
        assert_eq!(content(out), EMPTY_RESPONSE_PLACEHOLDER);
    }
}
