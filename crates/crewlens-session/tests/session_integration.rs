#![allow(clippy::unwrap_used, clippy::expect_used)]

use crewlens_core::{AgentStatus, LinkStatus};
use crewlens_session::{
    normalize, ApplyOutcome, InteractionGraph, MessageKind, NormalizedResponse, NormalizerConfig,
    Session, SessionConfig,
};
use serde_json::{json, Value};

fn transcript_pairs(session: &Session) -> Vec<(MessageKind, Option<String>, String)> {
    session
        .transcript()
        .entries()
        .iter()
        .map(|m| (m.kind, m.sender.clone(), m.content.clone()))
        .collect()
}

fn feed(session: &mut Session, events: Vec<Value>) {
    for event in events {
        session.apply_value(event);
    }
}

#[test]
fn test_happy_path_scenario() {
    let mut session = Session::new(SessionConfig::default());
    session.record_submission("Plan a website", true);

    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({
                "type": "agent_handoff",
                "from_agent": "Coordinator",
                "to_agent": "ProjectManager",
                "request_id": "R1",
                "input": "Plan a website",
            }),
            json!({
                "type": "agent_thinking",
                "agent": "ProjectManager",
                "thinking": "Breaking into tasks",
                "request_id": "R1",
            }),
            json!({
                "type": "response",
                "content": {"processed_by": "Project Manager", "response": "Plan ready"},
            }),
            json!({"type": "request_complete", "request_id": "R1"}),
        ],
    );

    assert_eq!(
        transcript_pairs(&session),
        vec![
            (MessageKind::User, None, "Plan a website".to_string()),
            (
                MessageKind::Agent,
                Some("Project Manager".to_string()),
                "Plan ready".to_string()
            ),
        ]
    );

    let graph = session.graph();
    assert_eq!(
        graph.link("User", "Coordinator").unwrap().status,
        LinkStatus::Inactive
    );
    assert_eq!(
        graph.link("Coordinator", "ProjectManager").unwrap().status,
        LinkStatus::Active
    );
    assert_eq!(
        session.agents().get("ProjectManager").unwrap().status,
        AgentStatus::Idle
    );
    assert!(session.tracker().is_complete());
}

#[test]
fn test_disconnect_mid_request_scenario() {
    let mut session = Session::default();
    session.on_connected();
    session.record_submission("Plan a website", true);
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({
                "type": "agent_handoff",
                "from_agent": "Coordinator",
                "to_agent": "ProjectManager",
                "request_id": "R1",
            }),
        ],
    );

    session.on_disconnected();
    assert!(!session.can_send());
    session.on_connected();
    assert!(session.can_send());

    session.record_submission("Write the copy", true);
    session.apply_value(json!({"type": "request_start", "request_id": "R2"}));

    let outcome = session.apply_value(json!({
        "type": "response",
        "request_id": "R1",
        "content": {"agent_name": "ProjectManager", "content": "Plan ready"},
    }));
    assert_eq!(outcome, ApplyOutcome::Stale("R1".to_string()));
    assert!(session
        .transcript()
        .entries()
        .iter()
        .all(|m| m.kind != MessageKind::Agent));
    assert_eq!(
        session.transcript().entries().last().unwrap().content,
        "Write the copy"
    );
}

#[test]
fn test_stale_events_do_not_mutate_anything() {
    let mut session = Session::default();
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({"type": "agent_assigned", "agent": "Researcher", "request_id": "R1"}),
        ],
    );
    let before = serde_json::to_value(session.snapshot()).unwrap();

    let stale = vec![
        json!({"type": "agent_activity", "agent": "A", "activity_type": "processing", "request_id": "R0"}),
        json!({"type": "agent_handoff", "from_agent": "A", "to_agent": "B", "request_id": "R0"}),
        json!({"type": "agent_thinking", "agent": "A", "thinking": "x", "request_id": "R0"}),
        json!({"type": "agent_error", "agent": "Researcher", "error": "x", "request_id": "R0"}),
        json!({"type": "agent_update", "agent": "Researcher", "status": "active", "request_id": "R0"}),
        json!({"type": "workflow_step", "agent_name": "A", "request_id": "R0"}),
        json!({"type": "request_error", "message": "x", "request_id": "R0"}),
        json!({"type": "request_complete", "request_id": "R0"}),
        json!({"type": "response", "content": "late", "request_id": "R0"}),
    ];
    for event in stale {
        assert!(matches!(session.apply_value(event), ApplyOutcome::Stale(_)));
    }

    assert_eq!(serde_json::to_value(session.snapshot()).unwrap(), before);
}

#[test]
fn test_new_request_resets_agents_and_graph() {
    let mut session = Session::default();
    session.apply_value(json!({
        "type": "agent_info",
        "agent_descriptions": {"Researcher": "Finds sources"},
    }));
    session.record_submission("first", true);
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({"type": "agent_handoff", "from_agent": "User", "to_agent": "A", "request_id": "R1"}),
            json!({"type": "agent_handoff", "from_agent": "A", "to_agent": "B", "request_id": "R1"}),
            json!({"type": "agent_error", "agent": "B", "error": "boom", "request_id": "R1"}),
        ],
    );
    assert_eq!(session.graph().link("A", "B").unwrap().status, LinkStatus::Error);
    let transcript_len = session.transcript().len();

    session.apply_value(json!({"type": "request_start", "request_id": "R2"}));

    assert!(session.agents().is_empty());
    assert_eq!(session.graph().snapshot(), InteractionGraph::new().snapshot());
    assert_eq!(session.registry().len(), 1);
    assert_eq!(session.transcript().len(), transcript_len);
}

#[test]
fn test_repeated_request_start_does_not_reset() {
    let mut session = Session::default();
    session.apply_value(json!({"type": "request_start", "request_id": "R1"}));
    session.apply_value(json!({"type": "agent_assigned", "agent": "A", "request_id": "R1"}));
    let outcome = session.apply_value(json!({"type": "request_received", "request_id": "R1"}));

    assert_eq!(outcome, ApplyOutcome::Ignored);
    assert_eq!(session.agents().len(), 1);
}

#[test]
fn test_thinking_is_replaced_per_agent_through_events() {
    let mut session = Session::default();
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({"type": "agent_thinking", "agent": "A", "thinking": "t1", "request_id": "R1"}),
            json!({"type": "agent_thinking", "agent": "B", "thinking": "other", "request_id": "R1"}),
            json!({"type": "agent_thinking", "agent": "A", "thinking": "t2", "request_id": "R1"}),
        ],
    );

    let thinking: Vec<(Option<String>, String)> = session
        .transcript()
        .entries()
        .iter()
        .filter(|m| m.kind == MessageKind::Thinking)
        .map(|m| (m.sender.clone(), m.content.clone()))
        .collect();
    assert_eq!(
        thinking,
        vec![
            (Some("B".to_string()), "other".to_string()),
            (Some("A".to_string()), "t2".to_string()),
        ]
    );
    assert_eq!(
        session.agents().get("A").unwrap().last_thinking.as_deref(),
        Some("t2")
    );
}

#[test]
fn test_error_is_sticky_until_next_request() {
    let mut session = Session::default();
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({"type": "agent_assigned", "agent": "A", "request_id": "R1"}),
            json!({"type": "agent_error", "agent": "A", "error": "LLM timeout", "request_id": "R1"}),
            json!({"type": "agent_activity", "agent": "A", "activity_type": "processing", "request_id": "R1"}),
            json!({"type": "request_complete", "request_id": "R1"}),
        ],
    );

    let a = session.agents().get("A").unwrap();
    assert_eq!(a.status, AgentStatus::Error);
    assert_eq!(a.activities.len(), 1);
    assert_eq!(session.graph().link("User", "A").unwrap().status, LinkStatus::Error);
    assert!(session
        .transcript()
        .entries()
        .iter()
        .any(|m| m.kind == MessageKind::Error && m.content == "A: LLM timeout"));
}

#[test]
fn test_activity_handoff_kinds_drive_status() {
    let mut session = Session::default();
    feed(
        &mut session,
        vec![
            json!({"type": "request_start", "request_id": "R1"}),
            json!({
                "type": "agent_activity",
                "agent": "Researcher",
                "activity_type": "handoff_in",
                "timestamp": "2024-05-01T12:00:00.000000",
                "input": {"query": "rust"},
                "request_id": "R1",
            }),
        ],
    );
    let researcher = session.agents().get("Researcher").unwrap();
    assert_eq!(researcher.status, AgentStatus::Assigned);
    assert_eq!(researcher.activities[0].input.as_deref(), Some(r#"{"query":"rust"}"#));
    assert_eq!(
        session.graph().hot_link().unwrap().target,
        "Researcher".to_string()
    );
}

#[test]
fn test_normalizer_examples() {
    let config = NormalizerConfig::default();
    let cases = [
        (json!("Hello"), "Hello"),
        (json!({"response": "Plan created"}), "Plan created"),
        (json!({"content": {"text": "Report attached"}}), "Report attached"),
        (
            json!({"response": "Human: hi\nProject Manager: Here is your plan.\n"}),
            "Here is your plan.",
        ),
    ];
    for (payload, expected) in cases {
        match normalize(&payload, &config) {
            NormalizedResponse::Answer { content, .. } => assert_eq!(content, expected),
            other => panic!("{payload}: unexpected {other:?}"),
        }
    }

    assert!(matches!(
        normalize(&json!({"error": "LLM timeout"}), &config),
        NormalizedResponse::Failure { .. }
    ));
}

#[test]
fn test_unscoped_events_pass_during_request() {
    let mut session = Session::default();
    session.on_connected();
    session.apply_value(json!({"type": "request_start", "request_id": "R1"}));
    let outcome = session.apply_value(json!({"type": "error", "message": "Rate limited", "request_id": "R0"}));
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(
        session.transcript().entries().last().unwrap().content,
        "Rate limited"
    );
}
