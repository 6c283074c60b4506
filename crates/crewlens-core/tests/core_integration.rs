#![allow(clippy::unwrap_used, clippy::expect_used)]

use crewlens_core::{
    ClientMessage, CrewlensError, CrewlensResult, ServerEvent, SERVER_EVENT_TYPES,
};
use serde_json::json;

#[test]
fn test_error_display_formats() {
    let cases: Vec<(CrewlensError, &str)> = vec![
        (CrewlensError::Connection("refused".into()), "Connection error: refused"),
        (CrewlensError::Protocol("bad frame".into()), "Protocol error: bad frame"),
        (CrewlensError::Session("gone".into()), "Session error: gone"),
        (CrewlensError::Config("missing url".into()), "Config error: missing url"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn test_json_error_converts() {
    fn parse() -> CrewlensResult<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    let err = parse().unwrap_err();
    assert!(matches!(err, CrewlensError::Json(_)));
}

#[test]
fn test_every_known_type_has_a_minimal_decodable_form() {
    let minimal = |t: &str| match t {
        "agent_info" | "connection_established" | "pong" | "error" | "agent_states_update" => {
            json!({"type": t})
        }
        "system_status" => json!({"type": t, "status": "initialized"}),
        "agent_update" | "agent_status_update" => json!({"type": t, "agent": "A", "status": "idle"}),
        "agent_assigned" => json!({"type": t, "agent": "A"}),
        "agent_activity" => json!({"type": t, "agent": "A", "activity_type": "processing"}),
        "agent_handoff" => json!({"type": t, "from_agent": "A", "to_agent": "B"}),
        "agent_thinking" => json!({"type": t, "agent": "A", "thinking": "..."}),
        "agent_error" => json!({"type": t, "agent": "A", "error": "x"}),
        "workflow_step" => json!({"type": t, "message": "step"}),
        "request_start" | "request_received" | "request_complete" => {
            json!({"type": t, "request_id": "r"})
        }
        "request_error" => json!({"type": t, "message": "x", "request_id": "r"}),
        "response" => json!({"type": t, "content": "hi"}),
        other => panic!("untested type {other}"),
    };

    for t in SERVER_EVENT_TYPES {
        let decoded = ServerEvent::from_value(minimal(t))
            .unwrap_or_else(|e| panic!("{t}: {e}"))
            .unwrap_or_else(|| panic!("{t} decoded as unknown"));
        if *t == "agent_status_update" {
            assert_eq!(decoded.kind(), "agent_update");
        } else {
            assert_eq!(decoded.kind(), *t);
        }
    }
}

#[test]
fn test_outbound_request_with_id() {
    let msg = ClientMessage::request("Plan a website", Some("client-1".into()));
    let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "request");
    assert_eq!(value["content"], "Plan a website");
    assert_eq!(value["request_id"], "client-1");
}

#[test]
fn test_ping_carries_timestamp() {
    let value: serde_json::Value =
        serde_json::from_str(&ClientMessage::ping().to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "ping");
    assert!(value["timestamp"].as_i64().unwrap() > 0);
}
