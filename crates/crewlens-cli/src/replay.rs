//! Offline replay of a recorded event stream.
//!
//! The input is JSON lines: one server event per line, exactly as received
//! on the wire. Lines of the form `{"submit": "..."}` stand for user
//! submissions. Blank lines and lines starting with `#` are skipped.

use anyhow::Context;
use crewlens_session::{
    ApplyOutcome, ForceLayout, NodePosition, Session, SessionConfig, SessionSnapshot,
};
use serde::Serialize;
use serde_json::Value;
use std::io::BufRead;

/// Result of folding a recording.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Final session state.
    pub session: SessionSnapshot,
    /// Node positions after the layout settled.
    pub layout: Vec<NodePosition>,
    /// Events that were applied or accepted without effect.
    pub applied: usize,
    /// Lines dropped as malformed, unknown or stale.
    pub dropped: usize,
}

/// Fold every line of `reader` through a fresh session.
pub fn replay(
    reader: impl BufRead,
    config: SessionConfig,
    layout_ticks: usize,
) -> anyhow::Result<ReplayReport> {
    let mut session = Session::new(config);
    let mut applied = 0;
    let mut dropped = 0;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {line_no}"))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed line");
                dropped += 1;
                continue;
            }
        };

        if let Some(text) = value.get("submit").and_then(Value::as_str) {
            session.record_submission(text, true);
            continue;
        }

        match session.apply_value(value) {
            ApplyOutcome::Applied | ApplyOutcome::Ignored => applied += 1,
            ApplyOutcome::Stale(_) | ApplyOutcome::Unknown(_) | ApplyOutcome::Rejected(_) => {
                tracing::debug!(line = line_no, "Event dropped");
                dropped += 1;
            }
        }
    }

    let snapshot = session.snapshot();
    let layout = ForceLayout::default().run(&snapshot.graph, layout_ticks);
    tracing::info!(applied, dropped, "Replay finished");

    Ok(ReplayReport {
        session: snapshot,
        layout,
        applied,
        dropped,
    })
}
