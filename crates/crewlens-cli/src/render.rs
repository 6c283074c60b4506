//! Plain-text rendering of session state for the terminal.

use crewlens_session::{Message, MessageKind, NodePosition, SessionSnapshot};
use std::fmt::Write;

/// One transcript entry as a single display line.
pub fn format_message(message: &Message) -> String {
    let sender = message.sender.as_deref().unwrap_or("unknown");
    match message.kind {
        MessageKind::User => format!("> {}", message.content),
        MessageKind::Agent => format!("[{sender}] {}", message.content),
        MessageKind::System => format!("* {}", message.content),
        MessageKind::Error => format!("! {}", message.content),
        MessageKind::Thinking => format!("~ {sender} is thinking: {}", message.content),
    }
}

/// Full session report: transcript, agents, links and node positions.
pub fn format_snapshot(snapshot: &SessionSnapshot, layout: &[NodePosition]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Transcript:");
    for message in &snapshot.transcript {
        let _ = writeln!(out, "  {}", format_message(message));
    }

    let _ = writeln!(out, "\nAgents:");
    if snapshot.agents.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for agent in &snapshot.agents {
        let _ = write!(
            out,
            "  {:<24} {:<9} {} activit{}",
            agent.name,
            agent.status.to_string(),
            agent.activities.len(),
            if agent.activities.len() == 1 { "y" } else { "ies" }
        );
        if let Some(error) = &agent.last_error {
            let _ = write!(out, "  last error: {error}");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "\nLinks:");
    for link in &snapshot.graph.links {
        let _ = writeln!(out, "  {} -> {} [{}]", link.source, link.target, link.status);
    }

    if !layout.is_empty() {
        let _ = writeln!(out, "\nLayout:");
        for position in layout {
            let _ = writeln!(out, "  {:<24} ({:.0}, {:.0})", position.id, position.x, position.y);
        }
    }

    out
}
