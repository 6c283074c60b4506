use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a transcript entry; renderers style entries by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Text submitted by the user.
    User,
    /// A final answer from an agent.
    Agent,
    /// Connection and readiness notices.
    System,
    /// Application or request failures.
    Error,
    /// A transient reasoning trace; at most one per sender.
    Thinking,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
            Self::Error => "error",
            Self::Thinking => "thinking",
        };
        write!(f, "{s}")
    }
}

/// A single display message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic id, unique within the transcript.
    pub id: u64,
    /// Entry kind.
    pub kind: MessageKind,
    /// Agent name for agent and thinking entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Display text.
    pub content: String,
    /// When the entry was added.
    pub time: DateTime<Utc>,
}

/// Ordered conversation log.
///
/// Entries are only ever appended, except thinking entries which are
/// replaced per sender and cleared when a request completes.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Message>,
    next_id: u64,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: MessageKind, sender: Option<String>, content: String) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Message {
            id,
            kind,
            sender,
            content,
            time: Utc::now(),
        });
        id
    }

    /// Append a user message.
    pub fn add_user(&mut self, content: impl Into<String>) -> u64 {
        self.push(MessageKind::User, None, content.into())
    }

    /// Append an agent answer.
    pub fn add_agent(&mut self, sender: impl Into<String>, content: impl Into<String>) -> u64 {
        self.push(MessageKind::Agent, Some(sender.into()), content.into())
    }

    /// Append a system notice.
    pub fn add_system(&mut self, content: impl Into<String>) -> u64 {
        self.push(MessageKind::System, None, content.into())
    }

    /// Append an error message.
    pub fn add_error(&mut self, content: impl Into<String>) -> u64 {
        self.push(MessageKind::Error, None, content.into())
    }

    /// Append a thinking entry for `sender`, replacing any earlier thinking
    /// entry from the same sender.
    pub fn add_thinking(&mut self, sender: &str, content: impl Into<String>) -> u64 {
        self.entries
            .retain(|m| !(m.kind == MessageKind::Thinking && m.sender.as_deref() == Some(sender)));
        self.push(MessageKind::Thinking, Some(sender.to_string()), content.into())
    }

    /// Remove every thinking entry. Returns how many were removed.
    pub fn clear_thinking(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.kind != MessageKind::Thinking);
        before - self.entries.len()
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Owned copy of the entries for renderers.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn thinking_of<'a>(t: &'a Transcript, sender: &str) -> Vec<&'a Message> {
        t.entries()
            .iter()
            .filter(|m| m.kind == MessageKind::Thinking && m.sender.as_deref() == Some(sender))
            .collect()
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut t = Transcript::new();
        let a = t.add_user("one");
        let b = t.add_system("two");
        let c = t.add_error("three");
        assert!(a < b && b < c);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_thinking_replacement_per_agent() {
        let mut t = Transcript::new();
        t.add_thinking("Researcher", "looking");
        t.add_thinking("Project Manager", "t1");
        t.add_user("between");
        let last = t.add_thinking("Project Manager", "t2");

        let pm = thinking_of(&t, "Project Manager");
        assert_eq!(pm.len(), 1);
        assert_eq!(pm[0].content, "t2");
        assert_eq!(pm[0].id, last);

        let researcher = thinking_of(&t, "Researcher");
        assert_eq!(researcher.len(), 1);
        assert_eq!(researcher[0].content, "looking");
    }

    #[test]
    fn test_clear_thinking_keeps_other_entries() {
        let mut t = Transcript::new();
        t.add_user("Plan a website");
        t.add_thinking("A", "x");
        t.add_thinking("B", "y");
        t.add_agent("A", "done");

        assert_eq!(t.clear_thinking(), 2);
        let kinds: Vec<_> = t.entries().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::User, MessageKind::Agent]);
        assert_eq!(t.clear_thinking(), 0);
    }

    #[test]
    fn test_snapshot_serializes_kind_lowercase() {
        let mut t = Transcript::new();
        t.add_agent("PM", "hi");
        let json = serde_json::to_value(t.snapshot()).unwrap();
        assert_eq!(json[0]["kind"], "agent");
        assert_eq!(json[0]["sender"], "PM");
    }
}
