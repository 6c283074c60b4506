/// Correlates request-scoped events with the active request.
///
/// Only one request is of interest at a time; starting a new one silently
/// supersedes the previous. Events without a request id are admitted since
/// older servers do not tag every event.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    active: Option<String>,
    completed: bool,
}

impl RequestTracker {
    /// Create a tracker with no active request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` the active request. Returns `false` if it already was.
    pub fn start_request(&mut self, id: &str) -> bool {
        if self.is_current(id) {
            return false;
        }
        if let Some(previous) = &self.active {
            tracing::debug!(previous = %previous, request_id = %id, "Request superseded");
        }
        self.active = Some(id.to_string());
        self.completed = false;
        true
    }

    /// Whether `id` is the active request.
    pub fn is_current(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Mark the active request complete. No-op (returns `false`) for any
    /// other id or when already complete.
    pub fn complete_request(&mut self, id: &str) -> bool {
        if !self.is_current(id) || self.completed {
            return false;
        }
        self.completed = true;
        true
    }

    /// Whether an event carrying `id` may be applied.
    pub fn admits(&self, id: Option<&str>) -> bool {
        match (id, self.active.as_deref()) {
            (None, _) => true,
            (Some(id), Some(active)) => id == active,
            // Nothing started yet: accept whatever the server sends so a
            // client that connected mid-request still shows activity.
            (Some(_), None) => true,
        }
    }

    /// Id of the active request.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Whether the active request has completed.
    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_supersede() {
        let mut t = RequestTracker::new();
        assert!(t.start_request("R1"));
        assert!(!t.start_request("R1"));
        assert!(t.start_request("R2"));
        assert!(t.is_current("R2"));
        assert!(!t.is_current("R1"));
    }

    #[test]
    fn test_admission() {
        let mut t = RequestTracker::new();
        assert!(t.admits(Some("R0")));
        t.start_request("R1");
        assert!(t.admits(Some("R1")));
        assert!(t.admits(None));
        assert!(!t.admits(Some("R0")));
    }

    #[test]
    fn test_complete_only_active_once() {
        let mut t = RequestTracker::new();
        t.start_request("R1");
        assert!(!t.complete_request("R0"));
        assert!(t.complete_request("R1"));
        assert!(!t.complete_request("R1"));
        assert!(t.is_complete());
        assert_eq!(t.active(), Some("R1"));
    }
}
