use std::time::Duration;

/// Lifecycle states an assistant run reports while being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    /// The run is paused waiting for tool outputs.
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunState {
    /// Parse the wire status string. Unknown statuses map to `Failed` so a
    /// provider-side addition can never leave a poll loop spinning.
    pub fn from_status(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" | "cancelling" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            "incomplete" => Self::Incomplete,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }
}

/// Polling parameters for run completion. Injected rather than hardcoded so
/// tests can poll fast and the server can make the timeout configurable.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_statuses() {
        assert_eq!(RunState::from_status("queued"), RunState::Queued);
        assert_eq!(RunState::from_status("in_progress"), RunState::InProgress);
        assert_eq!(
            RunState::from_status("requires_action"),
            RunState::RequiresAction
        );
        assert_eq!(RunState::from_status("completed"), RunState::Completed);
        assert_eq!(RunState::from_status("expired"), RunState::Expired);
    }

    #[test]
    fn unknown_status_is_terminal_failure() {
        let state = RunState::from_status("some_future_status");
        assert_eq!(state, RunState::Failed);
        assert!(state.is_terminal());
    }

    #[test]
    fn terminality() {
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::InProgress.is_terminal());
        assert!(!RunState::RequiresAction.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Incomplete.is_terminal());
    }
}
