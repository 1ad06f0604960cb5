//! Registry task grouping and outcome types

use std::fmt;

/// Purpose-based namespace for task identifiers
///
/// Two subsystems may reuse the same identity (a connection id owns both its
/// message loop and its limiter maintenance loop) without collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskGroup {
    /// Long-lived bot connection message loops
    Connection,
    /// Rate limiter maintenance loops
    RateLimiter,
}

impl TaskGroup {
    /// Every group the registry partitions tasks into
    pub const ALL: [TaskGroup; 2] = [TaskGroup::Connection, TaskGroup::RateLimiter];
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskGroup::Connection => write!(f, "CONNECTION"),
            TaskGroup::RateLimiter => write!(f, "RATE_LIMITER"),
        }
    }
}

/// Terminal state of a registered task
///
/// Cancellation is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The unit of work returned normally
    Completed,
    /// The unit of work was cancelled through `remove_task`
    Cancelled,
    /// The unit of work returned an error, captured here
    Failed(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }
}

/// One task's terminal state as observed by `run_all`/`run_group`
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: String,
    pub group: TaskGroup,
    pub outcome: TaskOutcome,
}
