//! Task timeline reconstruction.
//!
//! The v1 schema keeps one flat `tiles_history` log per tile. Each row may
//! carry a checkin code, a "changed" flag and a comment. The v2 schema wants
//! discrete state transitions and comments instead, so every task's history
//! is folded into a [`Timeline`]:
//!
//! - one initial state record dated at the sentinel epoch (`none`, no user)
//! - one state record per changed event
//! - one comment record per event with a non-empty comment
//!
//! The fold only looks at the checkin of the previous *changed* event when
//! deriving `invalidated`. A checkin carried by an unchanged event is ignored.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::users::{UserId, UserResolver};

pub type ProjectId = i64;
pub type TaskId = i64;

/// Legacy checkin marker attached to a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinCode {
    Done,
    Validated,
    /// Any other non-zero code found in the source.
    Other(i64),
}

impl CheckinCode {
    /// Map a raw `tiles_history.checkin` column value. NULL and `0` mean
    /// "no checkin".
    pub fn from_raw(raw: Option<i64>) -> Option<Self> {
        match raw? {
            0 => None,
            1 => Some(CheckinCode::Done),
            2 => Some(CheckinCode::Validated),
            other => Some(CheckinCode::Other(other)),
        }
    }
}

/// Lifecycle status of a task at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    None,
    Done,
    Validated,
    Invalidated,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::None => "none",
            TaskState::Done => "done",
            TaskState::Validated => "validated",
            TaskState::Invalidated => "invalidated",
        }
    }
}

/// One row of the v1 history log for a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
    pub timestamp: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin: Option<CheckinCode>,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl HistoryEvent {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            checkin: None,
            changed: false,
            comment: None,
            username: None,
        }
    }

    fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref().filter(|text| !text.is_empty())
    }

    fn actor(&self) -> Option<&str> {
        self.username.as_deref().filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStateRecord {
    pub date: NaiveDateTime,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCommentRecord {
    pub date: NaiveDateTime,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    pub text: String,
}

/// Derived state and comment records for one task, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub states: Vec<TaskStateRecord>,
    pub comments: Vec<TaskCommentRecord>,
}

impl Timeline {
    /// Final state of the task, i.e. the state of the last record.
    pub fn current_state(&self) -> TaskState {
        self.states
            .last()
            .map(|record| record.state)
            .unwrap_or(TaskState::None)
    }
}

/// Derive the state of a changed event and the checkin to carry forward.
fn transition(
    event: &HistoryEvent,
    previous: Option<CheckinCode>,
) -> (TaskState, Option<CheckinCode>) {
    let state = match event.checkin {
        Some(CheckinCode::Done) => TaskState::Done,
        Some(CheckinCode::Validated) => TaskState::Validated,
        _ if previous.is_some() => TaskState::Invalidated,
        _ => TaskState::None,
    };
    (state, event.checkin)
}

/// Fold a task's time-ordered history into its timeline.
///
/// Events are consumed in the order given; sorting is the caller's job.
pub fn reconstruct<R: UserResolver + ?Sized>(
    task_id: TaskId,
    project_id: ProjectId,
    sentinel: NaiveDateTime,
    events: &[HistoryEvent],
    users: &R,
) -> Timeline {
    let initial = Timeline {
        states: vec![TaskStateRecord {
            date: sentinel,
            task_id,
            project_id,
            state: TaskState::None,
            user_id: None,
        }],
        comments: Vec::new(),
    };

    let (timeline, _) = events
        .iter()
        .fold((initial, None), |(mut timeline, previous), event| {
            let user_id = event.actor().and_then(|name| users.resolve(name));

            let previous = if event.changed {
                let (state, carried) = transition(event, previous);
                timeline.states.push(TaskStateRecord {
                    date: event.timestamp,
                    task_id,
                    project_id,
                    state,
                    user_id,
                });
                carried
            } else {
                previous
            };

            if let Some(text) = event.comment_text() {
                timeline.comments.push(TaskCommentRecord {
                    date: event.timestamp,
                    task_id,
                    project_id,
                    author_id: user_id,
                    text: text.to_string(),
                });
            }

            (timeline, previous)
        });

    timeline
}
