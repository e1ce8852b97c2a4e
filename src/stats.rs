//! Project progress: area-weighted share of finished tasks.

use serde::Serialize;

use crate::timeline::TaskState;

/// Running totals for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressTally {
    pub total_area: f64,
    pub done_area: f64,
    pub validated_area: f64,
    pub tasks: usize,
}

/// Rounded percentages written to `project.done` / `project.validated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: i32,
    pub validated: i32,
}

impl ProgressTally {
    /// Count a task of `area` whose timeline ended in `state`.
    pub fn record(&mut self, area: f64, state: TaskState) {
        self.tasks += 1;
        self.total_area += area;
        match state {
            TaskState::Validated => {
                self.done_area += area;
                self.validated_area += area;
            }
            TaskState::Done => self.done_area += area,
            TaskState::None | TaskState::Invalidated => {}
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            done: percent(self.done_area, self.total_area),
            validated: percent(self.validated_area, self.total_area),
        }
    }
}

fn percent(part: f64, total: f64) -> i32 {
    if total <= 0.0 {
        return 0;
    }
    (100.0 * part / total).round().clamp(0.0, 100.0) as i32
}
