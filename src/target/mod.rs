//! Writers for the v2 schema.
//!
//! Every writer speaks the same [`TargetWriter`] protocol: open a
//! transaction, insert rows, commit. Three backends exist:
//!
//! - [`PgTarget`]: a live PostgreSQL/PostGIS database
//! - [`ScriptTarget`]: an SQL script to replay later with `psql -f`
//! - [`MemoryTarget`]: in-memory rows, for dry runs and tests

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::source::License;
use crate::timeline::{ProjectId, TaskCommentRecord, TaskId, TaskState, TaskStateRecord};
use crate::users::{UserAccount, UserId};

mod memory;
mod postgres;
mod script;

pub use memory::MemoryTarget;
pub use postgres::PgTarget;
pub use script::ScriptTarget;

pub type AreaId = i64;

/// v2 `task_state.state` values.
pub mod state_codes {
    pub const READY: i32 = 0;
    pub const INVALIDATED: i32 = 1;
    pub const DONE: i32 = 2;
    pub const VALIDATED: i32 = 3;
}

pub fn state_code(state: TaskState) -> i32 {
    match state {
        TaskState::None => state_codes::READY,
        TaskState::Invalidated => state_codes::INVALIDATED,
        TaskState::Done => state_codes::DONE,
        TaskState::Validated => state_codes::VALIDATED,
    }
}

/// Tables emptied by [`TargetWriter::reset`], children first.
pub const RESET_ORDER: [&str; 9] = [
    "task_lock",
    "task_state",
    "task_comment",
    "task",
    "project_translation",
    "project",
    "area",
    "license",
    "users",
];

/// Project priority for featured v1 jobs; everything else is medium.
pub const FEATURED_PRIORITY: i32 = 1;
pub const DEFAULT_PRIORITY: i32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub area_id: AreaId,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub instructions: Option<String>,
    pub per_task_instructions: Option<String>,
    pub zoom: i64,
    pub created: Option<NaiveDateTime>,
    pub last_update: Option<NaiveDateTime>,
    pub private: bool,
    pub imagery: Option<String>,
    pub license_id: Option<i64>,
    pub author_id: Option<UserId>,
    pub status: Option<i64>,
    pub josm_preset: Option<String>,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRow {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub x: i64,
    pub y: i64,
    pub zoom: i64,
    /// MULTIPOLYGON in EPSG:4326.
    pub geometry: String,
}

/// Initial lock row of a task: unlocked, nobody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskLockRow {
    pub date: NaiveDateTime,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub lock: bool,
    pub user_id: Option<UserId>,
}

impl TaskLockRow {
    pub fn initial(task_id: TaskId, project_id: ProjectId, date: NaiveDateTime) -> Self {
        Self {
            date,
            task_id,
            project_id,
            lock: false,
            user_id: None,
        }
    }
}

#[async_trait]
pub trait TargetWriter: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;

    /// Delete every row the migration writes.
    async fn reset(&mut self) -> Result<()>;

    async fn insert_user(&mut self, user: &UserAccount) -> Result<()>;
    async fn insert_license(&mut self, license: &License) -> Result<()>;

    /// Store a job outline given as EPSG:3857 WKT; returns the area id.
    async fn insert_area(&mut self, wkt_3857: &str) -> Result<AreaId>;

    async fn insert_project(&mut self, project: &ProjectRow) -> Result<()>;
    async fn insert_task(&mut self, task: &TaskRow) -> Result<()>;
    async fn insert_task_lock(&mut self, lock: &TaskLockRow) -> Result<()>;
    async fn insert_task_state(&mut self, state: &TaskStateRecord) -> Result<()>;
    async fn insert_task_comment(&mut self, comment: &TaskCommentRecord) -> Result<()>;

    async fn update_project_progress(
        &mut self,
        project_id: ProjectId,
        done: i32,
        validated: i32,
    ) -> Result<()>;

    /// Make the next generated project id at least `floor` and above every
    /// project id already in the target. Returns that id when the target
    /// knows it while writing.
    async fn restart_project_sequence(&mut self, floor: i64) -> Result<Option<i64>>;
}
