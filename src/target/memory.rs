use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use super::{AreaId, ProjectRow, TargetWriter, TaskLockRow, TaskRow};
use crate::error::{Error, Result};
use crate::source::License;
use crate::timeline::{ProjectId, TaskCommentRecord, TaskStateRecord};
use crate::users::UserAccount;

/// Keeps every written row in memory. Backs `--dry-run`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryTarget {
    pub users: Vec<UserAccount>,
    pub licenses: Vec<License>,
    pub areas: Vec<String>,
    pub projects: Vec<ProjectRow>,
    pub tasks: Vec<TaskRow>,
    pub locks: Vec<TaskLockRow>,
    pub states: Vec<TaskStateRecord>,
    pub comments: Vec<TaskCommentRecord>,
    /// project id -> (done, validated)
    pub progress: BTreeMap<ProjectId, (i32, i32)>,
    pub next_project_id: Option<i64>,
    pub resets: usize,
    pub commits: usize,
    #[serde(skip)]
    in_transaction: bool,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(Error::OperationFailed(
                "no open transaction on target".to_string(),
            ))
        }
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::OperationFailed(
                "transaction already open on target".to_string(),
            ));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.in_transaction = false;
        self.commits += 1;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        let (resets, commits) = (self.resets, self.commits);
        *self = Self {
            resets: resets + 1,
            commits,
            in_transaction: true,
            ..Self::default()
        };
        Ok(())
    }

    async fn insert_user(&mut self, user: &UserAccount) -> Result<()> {
        self.ensure_open()?;
        self.users.push(user.clone());
        Ok(())
    }

    async fn insert_license(&mut self, license: &License) -> Result<()> {
        self.ensure_open()?;
        self.licenses.push(license.clone());
        Ok(())
    }

    async fn insert_area(&mut self, wkt_3857: &str) -> Result<AreaId> {
        self.ensure_open()?;
        self.areas.push(wkt_3857.to_string());
        Ok(self.areas.len() as AreaId)
    }

    async fn insert_project(&mut self, project: &ProjectRow) -> Result<()> {
        self.ensure_open()?;
        self.projects.push(project.clone());
        Ok(())
    }

    async fn insert_task(&mut self, task: &TaskRow) -> Result<()> {
        self.ensure_open()?;
        self.tasks.push(task.clone());
        Ok(())
    }

    async fn insert_task_lock(&mut self, lock: &TaskLockRow) -> Result<()> {
        self.ensure_open()?;
        self.locks.push(lock.clone());
        Ok(())
    }

    async fn insert_task_state(&mut self, state: &TaskStateRecord) -> Result<()> {
        self.ensure_open()?;
        self.states.push(state.clone());
        Ok(())
    }

    async fn insert_task_comment(&mut self, comment: &TaskCommentRecord) -> Result<()> {
        self.ensure_open()?;
        self.comments.push(comment.clone());
        Ok(())
    }

    async fn update_project_progress(
        &mut self,
        project_id: ProjectId,
        done: i32,
        validated: i32,
    ) -> Result<()> {
        self.ensure_open()?;
        self.progress.insert(project_id, (done, validated));
        Ok(())
    }

    async fn restart_project_sequence(&mut self, floor: i64) -> Result<Option<i64>> {
        self.ensure_open()?;
        let above_existing = self
            .projects
            .iter()
            .map(|project| project.id + 1)
            .max()
            .unwrap_or(1);
        let next = above_existing.max(floor);
        self.next_project_id = Some(next);
        Ok(Some(next))
    }
}
