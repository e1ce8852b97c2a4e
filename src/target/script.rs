use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{state_code, AreaId, ProjectRow, TargetWriter, TaskLockRow, TaskRow, RESET_ORDER};
use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::source::License;
use crate::timeline::{ProjectId, TaskCommentRecord, TaskStateRecord};
use crate::users::UserAccount;

/// Writes the migration as a PostgreSQL script instead of executing it.
///
/// Areas are inserted without an explicit id; the project that follows
/// picks its area up with `currval`, so the ids returned by
/// [`TargetWriter::insert_area`] are local ordinals only.
pub struct ScriptTarget {
    out: Box<dyn Write + Send>,
    path: Option<PathBuf>,
    config: TargetConfig,
    in_transaction: bool,
    areas: AreaId,
}

impl ScriptTarget {
    pub fn create(path: &Path, config: &TargetConfig) -> Result<Self> {
        let file = File::create(path)?;
        let mut target = Self::from_writer(Box::new(BufWriter::new(file)), config);
        target.path = Some(path.to_path_buf());
        Ok(target)
    }

    pub fn from_writer(out: Box<dyn Write + Send>, config: &TargetConfig) -> Self {
        Self {
            out,
            path: None,
            config: config.clone(),
            in_transaction: false,
            areas: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn statement(&mut self, sql: &str) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::OperationFailed(
                "no open transaction on target".to_string(),
            ));
        }
        writeln!(self.out, "{sql};")?;
        Ok(())
    }
}

/// Quote a string literal for standard-conforming PostgreSQL strings.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn text(value: Option<&str>) -> String {
    value.map(quote_literal).unwrap_or_else(|| "NULL".to_string())
}

fn number<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "NULL".to_string())
}

fn timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|value| format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.f")))
        .unwrap_or_else(|| "NULL".to_string())
}

#[async_trait]
impl TargetWriter for ScriptTarget {
    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::OperationFailed(
                "transaction already open on target".to_string(),
            ));
        }
        writeln!(self.out, "BEGIN;")?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::OperationFailed(
                "no open transaction on target".to_string(),
            ));
        }
        writeln!(self.out, "COMMIT;")?;
        self.out.flush()?;
        self.in_transaction = false;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        for table in RESET_ORDER {
            self.statement(&format!("DELETE FROM {table}"))?;
        }
        Ok(())
    }

    async fn insert_user(&mut self, user: &UserAccount) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO users (id, username) VALUES ({}, {})",
            user.id.0,
            quote_literal(&user.username)
        ))
    }

    async fn insert_license(&mut self, license: &License) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO license (id, name, description, plain_text) VALUES ({}, {}, {}, {})",
            license.id,
            text(license.name.as_deref()),
            text(license.description.as_deref()),
            text(license.plain_text.as_deref())
        ))
    }

    async fn insert_area(&mut self, wkt_3857: &str) -> Result<AreaId> {
        self.statement(&format!(
            "INSERT INTO area (geometry) VALUES (ST_Multi(ST_Transform(ST_GeomFromText({}, 3857), 4326)))",
            quote_literal(wkt_3857)
        ))?;
        self.areas += 1;
        Ok(self.areas)
    }

    async fn insert_project(&mut self, project: &ProjectRow) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO project (id, area_id, status, created, author_id, last_update, \
             private, imagery, license_id, zoom, josm_preset, priority) \
             VALUES ({}, currval(pg_get_serial_sequence('area', 'id')), {}, COALESCE({}, now()), \
             {}, {}, {}, {}, {}, {}, {}, {})",
            project.id,
            number(project.status),
            timestamp(project.created),
            number(project.author_id.map(|id| id.0)),
            timestamp(project.last_update),
            project.private,
            text(project.imagery.as_deref()),
            number(project.license_id),
            project.zoom,
            text(project.josm_preset.as_deref()),
            project.priority
        ))?;
        let locale = quote_literal(&self.config.locale);
        self.statement(&format!(
            "INSERT INTO project_translation (id, locale, name, description, short_description, \
             instructions, per_task_instructions) VALUES ({}, {}, {}, {}, {}, {}, {})",
            project.id,
            locale,
            quote_literal(&project.name),
            text(project.description.as_deref()),
            text(project.short_description.as_deref()),
            text(project.instructions.as_deref()),
            text(project.per_task_instructions.as_deref())
        ))
    }

    async fn insert_task(&mut self, task: &TaskRow) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO task (id, project_id, x, y, zoom, geometry) \
             VALUES ({}, {}, {}, {}, {}, ST_GeomFromText({}, 4326))",
            task.id,
            task.project_id,
            task.x,
            task.y,
            task.zoom,
            quote_literal(&task.geometry)
        ))
    }

    async fn insert_task_lock(&mut self, lock: &TaskLockRow) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO task_lock (task_id, project_id, lock, user_id, date) \
             VALUES ({}, {}, {}, {}, {})",
            lock.task_id,
            lock.project_id,
            lock.lock,
            number(lock.user_id.map(|id| id.0)),
            timestamp(Some(lock.date))
        ))
    }

    async fn insert_task_state(&mut self, state: &TaskStateRecord) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO task_state (task_id, project_id, state, user_id, date) \
             VALUES ({}, {}, {}, {}, {})",
            state.task_id,
            state.project_id,
            state_code(state.state),
            number(state.user_id.map(|id| id.0)),
            timestamp(Some(state.date))
        ))
    }

    async fn insert_task_comment(&mut self, comment: &TaskCommentRecord) -> Result<()> {
        self.statement(&format!(
            "INSERT INTO task_comment (task_id, project_id, comment, author_id, date) \
             VALUES ({}, {}, {}, {}, {})",
            comment.task_id,
            comment.project_id,
            quote_literal(&comment.text),
            number(comment.author_id.map(|id| id.0)),
            timestamp(Some(comment.date))
        ))
    }

    async fn update_project_progress(
        &mut self,
        project_id: ProjectId,
        done: i32,
        validated: i32,
    ) -> Result<()> {
        self.statement(&format!(
            "UPDATE project SET done = {done}, validated = {validated} WHERE id = {project_id}"
        ))
    }

    async fn restart_project_sequence(&mut self, floor: i64) -> Result<Option<i64>> {
        let sequence = quote_literal(&self.config.project_sequence);
        self.statement(&format!(
            "SELECT setval({sequence}, GREATEST((SELECT COALESCE(MAX(id), 0) FROM project) + 1, {floor}), false)"
        ))?;
        Ok(None)
    }
}
