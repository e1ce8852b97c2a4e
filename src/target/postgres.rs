use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use super::{state_code, AreaId, ProjectRow, TargetWriter, TaskLockRow, TaskRow, RESET_ORDER};
use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::source::License;
use crate::timeline::{ProjectId, TaskCommentRecord, TaskStateRecord};
use crate::users::UserAccount;

/// Writer for a live v2 database. One connection, one open transaction at
/// a time.
pub struct PgTarget {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    config: TargetConfig,
}

impl PgTarget {
    pub async fn connect(url: &str, config: &TargetConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            tx: None,
            config: config.clone(),
        })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::OperationFailed(
                "no open transaction on target".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TargetWriter for PgTarget {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::OperationFailed(
                "transaction already open on target".to_string(),
            ));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            Error::OperationFailed("no open transaction on target".to_string())
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let conn = self.conn()?;
        for table in RESET_ORDER {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn insert_user(&mut self, user: &UserAccount) -> Result<()> {
        sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2)")
            .bind(user.id.0)
            .bind(&user.username)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn insert_license(&mut self, license: &License) -> Result<()> {
        sqlx::query(
            "INSERT INTO license (id, name, description, plain_text) VALUES ($1, $2, $3, $4)",
        )
        .bind(license.id)
        .bind(&license.name)
        .bind(&license.description)
        .bind(&license.plain_text)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_area(&mut self, wkt_3857: &str) -> Result<AreaId> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO area (geometry)
             VALUES (ST_Multi(ST_Transform(ST_GeomFromText($1, 3857), 4326)))
             RETURNING id",
        )
        .bind(wkt_3857)
        .fetch_one(self.conn()?)
        .await?;
        Ok(AreaId::from(id))
    }

    async fn insert_project(&mut self, project: &ProjectRow) -> Result<()> {
        let locale = self.config.locale.clone();
        let conn = self.conn()?;
        sqlx::query(
            "INSERT INTO project (id, area_id, status, created, author_id, last_update,
                                  private, imagery, license_id, zoom, josm_preset, priority)
             VALUES ($1, $2, $3, COALESCE($4, now()), $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(project.id)
        .bind(project.area_id)
        .bind(project.status)
        .bind(project.created)
        .bind(project.author_id.map(|id| id.0))
        .bind(project.last_update)
        .bind(project.private)
        .bind(&project.imagery)
        .bind(project.license_id)
        .bind(project.zoom)
        .bind(&project.josm_preset)
        .bind(project.priority)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO project_translation (id, locale, name, description, short_description,
                                              instructions, per_task_instructions)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(project.id)
        .bind(locale)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.short_description)
        .bind(&project.instructions)
        .bind(&project.per_task_instructions)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_task(&mut self, task: &TaskRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO task (id, project_id, x, y, zoom, geometry)
             VALUES ($1, $2, $3, $4, $5, ST_GeomFromText($6, 4326))",
        )
        .bind(task.id)
        .bind(task.project_id)
        .bind(task.x)
        .bind(task.y)
        .bind(task.zoom)
        .bind(&task.geometry)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_task_lock(&mut self, lock: &TaskLockRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_lock (task_id, project_id, lock, user_id, date)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(lock.task_id)
        .bind(lock.project_id)
        .bind(lock.lock)
        .bind(lock.user_id.map(|id| id.0))
        .bind(lock.date)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_task_state(&mut self, state: &TaskStateRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_state (task_id, project_id, state, user_id, date)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(state.task_id)
        .bind(state.project_id)
        .bind(state_code(state.state))
        .bind(state.user_id.map(|id| id.0))
        .bind(state.date)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_task_comment(&mut self, comment: &TaskCommentRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_comment (task_id, project_id, comment, author_id, date)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(comment.task_id)
        .bind(comment.project_id)
        .bind(&comment.text)
        .bind(comment.author_id.map(|id| id.0))
        .bind(comment.date)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_project_progress(
        &mut self,
        project_id: ProjectId,
        done: i32,
        validated: i32,
    ) -> Result<()> {
        sqlx::query("UPDATE project SET done = $2, validated = $3 WHERE id = $1")
            .bind(project_id)
            .bind(done)
            .bind(validated)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn restart_project_sequence(&mut self, floor: i64) -> Result<Option<i64>> {
        let sequence = self.config.project_sequence.clone();
        let next: i64 = sqlx::query_scalar(
            "SELECT setval($1::regclass,
                 GREATEST((SELECT COALESCE(MAX(id), 0) FROM project) + 1, $2), false)",
        )
        .bind(sequence)
        .bind(floor)
        .fetch_one(self.conn()?)
        .await?;
        Ok(Some(next))
    }
}
