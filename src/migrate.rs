//! One-shot migration driver.
//!
//! Phases run in order, each in its own target transaction:
//! reset, users, licenses, one transaction per job, progress, and the
//! project id sequence restart.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::events::{Event, EventKind, EventSink};
use crate::source::{Job, SourceDb};
use crate::stats::{Progress, ProgressTally};
use crate::target::{
    ProjectRow, TargetWriter, TaskLockRow, TaskRow, DEFAULT_PRIORITY, FEATURED_PRIORITY,
};
use crate::tiles::TilePolygon;
use crate::timeline::{self, ProjectId, TaskId};
use crate::users::{
    resolve_usernames, ResolveStats, UserCache, UserDirectory, UserLookup, UserResolver,
};

/// Counts gathered over a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub users_resolved: usize,
    pub users_unresolved: usize,
    pub users_imported: usize,
    pub lookups: ResolveStats,
    pub licenses: usize,
    pub projects: usize,
    pub tasks: usize,
    pub states: usize,
    pub comments: usize,
    pub history_rows_skipped: usize,
    pub tiles_skipped: usize,
    pub progress: BTreeMap<ProjectId, Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_project_id: Option<i64>,
}

pub struct Migrator<'a> {
    source: &'a SourceDb,
    config: &'a Config,
    cache: UserCache,
    lookup: &'a dyn UserLookup,
    events: Option<EventSink>,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a SourceDb,
        config: &'a Config,
        cache: UserCache,
        lookup: &'a dyn UserLookup,
    ) -> Self {
        Self {
            source,
            config,
            cache,
            lookup,
            events: None,
        }
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    fn emit<T: Serialize>(&mut self, kind: EventKind, data: T) -> Result<()> {
        if let Some(sink) = self.events.as_mut() {
            sink.emit(&Event::new(kind).with_data(data)?)?;
        }
        Ok(())
    }

    /// Resolve every source username against the cache and lookup service.
    pub async fn resolve_users(&self) -> Result<(UserDirectory, ResolveStats)> {
        let names = self.source.usernames()?;
        resolve_usernames(&names, &self.cache, self.lookup).await
    }

    pub async fn run(&mut self, target: &mut dyn TargetWriter) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        tracing::info!(source = %self.source.path().display(), "migration started");
        self.emit(
            EventKind::MigrationStarted,
            serde_json::json!({ "source": self.source.path() }),
        )?;

        if self.config.target.reset {
            target.begin().await?;
            target.reset().await?;
            target.commit().await?;
            tracing::info!("target reset");
            self.emit(EventKind::TargetReset, serde_json::json!({}))?;
        }

        let directory = self.import_users(target, &mut report).await?;
        self.import_licenses(target, &mut report).await?;

        let mut tallies = BTreeMap::new();
        for job in self.source.jobs()? {
            let tally = self.import_job(&job, &directory, target, &mut report).await?;
            tallies.insert(job.id, tally);
        }

        self.update_progress(&tallies, target, &mut report).await?;

        if let Some(max_id) = tallies.keys().next_back() {
            target.begin().await?;
            let next = target.restart_project_sequence(max_id + 1).await?;
            target.commit().await?;
            report.next_project_id = next;
        }

        tracing::info!(
            projects = report.projects,
            tasks = report.tasks,
            states = report.states,
            comments = report.comments,
            "migration finished"
        );
        self.emit(EventKind::MigrationFinished, &report)?;
        Ok(report)
    }

    async fn import_users(
        &mut self,
        target: &mut dyn TargetWriter,
        report: &mut MigrationReport,
    ) -> Result<UserDirectory> {
        let (directory, stats) = self.resolve_users().await?;
        let accounts = directory.accounts();

        target.begin().await?;
        for account in &accounts {
            target.insert_user(account).await?;
        }
        target.commit().await?;

        report.users_resolved = directory.resolved_count();
        report.users_unresolved = directory.len() - directory.resolved_count();
        report.users_imported = accounts.len();
        report.lookups = stats;
        tracing::info!(
            resolved = report.users_resolved,
            unresolved = report.users_unresolved,
            imported = report.users_imported,
            "users imported"
        );
        self.emit(EventKind::UsersResolved, stats)?;
        Ok(directory)
    }

    async fn import_licenses(
        &mut self,
        target: &mut dyn TargetWriter,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let licenses = self.source.licenses()?;
        target.begin().await?;
        for license in &licenses {
            target.insert_license(license).await?;
        }
        target.commit().await?;

        report.licenses = licenses.len();
        tracing::info!(count = licenses.len(), "licenses imported");
        self.emit(
            EventKind::LicensesImported,
            serde_json::json!({ "count": licenses.len() }),
        )?;
        Ok(())
    }

    async fn import_job(
        &mut self,
        job: &Job,
        directory: &UserDirectory,
        target: &mut dyn TargetWriter,
        report: &mut MigrationReport,
    ) -> Result<ProgressTally> {
        let sentinel = self.config.timeline.sentinel;
        let created = match self.source.first_activity(job.id) {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(
                    job_id = job.id,
                    error = %err,
                    "cannot determine project creation date"
                );
                None
            }
        };

        target.begin().await?;
        let area_id = target.insert_area(&job.geometry).await?;
        let project = project_row(job, area_id, created, directory);
        target.insert_project(&project).await?;

        let mut tally = ProgressTally::default();
        let mut task_id: TaskId = 0;
        let mut states = 0;
        let mut comments = 0;
        for tile in self.source.tiles(job.id)? {
            let polygon = match TilePolygon::for_tile(tile.x, tile.y, tile.zoom) {
                Ok(polygon) => polygon,
                Err(err) => {
                    tracing::warn!(job_id = job.id, error = %err, "skipping tile");
                    report.tiles_skipped += 1;
                    self.emit(
                        EventKind::TileSkipped,
                        serde_json::json!({ "job_id": job.id, "tile": tile }),
                    )?;
                    continue;
                }
            };
            task_id += 1;

            target
                .insert_task(&TaskRow {
                    id: task_id,
                    project_id: job.id,
                    x: tile.x,
                    y: tile.y,
                    zoom: tile.zoom,
                    geometry: polygon.to_wkt(),
                })
                .await?;
            target
                .insert_task_lock(&TaskLockRow::initial(task_id, job.id, sentinel))
                .await?;

            let history = self.source.history(job.id, tile)?;
            if history.skipped > 0 {
                tracing::warn!(
                    job_id = job.id,
                    task_id,
                    skipped = history.skipped,
                    "history rows without timestamp skipped"
                );
            }
            report.history_rows_skipped += history.skipped;

            let timeline =
                timeline::reconstruct(task_id, job.id, sentinel, &history.events, directory);
            for state in &timeline.states {
                target.insert_task_state(state).await?;
            }
            for comment in &timeline.comments {
                target.insert_task_comment(comment).await?;
            }
            tracing::debug!(
                job_id = job.id,
                task_id,
                events = history.events.len(),
                state = timeline.current_state().as_str(),
                "task imported"
            );

            states += timeline.states.len();
            comments += timeline.comments.len();
            tally.record(polygon.area(), timeline.current_state());
        }
        target.commit().await?;

        report.projects += 1;
        report.tasks += tally.tasks;
        report.states += states;
        report.comments += comments;
        tracing::info!(job_id = job.id, tasks = tally.tasks, "project imported");
        self.emit(
            EventKind::JobImported,
            serde_json::json!({
                "job_id": job.id,
                "tasks": tally.tasks,
                "states": states,
                "comments": comments,
            }),
        )?;
        Ok(tally)
    }

    async fn update_progress(
        &mut self,
        tallies: &BTreeMap<ProjectId, ProgressTally>,
        target: &mut dyn TargetWriter,
        report: &mut MigrationReport,
    ) -> Result<()> {
        target.begin().await?;
        for (project_id, tally) in tallies {
            let progress = tally.progress();
            target
                .update_project_progress(*project_id, progress.done, progress.validated)
                .await?;
            report.progress.insert(*project_id, progress);
        }
        target.commit().await?;
        self.emit(EventKind::ProgressUpdated, &report.progress)?;
        Ok(())
    }
}

fn project_row(
    job: &Job,
    area_id: i64,
    created: Option<chrono::NaiveDateTime>,
    users: &UserDirectory,
) -> ProjectRow {
    ProjectRow {
        id: job.id,
        area_id,
        name: job.title.clone(),
        description: job.description.clone(),
        short_description: job.short_description.clone(),
        instructions: job.workflow.clone(),
        per_task_instructions: job.task_extra.clone(),
        zoom: job.zoom,
        created,
        last_update: job.last_update,
        private: job.is_private,
        imagery: job.imagery.clone(),
        license_id: job.license_id,
        author_id: job.author.as_deref().and_then(|name| users.resolve(name)),
        status: job.status,
        josm_preset: job.josm_preset.clone(),
        priority: if job.featured {
            FEATURED_PRIORITY
        } else {
            DEFAULT_PRIORITY
        },
    }
}
