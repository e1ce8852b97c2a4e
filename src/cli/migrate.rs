//! tmmigrate migrate command implementation

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::events::EventDestination;
use crate::migrate::{MigrationReport, Migrator};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::source::SourceDb;
use crate::target::{MemoryTarget, PgTarget, ScriptTarget};
use crate::users::UserCache;

/// Where the migrated rows go
#[derive(Debug, Clone)]
pub enum Destination {
    Postgres(String),
    Script(PathBuf),
    DryRun,
}

impl Destination {
    fn kind(&self) -> &'static str {
        match self {
            Destination::Postgres(_) => "postgres",
            Destination::Script(_) => "script",
            Destination::DryRun => "dry_run",
        }
    }
}

/// Options for the migrate command
pub struct MigrateOptions {
    pub source: PathBuf,
    pub destination: Destination,
    pub offline: bool,
    pub config: Config,
    pub cwd: PathBuf,
    pub events: Option<EventDestination>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct MigrateOutput {
    source: PathBuf,
    destination: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<PathBuf>,
    report: MigrationReport,
}

pub fn run(options: MigrateOptions) -> Result<()> {
    let MigrateOptions {
        source,
        destination,
        offline,
        config,
        cwd,
        events,
        output,
    } = options;

    let db = SourceDb::open(&source)?;
    let cache = UserCache::new(super::cache_path(&config, &cwd));
    let lookup = super::user_lookup(&config, offline)?;
    let runtime = super::runtime()?;

    let mut migrator = Migrator::new(&db, &config, cache, lookup.as_ref());
    if let Some(sink) = super::open_events(events.as_ref())? {
        migrator = migrator.with_events(sink);
    }

    let report = match &destination {
        Destination::Postgres(url) => runtime.block_on(async {
            let mut target = PgTarget::connect(url, &config.target).await?;
            migrator.run(&mut target).await
        })?,
        Destination::Script(path) => {
            let mut target = ScriptTarget::create(path, &config.target)?;
            runtime.block_on(migrator.run(&mut target))?
        }
        Destination::DryRun => {
            let mut target = MemoryTarget::new();
            runtime.block_on(migrator.run(&mut target))?
        }
    };

    let mut human = HumanOutput::new(format!(
        "tmmigrate migrate: {} migrated ({})",
        source.display(),
        destination.kind()
    ));
    human.push_summary(
        "users",
        format!(
            "{} imported, {} unresolved",
            report.users_imported, report.users_unresolved
        ),
    );
    human.push_summary("licenses", report.licenses.to_string());
    human.push_summary("projects", report.projects.to_string());
    human.push_summary("tasks", report.tasks.to_string());
    human.push_summary("task states", report.states.to_string());
    human.push_summary("task comments", report.comments.to_string());
    if let Some(next) = report.next_project_id {
        human.push_detail(format!("project ids restart at {next}"));
    }
    if report.tiles_skipped > 0 {
        human.push_warning(format!("{} tiles skipped (invalid zoom)", report.tiles_skipped));
    }
    if report.history_rows_skipped > 0 {
        human.push_warning(format!(
            "{} history rows skipped (no timestamp)",
            report.history_rows_skipped
        ));
    }
    if report.lookups.failed > 0 {
        human.push_warning(format!(
            "{} user lookups failed; rerun to retry them",
            report.lookups.failed
        ));
    }

    let script = match &destination {
        Destination::Script(path) => {
            human.push_next_step(format!("psql -f {}", path.display()));
            Some(path.clone())
        }
        _ => None,
    };

    let data = MigrateOutput {
        source,
        destination: destination.kind(),
        script,
        report,
    };
    emit_success(output, "migrate", &data, Some(&human))
}
