//! tmmigrate timeline command implementation
//!
//! Prints the states and comments one tile would be migrated with. Users
//! are resolved from the cache only.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::source::{SourceDb, Tile};
use crate::tiles::TilePolygon;
use crate::timeline::{reconstruct, TaskId, Timeline};
use crate::users::UserCache;

/// Options for the timeline command
pub struct TimelineOptions {
    pub source: PathBuf,
    pub job: i64,
    pub tile: Tile,
    pub config: Config,
    pub cwd: PathBuf,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct TimelineReport {
    job: i64,
    tile: Tile,
    task_id: TaskId,
    events: usize,
    skipped: usize,
    state: &'static str,
    timeline: Timeline,
}

pub fn run(options: TimelineOptions) -> Result<()> {
    let TimelineOptions {
        source,
        job,
        tile,
        config,
        cwd,
        output,
    } = options;

    TilePolygon::for_tile(tile.x, tile.y, tile.zoom)?;

    let db = SourceDb::open(&source)?;
    if db.job(job)?.is_none() {
        return Err(Error::InvalidArgument(format!("job {job} not found")));
    }

    // Same numbering as the migration: invalid tiles take no task id.
    let task_id = db
        .tiles(job)?
        .into_iter()
        .filter(|candidate| {
            TilePolygon::for_tile(candidate.x, candidate.y, candidate.zoom).is_ok()
        })
        .position(|candidate| candidate == tile)
        .map(|index| index as TaskId + 1)
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "job {job} has no tile {},{},{}",
                tile.x, tile.y, tile.zoom
            ))
        })?;

    let directory = UserCache::new(super::cache_path(&config, &cwd)).load()?;
    let history = db.history(job, tile)?;
    let timeline = reconstruct(
        task_id,
        job,
        config.timeline.sentinel,
        &history.events,
        &directory,
    );

    let mut human = HumanOutput::new(format!(
        "tmmigrate timeline: job {job} tile {},{},{} (task {task_id})",
        tile.x, tile.y, tile.zoom
    ));
    human.push_summary("events", history.events.len().to_string());
    human.push_summary("final state", timeline.current_state().as_str());
    for state in &timeline.states {
        human.push_detail(format!(
            "{} {}{}",
            state.date,
            state.state.as_str(),
            state
                .user_id
                .map(|id| format!(" by {}", id.0))
                .unwrap_or_default()
        ));
    }
    for comment in &timeline.comments {
        human.push_detail(format!("{} comment: {}", comment.date, comment.text));
    }
    if history.skipped > 0 {
        human.push_warning(format!(
            "{} history rows without timestamp skipped",
            history.skipped
        ));
    }

    let report = TimelineReport {
        job,
        tile,
        task_id,
        events: history.events.len(),
        skipped: history.skipped,
        state: timeline.current_state().as_str(),
        timeline,
    };
    emit_success(output, "timeline", &report, Some(&human))
}
