//! tmmigrate users command implementation
//!
//! Resolves every v1 username and records the results in the user cache
//! without touching any target.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::source::SourceDb;
use crate::users::{resolve_usernames, ResolveStats, UserCache};

/// Options for the users command
pub struct UsersOptions {
    pub source: PathBuf,
    pub offline: bool,
    pub config: Config,
    pub cwd: PathBuf,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct UsersReport {
    cache: PathBuf,
    names: usize,
    resolved: usize,
    unresolved: Vec<String>,
    lookups: ResolveStats,
}

pub fn run(options: UsersOptions) -> Result<()> {
    let db = SourceDb::open(&options.source)?;
    let names = db.usernames()?;
    let cache = UserCache::new(super::cache_path(&options.config, &options.cwd));
    let lookup = super::user_lookup(&options.config, options.offline)?;

    let runtime = super::runtime()?;
    let (directory, stats) =
        runtime.block_on(resolve_usernames(&names, &cache, lookup.as_ref()))?;

    let unresolved: Vec<String> = directory
        .names()
        .filter(|name| !directory.is_resolved(name))
        .map(str::to_string)
        .collect();

    let report = UsersReport {
        cache: cache.path().to_path_buf(),
        names: directory.len(),
        resolved: directory.resolved_count(),
        unresolved,
        lookups: stats,
    };

    let mut human = HumanOutput::new(format!(
        "tmmigrate users: {} of {} names resolved",
        report.resolved, report.names
    ));
    human.push_summary("cache", report.cache.display().to_string());
    human.push_summary("from cache", stats.cached.to_string());
    human.push_summary("looked up", stats.looked_up.to_string());
    for name in &report.unresolved {
        human.push_detail(format!("unresolved: {name}"));
    }
    if stats.failed > 0 {
        human.push_warning(format!(
            "{} lookups failed and were not cached",
            stats.failed
        ));
        human.push_next_step("rerun tmmigrate users to retry failed lookups");
    }
    if stats.rejected > 0 {
        human.push_warning(format!(
            "{} names contain line breaks and were left unresolved",
            stats.rejected
        ));
    }

    emit_success(options.output, "users", &report, Some(&human))
}
