//! Command-line interface for tmmigrate
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventDestination, EventSink};
use crate::output::OutputOptions;
use crate::source::Tile;
use crate::users::{OfflineLookup, UserLookup, WhosThatLookup};

mod migrate;
mod timeline;
mod users;

const TARGET_ENV: &str = "TMMIGRATE_TARGET";

/// tmmigrate - Tasking Manager v1 to v2 migration
///
/// Reads a v1 SQLite database and writes its users, licenses, projects,
/// tasks and task history into the v2 PostgreSQL schema.
#[derive(Parser, Debug)]
#[command(name = "tmmigrate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./tmmigrate.toml when present)
    #[arg(long, global = true, env = "TMMIGRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write JSONL progress events to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Migrate a v1 database into the v2 schema
    Migrate {
        /// v1 SQLite database
        source: PathBuf,

        /// PostgreSQL connection URL of the v2 database
        /// (falls back to TMMIGRATE_TARGET when no destination flag is given)
        #[arg(long, conflicts_with_all = ["sql", "dry_run"])]
        target: Option<String>,

        /// Write an SQL script instead of connecting to a database
        #[arg(long, conflicts_with = "dry_run")]
        sql: Option<PathBuf>,

        /// Run every phase against an in-memory target and report counts
        #[arg(long)]
        dry_run: bool,

        /// Do not call the user lookup service
        #[arg(long)]
        offline: bool,
    },

    /// Resolve v1 usernames and fill the user cache
    Users {
        /// v1 SQLite database
        source: PathBuf,

        /// Do not call the user lookup service
        #[arg(long)]
        offline: bool,
    },

    /// Show the reconstructed timeline of one tile
    Timeline {
        /// v1 SQLite database
        source: PathBuf,

        /// Job id
        #[arg(long)]
        job: i64,

        /// Tile as x,y,zoom
        #[arg(long, value_parser = parse_tile)]
        tile: Tile,
    },
}

fn parse_tile(raw: &str) -> std::result::Result<Tile, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [x, y, zoom] = parts.as_slice() else {
        return Err(format!("expected x,y,zoom, got '{raw}'"));
    };
    let parse = |value: &str| {
        value
            .parse::<i64>()
            .map_err(|_| format!("'{value}' is not an integer"))
    };
    Ok(Tile {
        x: parse(*x)?,
        y: parse(*y)?,
        zoom: parse(*zoom)?,
    })
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let events = EventDestination::parse(self.events.as_deref());
        // JSONL on stdout would interleave with the JSON envelope.
        let json = self.json && events != Some(EventDestination::Stdout);
        let output = OutputOptions {
            json,
            quiet: self.quiet,
        };
        let cwd = std::env::current_dir()?;
        let config = Config::load_or_default(self.config.as_deref(), &cwd)?;

        match self.command {
            Commands::Migrate {
                source,
                target,
                sql,
                dry_run,
                offline,
            } => {
                let destination = match (sql, dry_run, target.or_else(target_from_env)) {
                    (Some(path), false, _) => migrate::Destination::Script(path),
                    (None, true, _) => migrate::Destination::DryRun,
                    (None, false, Some(url)) => migrate::Destination::Postgres(url),
                    _ => {
                        return Err(Error::InvalidArgument(
                            "pass exactly one of --target, --sql or --dry-run".to_string(),
                        ))
                    }
                };
                migrate::run(migrate::MigrateOptions {
                    source,
                    destination,
                    offline,
                    config,
                    cwd,
                    events,
                    output,
                })
            }
            Commands::Users { source, offline } => users::run(users::UsersOptions {
                source,
                offline,
                config,
                cwd,
                output,
            }),
            Commands::Timeline { source, job, tile } => {
                timeline::run(timeline::TimelineOptions {
                    source,
                    job,
                    tile,
                    config,
                    cwd,
                    output,
                })
            }
        }
    }
}

/// Connection URL from the environment; `--sql` and `--dry-run` take
/// precedence over it.
fn target_from_env() -> Option<String> {
    std::env::var(TARGET_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Single-threaded runtime driving the database and HTTP clients.
fn runtime() -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// The user cache path, relative paths taken from the working directory.
fn cache_path(config: &Config, cwd: &Path) -> PathBuf {
    cwd.join(&config.users.cache)
}

fn user_lookup(config: &Config, offline: bool) -> Result<Box<dyn UserLookup>> {
    if offline || config.users.offline {
        return Ok(Box::new(OfflineLookup));
    }
    let lookup = WhosThatLookup::new(&config.users.lookup_url, config.users.timeout())?;
    Ok(Box::new(lookup))
}

fn open_events(destination: Option<&EventDestination>) -> Result<Option<EventSink>> {
    destination.map(EventDestination::open).transpose()
}
