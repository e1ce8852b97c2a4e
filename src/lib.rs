//! tmmigrate - Tasking Manager v1 to v2 migration library
//!
//! Moves task-mapping data from the legacy single-file SQLite schema into
//! the normalized PostgreSQL/PostGIS schema.
//!
//! # Core Concepts
//!
//! - **Jobs** become projects, **tiles** become tasks
//! - **Timelines**: each tile's flat history log is folded into discrete
//!   state transitions and comments
//! - **Users**: v1 display names are resolved to numeric user ids through
//!   a lookup service and a local cache
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `tmmigrate.toml`
//! - `error`: Error types and result aliases
//! - `events`: JSONL progress events
//! - `lock`: File locking for the user cache
//! - `migrate`: The migration driver
//! - `output`: Human and JSON command output
//! - `source`: v1 SQLite reader
//! - `stats`: Project progress
//! - `target`: v2 writers (PostgreSQL, SQL script, memory)
//! - `tiles`: Tile grid geometry
//! - `timeline`: History-to-timeline reconstruction
//! - `users`: Username resolution

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod migrate;
pub mod output;
pub mod source;
pub mod stats;
pub mod target;
pub mod tiles;
pub mod timeline;
pub mod users;

pub use error::{Error, Result};
