//! Reader for the v1 SQLite database.
//!
//! v1 keeps everything in five tables: `users`, `licenses`, `jobs`, `tiles`
//! and `tiles_history`. The reader only ever selects; the file is opened
//! read-only.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::timeline::{CheckinCode, HistoryEvent};

const REQUIRED_TABLES: [&str; 5] = ["users", "licenses", "jobs", "tiles", "tiles_history"];

/// A v1 license, copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub plain_text: Option<String>,
}

/// A v1 job, which becomes a v2 project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
    /// WKT in EPSG:3857.
    pub geometry: String,
    pub zoom: i64,
    pub last_update: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub is_private: bool,
    pub workflow: Option<String>,
    pub task_extra: Option<String>,
    pub imagery: Option<String>,
    pub license_id: Option<i64>,
    pub author: Option<String>,
    pub status: Option<i64>,
    pub josm_preset: Option<String>,
    pub featured: bool,
}

/// Grid address of a v1 tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub x: i64,
    pub y: i64,
    pub zoom: i64,
}

/// History of one tile, with the count of rows dropped for lacking a
/// usable timestamp.
#[derive(Debug, Clone, Default)]
pub struct TileHistory {
    pub events: Vec<HistoryEvent>,
    pub skipped: usize,
}

pub struct SourceDb {
    conn: Connection,
    path: PathBuf,
}

impl SourceDb {
    /// Open a v1 database read-only and check its tables.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::SourceNotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let source = Self {
            conn,
            path: path.to_path_buf(),
        };
        source.check_tables()?;
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_tables(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        for table in REQUIRED_TABLES {
            let found: Option<String> = stmt
                .query_row(params![table], |row| row.get(0))
                .optional()?;
            if found.is_none() {
                return Err(Error::MissingTable(table.to_string()));
            }
        }
        Ok(())
    }

    /// Every username known to v1, in table order.
    pub fn usernames(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username FROM users WHERE username IS NOT NULL ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    pub fn licenses(&self) -> Result<Vec<License>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, plain_text FROM licenses ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(License {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                plain_text: row.get(3)?,
            })
        })?;
        let mut licenses = Vec::new();
        for row in rows {
            licenses.push(row?);
        }
        Ok(licenses)
    }

    pub fn jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, geometry, zoom, last_update, description, short_description,
                    is_private, workflow, task_extra, imagery, license_id, author, status,
                    josm_preset, featured
             FROM jobs ORDER BY id",
        )?;
        let rows = stmt.query_map([], job_from_row)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    pub fn job(&self, job_id: i64) -> Result<Option<Job>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, title, geometry, zoom, last_update, description, short_description,
                        is_private, workflow, task_extra, imagery, license_id, author, status,
                        josm_preset, featured
                 FROM jobs WHERE id = ?1",
                params![job_id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Earliest timestamped history row of a job.
    pub fn first_activity(&self, job_id: i64) -> Result<Option<NaiveDateTime>> {
        let first = self
            .conn
            .query_row(
                r#"SELECT "update" FROM tiles_history
                   WHERE job_id = ?1 AND "update" IS NOT NULL
                   ORDER BY "update" LIMIT 1"#,
                params![job_id],
                |row| row.get::<_, NaiveDateTime>(0),
            )
            .optional()?;
        Ok(first)
    }

    pub fn tiles(&self, job_id: i64) -> Result<Vec<Tile>> {
        let mut stmt = self
            .conn
            .prepare("SELECT x, y, zoom FROM tiles WHERE job_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![job_id], |row| {
            Ok(Tile {
                x: row.get(0)?,
                y: row.get(1)?,
                zoom: row.get(2)?,
            })
        })?;
        let mut tiles = Vec::new();
        for row in rows {
            tiles.push(row?);
        }
        Ok(tiles)
    }

    /// History of one tile in `"update"` order.
    pub fn history(&self, job_id: i64, tile: Tile) -> Result<TileHistory> {
        let mut stmt = self.conn.prepare(
            r#"SELECT "update", checkin, change, comment, username
               FROM tiles_history
               WHERE job_id = ?1 AND x = ?2 AND y = ?3 AND zoom = ?4
               ORDER BY "update", rowid"#,
        )?;
        let rows = stmt.query_map(params![job_id, tile.x, tile.y, tile.zoom], |row| {
            let timestamp = row.get::<_, Option<NaiveDateTime>>(0).ok().flatten();
            let checkin: Option<i64> = row.get(1)?;
            let changed: Option<bool> = row.get(2)?;
            Ok(timestamp.map(|timestamp| HistoryEvent {
                timestamp,
                checkin: CheckinCode::from_raw(checkin),
                changed: changed.unwrap_or(false),
                comment: row.get::<_, Option<String>>(3).ok().flatten(),
                username: row.get::<_, Option<String>>(4).ok().flatten(),
            }))
        })?;

        let mut history = TileHistory::default();
        for row in rows {
            match row? {
                Some(event) => history.events.push(event),
                None => history.skipped += 1,
            }
        }
        Ok(history)
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let imagery: Option<String> = row.get(10)?;
    Ok(Job {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        geometry: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        zoom: row.get(3)?,
        last_update: row.get::<_, Option<NaiveDateTime>>(4).ok().flatten(),
        description: row.get(5)?,
        short_description: row.get(6)?,
        is_private: row.get::<_, Option<bool>>(7)?.unwrap_or(false),
        workflow: row.get(8)?,
        task_extra: row.get(9)?,
        imagery: imagery.filter(|value| value != "None"),
        license_id: row.get(11)?,
        author: row.get::<_, Option<String>>(12)?.filter(|name| !name.is_empty()),
        status: row.get(13)?,
        josm_preset: row.get(14)?,
        featured: row.get::<_, Option<bool>>(15)?.unwrap_or(false),
    })
}
