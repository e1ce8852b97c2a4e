#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

const V1_SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    username TEXT
);
CREATE TABLE licenses (
    id INTEGER PRIMARY KEY,
    name TEXT,
    description TEXT,
    plain_text TEXT
);
CREATE TABLE jobs (
    id INTEGER PRIMARY KEY,
    title TEXT,
    geometry TEXT,
    zoom INTEGER,
    last_update TEXT,
    description TEXT,
    short_description TEXT,
    is_private BOOLEAN,
    workflow TEXT,
    task_extra TEXT,
    imagery TEXT,
    license_id INTEGER,
    author TEXT,
    status INTEGER,
    josm_preset TEXT,
    featured BOOLEAN
);
CREATE TABLE tiles (
    x INTEGER,
    y INTEGER,
    zoom INTEGER,
    job_id INTEGER
);
CREATE TABLE tiles_history (
    x INTEGER,
    y INTEGER,
    zoom INTEGER,
    job_id INTEGER,
    "update" TEXT,
    checkin INTEGER,
    change BOOLEAN,
    comment TEXT,
    username TEXT
);
"#;

/// A job row; unset fields take v1-ish defaults.
pub struct JobFixture<'a> {
    pub id: i64,
    pub title: &'a str,
    pub zoom: i64,
    pub author: Option<&'a str>,
    pub featured: bool,
    pub imagery: Option<&'a str>,
    pub license_id: Option<i64>,
}

impl<'a> JobFixture<'a> {
    pub fn new(id: i64, title: &'a str) -> Self {
        Self {
            id,
            title,
            zoom: 2,
            author: None,
            featured: false,
            imagery: None,
            license_id: None,
        }
    }
}

/// One `tiles_history` row.
pub struct HistoryRow<'a> {
    pub update: Option<&'a str>,
    pub checkin: Option<i64>,
    pub change: bool,
    pub comment: Option<&'a str>,
    pub username: Option<&'a str>,
}

impl<'a> HistoryRow<'a> {
    pub fn at(update: &'a str) -> Self {
        Self {
            update: Some(update),
            checkin: Some(0),
            change: false,
            comment: None,
            username: None,
        }
    }

    pub fn checkin(mut self, code: i64) -> Self {
        self.checkin = Some(code);
        self
    }

    pub fn changed(mut self) -> Self {
        self.change = true;
        self
    }

    pub fn comment(mut self, text: &'a str) -> Self {
        self.comment = Some(text);
        self
    }

    pub fn by(mut self, username: &'a str) -> Self {
        self.username = Some(username);
        self
    }
}

/// A v1 database in a temporary working directory.
pub struct TestSource {
    dir: TempDir,
    conn: Connection,
}

impl TestSource {
    pub fn create() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let conn = Connection::open(dir.path().join("v1.db")).expect("open sqlite");
        conn.execute_batch(V1_SCHEMA).expect("create v1 schema");
        Self { dir, conn }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("v1.db")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("users.list")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel_path);
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn add_user(&self, username: &str) {
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", params![username])
            .expect("insert user");
    }

    pub fn add_license(&self, id: i64, name: &str) {
        self.conn
            .execute(
                "INSERT INTO licenses (id, name, description, plain_text) VALUES (?1, ?2, ?3, ?4)",
                params![id, name, format!("{name} license"), "plain"],
            )
            .expect("insert license");
    }

    pub fn add_job(&self, job: JobFixture<'_>) {
        self.conn
            .execute(
                "INSERT INTO jobs (id, title, geometry, zoom, last_update, description,
                                   short_description, is_private, workflow, task_extra, imagery,
                                   license_id, author, status, josm_preset, featured)
                 VALUES (?1, ?2, 'POLYGON((0 0, 1000 0, 1000 1000, 0 1000, 0 0))', ?3,
                         '2013-02-01 08:00:00', 'description', 'short', 0, 'workflow',
                         'extra', ?4, ?5, ?6, 1, NULL, ?7)",
                params![
                    job.id,
                    job.title,
                    job.zoom,
                    job.imagery,
                    job.license_id,
                    job.author,
                    job.featured
                ],
            )
            .expect("insert job");
    }

    pub fn add_tile(&self, job_id: i64, x: i64, y: i64, zoom: i64) {
        self.conn
            .execute(
                "INSERT INTO tiles (x, y, zoom, job_id) VALUES (?1, ?2, ?3, ?4)",
                params![x, y, zoom, job_id],
            )
            .expect("insert tile");
    }

    pub fn add_history(&self, job_id: i64, tile: (i64, i64, i64), row: HistoryRow<'_>) {
        self.conn
            .execute(
                r#"INSERT INTO tiles_history
                   (x, y, zoom, job_id, "update", checkin, change, comment, username)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                params![
                    tile.0,
                    tile.1,
                    tile.2,
                    job_id,
                    row.update,
                    row.checkin,
                    row.change,
                    row.comment,
                    row.username
                ],
            )
            .expect("insert history");
    }
}

/// Two jobs, three valid tiles, one tile with zoom 0, a history row
/// without timestamp, and a user cache resolving alice and bob.
///
/// Expected migration: 2 projects, 3 tasks, 7 states, 3 comments.
pub fn standard_source() -> TestSource {
    let source = TestSource::create();
    source.add_user("alice");
    source.add_user("bob");
    source.add_user("ghost");
    source.add_license(1, "ODbL");

    source.add_job(JobFixture {
        author: Some("alice"),
        featured: true,
        imagery: Some("None"),
        license_id: Some(1),
        ..JobFixture::new(1, "Roads")
    });
    source.add_tile(1, 1, 1, 2);
    source.add_tile(1, 2, 1, 2);
    source.add_tile(1, 0, 0, 0);

    source.add_history(
        1,
        (1, 1, 2),
        HistoryRow::at("2012-01-01 10:00:00").comment("taking this").by("alice"),
    );
    source.add_history(
        1,
        (1, 1, 2),
        HistoryRow::at("2012-01-01 11:00:00")
            .checkin(1)
            .changed()
            .comment("")
            .by("alice"),
    );
    source.add_history(
        1,
        (1, 1, 2),
        HistoryRow::at("2012-01-02 09:00:00")
            .checkin(2)
            .changed()
            .comment("looks good")
            .by("bob"),
    );

    source.add_history(
        1,
        (2, 1, 2),
        HistoryRow::at("2012-01-03 12:00:00").checkin(1).changed().by("ghost"),
    );
    source.add_history(
        1,
        (2, 1, 2),
        HistoryRow::at("2012-01-04 12:00:00")
            .changed()
            .comment("missing roads")
            .by("bob"),
    );
    source.add_history(
        1,
        (2, 1, 2),
        HistoryRow {
            update: None,
            ..HistoryRow::at("unused").checkin(1).changed().by("bob")
        },
    );

    source.add_job(JobFixture {
        author: Some(""),
        zoom: 1,
        imagery: Some("tms[22]:http://imagery.example/{zoom}/{x}/{y}.png"),
        ..JobFixture::new(2, "Buildings")
    });
    source.add_tile(2, 0, 0, 1);

    source.write_file("users.list", "alice;100;\nbob;200;\nghost;-1;\n");
    source
}
