mod support;

use chrono::NaiveDate;
use support::{standard_source, HistoryRow, JobFixture, TestSource};
use tmmigrate::config::Config;
use tmmigrate::events::EventSink;
use tmmigrate::migrate::Migrator;
use tmmigrate::source::SourceDb;
use tmmigrate::stats::Progress;
use tmmigrate::target::{MemoryTarget, TargetWriter, FEATURED_PRIORITY, DEFAULT_PRIORITY};
use tmmigrate::timeline::TaskState;
use tmmigrate::users::{OfflineLookup, UserCache, UserId};

fn date(day: u32, hour: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2012, 1, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .expect("valid date")
}

#[tokio::test]
async fn dry_run_imports_expected_rows() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();

    let report = migrator.run(&mut target).await.expect("migrate");

    assert_eq!(report.projects, 2);
    assert_eq!(report.tasks, 3);
    assert_eq!(report.states, 7);
    assert_eq!(report.comments, 3);
    assert_eq!(report.tiles_skipped, 1);
    assert_eq!(report.history_rows_skipped, 1);
    assert_eq!(report.users_resolved, 2);
    assert_eq!(report.users_unresolved, 1);
    assert_eq!(report.users_imported, 2);
    assert_eq!(report.licenses, 1);
    assert_eq!(report.next_project_id, Some(3));

    assert_eq!(target.resets, 1);
    // reset, users, licenses, two jobs, progress, sequence
    assert_eq!(target.commits, 7);
    assert_eq!(target.users.len(), 2);
    assert_eq!(target.licenses.len(), 1);
    assert_eq!(target.areas.len(), 2);
    assert_eq!(target.tasks.len(), 3);
    assert_eq!(target.locks.len(), 3);
    assert_eq!(target.states.len(), 7);
    assert_eq!(target.comments.len(), 3);
    assert_eq!(target.next_project_id, Some(3));
}

#[tokio::test]
async fn projects_carry_job_metadata() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();
    migrator.run(&mut target).await.expect("migrate");

    let roads = &target.projects[0];
    assert_eq!(roads.id, 1);
    assert_eq!(roads.name, "Roads");
    assert_eq!(roads.author_id, Some(UserId(100)));
    assert_eq!(roads.priority, FEATURED_PRIORITY);
    assert_eq!(roads.imagery, None);
    assert_eq!(roads.license_id, Some(1));
    assert_eq!(roads.instructions.as_deref(), Some("workflow"));
    assert_eq!(roads.per_task_instructions.as_deref(), Some("extra"));
    assert_eq!(
        roads.created,
        NaiveDate::from_ymd_opt(2012, 1, 1).and_then(|d| d.and_hms_opt(10, 0, 0))
    );

    let buildings = &target.projects[1];
    assert_eq!(buildings.author_id, None);
    assert_eq!(buildings.priority, DEFAULT_PRIORITY);
    assert_eq!(buildings.created, None);
    assert!(buildings.imagery.is_some());
}

#[tokio::test]
async fn timelines_and_progress_follow_history() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();
    let report = migrator.run(&mut target).await.expect("migrate");

    let ids: Vec<(i64, i64)> = target
        .tasks
        .iter()
        .map(|task| (task.project_id, task.id))
        .collect();
    assert_eq!(ids, vec![(1, 1), (1, 2), (2, 1)]);

    let task_states = |project_id: i64, task_id: i64| -> Vec<(TaskState, Option<UserId>)> {
        target
            .states
            .iter()
            .filter(|state| state.project_id == project_id && state.task_id == task_id)
            .map(|state| (state.state, state.user_id))
            .collect()
    };
    assert_eq!(
        task_states(1, 1),
        vec![
            (TaskState::None, None),
            (TaskState::Done, Some(UserId(100))),
            (TaskState::Validated, Some(UserId(200))),
        ]
    );
    assert_eq!(
        task_states(1, 2),
        vec![
            (TaskState::None, None),
            (TaskState::Done, None),
            (TaskState::Invalidated, Some(UserId(200))),
        ]
    );
    assert_eq!(task_states(2, 1), vec![(TaskState::None, None)]);

    let initial = &target.states[0];
    assert_eq!(initial.date, config.timeline.sentinel);
    assert!(target.locks.iter().all(|lock| !lock.lock && lock.user_id.is_none()));

    let comments: Vec<(&str, chrono::NaiveDateTime)> = target
        .comments
        .iter()
        .map(|comment| (comment.text.as_str(), comment.date))
        .collect();
    assert_eq!(
        comments,
        vec![
            ("taking this", date(1, 10)),
            ("looks good", date(2, 9)),
            ("missing roads", date(4, 12)),
        ]
    );

    assert_eq!(
        report.progress.get(&1),
        Some(&Progress {
            done: 50,
            validated: 50
        })
    );
    assert_eq!(report.progress.get(&2), Some(&Progress::default()));
    assert_eq!(target.progress.get(&1), Some(&(50, 50)));
}

#[tokio::test]
async fn reset_can_be_disabled() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let mut config = Config::default();
    config.target.reset = false;
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();
    migrator.run(&mut target).await.expect("migrate");

    assert_eq!(target.resets, 0);
    assert_eq!(target.commits, 6);
}

#[tokio::test]
async fn project_ids_restart_above_existing_target_rows() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let mut config = Config::default();
    config.target.reset = false;
    let lookup = OfflineLookup;
    let mut target = MemoryTarget::new();

    let mut existing = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    existing.run(&mut target).await.expect("first run");
    let mut later = target.projects[0].clone();
    later.id = 10;
    target.projects.push(later);

    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let report = migrator.run(&mut target).await.expect("second run");

    assert_eq!(report.next_project_id, Some(11));
    assert_eq!(target.next_project_id, Some(11));
}

#[tokio::test]
async fn cached_users_outside_users_table_are_resolved() {
    let fixture = TestSource::create();
    fixture.add_user("alice");
    fixture.write_file("users.list", "alice;100;\ncarol;300;\n");
    let mut job = JobFixture::new(1, "Parks");
    job.author = Some("carol");
    fixture.add_job(job);
    fixture.add_tile(1, 0, 0, 1);
    fixture.add_history(
        1,
        (0, 0, 1),
        HistoryRow::at("2012-02-01 09:00:00").checkin(1).changed().by("carol"),
    );

    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();
    let report = migrator.run(&mut target).await.expect("migrate");

    let state_users: Vec<Option<UserId>> =
        target.states.iter().map(|record| record.user_id).collect();
    assert_eq!(state_users, vec![None, Some(UserId(300))]);
    assert_eq!(target.projects[0].author_id, Some(UserId(300)));
    let imported: Vec<(i64, &str)> = target
        .users
        .iter()
        .map(|user| (user.id.0, user.username.as_str()))
        .collect();
    assert_eq!(imported, vec![(100, "alice"), (300, "carol")]);
    assert_eq!(report.users_imported, 2);
    assert_eq!(report.lookups.cached, 1);
}

#[tokio::test]
async fn empty_source_skips_sequence_restart() {
    let fixture = support::TestSource::create();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    );
    let mut target = MemoryTarget::new();
    let report = migrator.run(&mut target).await.expect("migrate");

    assert_eq!(report.projects, 0);
    assert_eq!(report.next_project_id, None);
    assert_eq!(target.next_project_id, None);
    assert!(!fixture.cache_path().exists());
}

#[tokio::test]
async fn events_are_written_per_phase() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let events_path = fixture.dir().join("events.jsonl");
    let sink = EventSink::file(&events_path).expect("event sink");
    let mut migrator = Migrator::new(
        &source,
        &config,
        UserCache::new(fixture.cache_path()),
        &lookup,
    )
    .with_events(sink);
    let mut target = MemoryTarget::new();
    migrator.run(&mut target).await.expect("migrate");

    let content = std::fs::read_to_string(&events_path).expect("read events");
    let kinds: Vec<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("json line");
            value["event"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "migration_started",
            "target_reset",
            "users_resolved",
            "licenses_imported",
            "tile_skipped",
            "job_imported",
            "job_imported",
            "progress_updated",
            "migration_finished",
        ]
    );
}

#[tokio::test]
async fn missing_table_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.db");
    let conn = rusqlite::Connection::open(&path).expect("open");
    conn.execute_batch("CREATE TABLE users (id INTEGER, username TEXT);")
        .expect("schema");

    let err = SourceDb::open(&path).err().expect("missing tables");
    assert!(matches!(err, tmmigrate::Error::MissingTable(_)));
    assert_eq!(err.exit_code(), 2);

    let mut target = MemoryTarget::new();
    assert!(target.commit().await.is_err());
}
