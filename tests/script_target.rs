mod support;

use support::standard_source;
use tmmigrate::config::Config;
use tmmigrate::migrate::Migrator;
use tmmigrate::source::SourceDb;
use tmmigrate::target::ScriptTarget;
use tmmigrate::users::{OfflineLookup, UserCache};

#[tokio::test]
async fn script_wraps_each_phase_in_a_transaction() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let config = Config::default();
    let lookup = OfflineLookup;
    let script_path = fixture.dir().join("migration.sql");

    {
        let mut target = ScriptTarget::create(&script_path, &config.target).expect("script");
        assert_eq!(target.path(), Some(script_path.as_path()));
        let mut migrator = Migrator::new(
            &source,
            &config,
            UserCache::new(fixture.cache_path()),
            &lookup,
        );
        migrator.run(&mut target).await.expect("migrate");
    }

    let script = std::fs::read_to_string(&script_path).expect("read script");
    let begins = script.lines().filter(|line| *line == "BEGIN;").count();
    let commits = script.lines().filter(|line| *line == "COMMIT;").count();
    assert_eq!(begins, 7);
    assert_eq!(commits, 7);

    assert!(script.starts_with("BEGIN;\nDELETE FROM task_lock;"));
    assert!(script.contains("INSERT INTO users (id, username) VALUES (100, 'alice');"));
    assert!(script.contains("currval(pg_get_serial_sequence('area', 'id'))"));
    assert!(script.contains("'looks good'"));
    assert!(script.contains("UPDATE project SET done = 50, validated = 50 WHERE id = 1;"));
    assert!(script.contains(
        "SELECT setval('project_id_seq', GREATEST((SELECT COALESCE(MAX(id), 0) FROM project) + 1, 3), false);"
    ));
    assert_eq!(
        script
            .lines()
            .filter(|line| line.starts_with("INSERT INTO task_state "))
            .count(),
        7
    );
}

#[tokio::test]
async fn script_uses_configured_locale_and_sequence() {
    let fixture = standard_source();
    let source = SourceDb::open(&fixture.db_path()).expect("open source");
    let mut config = Config::default();
    config.target.locale = "fr".to_string();
    config.target.project_sequence = "public.project_id_seq".to_string();
    config.target.reset = false;
    let lookup = OfflineLookup;
    let script_path = fixture.dir().join("fr.sql");

    {
        let mut target = ScriptTarget::create(&script_path, &config.target).expect("script");
        let mut migrator = Migrator::new(
            &source,
            &config,
            UserCache::new(fixture.cache_path()),
            &lookup,
        );
        migrator.run(&mut target).await.expect("migrate");
    }

    let script = std::fs::read_to_string(&script_path).expect("read script");
    assert!(!script.contains("DELETE FROM"));
    assert!(script.contains("VALUES (1, 'fr', 'Roads'"));
    assert!(script.contains("SELECT setval('public.project_id_seq', GREATEST("));
}
