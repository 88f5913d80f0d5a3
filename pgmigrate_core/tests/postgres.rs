//! Integration tests against a live PostgreSQL instance.
//!
//! These are `#[ignore]`d by default since this workspace has no way to
//! stand up Postgres itself. Run them with:
//!
//! ```sh
//! PG_TEST_DSN=postgres://postgres@localhost/postgres cargo test --test postgres -- --ignored
//! ```

use tempfile::TempDir;
use tokio_postgres::NoTls;

use pgmigrate_core::engine::{AutoConfirm, Engine};
use pgmigrate_core::model::MigrationStatus;
use pgmigrate_core::{config, store::Store};

fn test_dsn() -> String {
    std::env::var("PG_TEST_DSN").expect("PG_TEST_DSN must be set to run postgres integration tests")
}

fn write_migration(root: &std::path::Path, id: &str, up: &str, down: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("up.sql"), up).unwrap();
    std::fs::write(dir.join("down.sql"), down).unwrap();
}

fn write_migration_with_verify(root: &std::path::Path, id: &str, up: &str, down: &str, verify: &str) {
    write_migration(root, id, up, down);
    std::fs::write(root.join(id).join("verify.sql"), verify).unwrap();
}

async fn connect() -> tokio_postgres::Client {
    let (client, connection) = tokio_postgres::connect(&test_dsn(), NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

#[tokio::test]
#[ignore]
async fn ensure_schema_creates_bookkeeping_table() {
    let client = connect().await;
    let store = Store::new(client, "public".to_string());
    store.ensure_schema().await.unwrap();
    let states = store.fetch_states().await.unwrap();
    assert!(states.is_empty() || states.iter().all(|s| !s.migration_id.is_empty()));
}

#[tokio::test]
#[ignore]
async fn advisory_lock_round_trips() {
    let client = connect().await;
    let store = Store::new(client, "public".to_string());
    let lock_key = 918_273_645;
    assert!(store.try_advisory_lock(lock_key).await.unwrap());
    store.advisory_unlock(lock_key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn engine_applies_then_rolls_back_a_migration() {
    let tmp = TempDir::new().unwrap();
    let migrations_dir = tmp.path().join("migrations");
    write_migration(
        &migrations_dir,
        "0001_create_widgets",
        "create table widgets (id serial primary key);",
        "drop table widgets;",
    );

    let overrides = config::ProfileOverrides {
        dsn: Some(test_dsn()),
        migrations_dir: Some(migrations_dir),
        log_dir: Some(tmp.path().join("logs")),
        interactive: Some(false),
        ..Default::default()
    };
    let raw = format!(
        "default_profile: test\nglobal:\n  lock_key: 5551234\nprofiles:\n  test:\n    dsn: {}\n",
        test_dsn()
    );
    let config_path = tmp.path().join("migrate.yaml");
    std::fs::write(&config_path, raw).unwrap();
    let global = config::load_config(&config_path).unwrap();
    let profile = config::resolve_profile(&global, None, overrides).unwrap();

    let mut engine = Engine::connect(profile, "pgmigrate-test", Box::new(AutoConfirm), false)
        .await
        .unwrap();

    let applied = engine.apply(None, true).await.unwrap();
    assert_eq!(applied, 1);

    let (_, states) = engine.status().await.unwrap();
    assert_eq!(
        states.get("0001_create_widgets").map(|s| s.status),
        Some(MigrationStatus::Applied)
    );

    let reverted = engine.rollback("0001_create_widgets", true).await.unwrap();
    assert_eq!(reverted, 1);

    let (_, states) = engine.status().await.unwrap();
    assert_eq!(
        states.get("0001_create_widgets").map(|s| s.status),
        Some(MigrationStatus::Reverted)
    );
}

#[tokio::test]
#[ignore]
async fn failing_verify_rolls_back_the_up_script() {
    let tmp = TempDir::new().unwrap();
    let migrations_dir = tmp.path().join("migrations");
    write_migration_with_verify(
        &migrations_dir,
        "0001_create_widgets",
        "create table widgets (id serial primary key);",
        "drop table widgets;",
        "select 1 / 0;",
    );

    let overrides = config::ProfileOverrides {
        dsn: Some(test_dsn()),
        migrations_dir: Some(migrations_dir),
        log_dir: Some(tmp.path().join("logs")),
        interactive: Some(false),
        ..Default::default()
    };
    let raw = format!(
        "default_profile: test\nglobal:\n  lock_key: 5551235\nprofiles:\n  test:\n    dsn: {}\n",
        test_dsn()
    );
    let config_path = tmp.path().join("migrate.yaml");
    std::fs::write(&config_path, raw).unwrap();
    let global = config::load_config(&config_path).unwrap();
    let profile = config::resolve_profile(&global, None, overrides).unwrap();

    let mut engine = Engine::connect(profile, "pgmigrate-test", Box::new(AutoConfirm), false)
        .await
        .unwrap();

    let err = engine.apply(None, true).await.unwrap_err();
    assert!(matches!(err.kind(), pgmigrate_core::Kind::Execution(_, _)));

    let (_, states) = engine.status().await.unwrap();
    assert_eq!(
        states.get("0001_create_widgets").map(|s| s.status),
        Some(MigrationStatus::Failed)
    );

    let client = connect().await;
    let row = client
        .query_one(
            "SELECT to_regclass('public.widgets') IS NULL",
            &[],
        )
        .await
        .unwrap();
    let table_missing: bool = row.get(0);
    assert!(table_missing, "up.sql should have been rolled back alongside the failed verify");
}

#[tokio::test]
#[ignore]
async fn reset_to_unknown_migration_errors() {
    let client = connect().await;
    let store = Store::new(client, "public".to_string());
    store.ensure_schema().await.unwrap();
    let err = store
        .reset_to("does_not_exist", MigrationStatus::Reverted)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), pgmigrate_core::Kind::NotTracked(_)));
}
