//! Runs one migration (or one rollback) to completion: status transitions,
//! hooks, SQL execution, and verification, all against a single connection
//! with explicit commit boundaries so a crash leaves an observable
//! `running` row rather than a half-applied migration that looks untouched.
//!
//! Ported from `original_source/runner.py::_apply_single` /
//! `_revert_single`.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use time::OffsetDateTime;
use tokio_postgres::GenericClient;

use crate::error::{Error, Kind};
use crate::include::expand_includes;
use crate::logsink::LogSink;
use crate::model::{MigrationDefinition, MigrationStatus, VerifyResult};
use crate::store::Store;

fn timeout_for(migration: &MigrationDefinition, profile_timeout_sec: u64) -> u64 {
    migration.meta.timeout_sec.unwrap_or(profile_timeout_sec)
}

fn run_hooks(hooks: &[String], log: &mut LogSink) -> Result<(), Error> {
    for hook in hooks {
        log.log(format!("running hook: {hook}"))?;
        let status = Command::new("sh")
            .arg("-c")
            .arg(hook)
            .status()
            .map_err(Error::from)?;
        if !status.success() {
            return Err(Kind::Execution(hook.clone(), format!("hook exited with {status}")).into());
        }
    }
    Ok(())
}

/// Run `path` (already expanded for includes) against `client`, scoping a
/// `statement_timeout` to it. `client` is generic so the same helper serves
/// both a bare `Client` (revert, standalone verify) and a `Transaction`
/// (apply, where the script and its verify must share one transaction).
async fn execute_sql(client: &impl GenericClient, path: &Path, timeout_sec: u64, log: &mut LogSink) -> Result<(), Error> {
    let sql_text = expand_includes(path)?;
    if sql_text.trim().is_empty() {
        log.log(format!("nothing to execute in {}", path.display()))?;
        return Ok(());
    }
    let timeout_ms = timeout_sec.saturating_mul(1000);
    log.log(format!("executing {} with timeout {timeout_sec}s", path.display()))?;
    // SET LOCAL only holds for the current transaction; bundling it with the
    // script in a single batch_execute keeps both statements in the implicit
    // (or explicit) transaction the call runs under.
    client
        .batch_execute(&format!("SET LOCAL statement_timeout = '{timeout_ms}ms';\n{sql_text}"))
        .await?;
    Ok(())
}

/// Run `verify.sql`'s text (read raw, not through the include preprocessor)
/// against `client`, scoped to `timeout_sec`.
async fn verify_sql(client: &impl GenericClient, verify_path: &Path, timeout_sec: u64) -> Result<(), Error> {
    let sql_text = std::fs::read_to_string(verify_path).map_err(Error::from)?;
    let timeout_ms = timeout_sec.saturating_mul(1000);
    client
        .batch_execute(&format!("SET LOCAL statement_timeout = '{timeout_ms}ms';\n{sql_text}"))
        .await?;
    Ok(())
}

/// Run `verify.sql` for `migration` standalone (outside of an apply), if it
/// has one. Returns `Ok((false, Some(details)))` on a SQL error rather than
/// propagating it, matching the original's "verification is informational"
/// behaviour for a bare `verify` command.
pub async fn run_verify(store: &Store, migration: &MigrationDefinition, profile_timeout_sec: u64) -> VerifyResult {
    let verify_path = match &migration.verify_sql {
        Some(path) => path,
        None => {
            return VerifyResult {
                migration_id: migration.migration_id.clone(),
                ok: false,
                details: Some("no verify.sql provided".to_string()),
            }
        }
    };

    let timeout = timeout_for(migration, profile_timeout_sec);
    match verify_sql(store.client(), verify_path, timeout).await {
        Ok(()) => VerifyResult {
            migration_id: migration.migration_id.clone(),
            ok: true,
            details: None,
        },
        Err(err) => VerifyResult {
            migration_id: migration.migration_id.clone(),
            ok: false,
            details: Some(err.to_string()),
        },
    }
}

/// Apply one migration: mark it `running`, run hooks and `up.sql`, verify,
/// mark it `applied`. On any failure the row is left `failed` and the error
/// is returned.
///
/// `up.sql` and `verify.sql` run inside one explicit transaction, committed
/// only after a successful verify. A failing verify (or a failing `up.sql`)
/// drops the transaction without committing, which rolls the script back —
/// a migration never ends up `failed` with its schema changes still applied.
pub async fn apply_one(
    store: &mut Store,
    migration: &MigrationDefinition,
    applied_by: &str,
    profile_timeout_sec: u64,
    log_dir: &Path,
) -> Result<(), Error> {
    let timeout = timeout_for(migration, profile_timeout_sec);
    let start = Instant::now();
    let started_at = OffsetDateTime::now_utc();
    let mut log = LogSink::create(log_dir, &migration.migration_id, started_at)?;

    log.log(format!("-- applying {} --", migration.migration_id))?;
    store
        .set_status(
            migration,
            MigrationStatus::Running,
            Some(applied_by),
            Some(started_at),
            None,
            None,
            Some(log.file_name()),
        )
        .await?;

    let outcome: Result<bool, Error> = async {
        run_hooks(&migration.meta.pre_hooks, &mut log)?;

        let txn = store.begin().await?;
        execute_sql(&txn, &migration.up_sql, timeout, &mut log).await?;

        let verify_ok = true;
        if let Some(verify_path) = &migration.verify_sql {
            let verify_timeout = timeout_for(migration, profile_timeout_sec);
            if let Err(err) = verify_sql(&txn, verify_path, verify_timeout).await {
                // txn drops here without commit, rolling back up.sql too.
                let details = err.to_string();
                log.log(format!("verify.sql failed: {details}"))?;
                return Err(Kind::Execution(migration.migration_id.clone(), details).into());
            }
        }
        txn.commit().await?;

        run_hooks(&migration.meta.post_hooks, &mut log)?;
        Ok(verify_ok)
    }
    .await;

    let execution_ms = start.elapsed().as_millis() as i32;
    let finished_at = OffsetDateTime::now_utc();

    match outcome {
        Ok(verify_ok) => {
            store
                .set_status(
                    migration,
                    MigrationStatus::Applied,
                    Some(applied_by),
                    Some(finished_at),
                    Some(execution_ms),
                    Some(verify_ok),
                    Some(log.file_name()),
                )
                .await?;
            log.log("migration applied successfully")?;
            Ok(())
        }
        Err(err) => {
            store
                .set_status(
                    migration,
                    MigrationStatus::Failed,
                    Some(applied_by),
                    Some(finished_at),
                    Some(execution_ms),
                    Some(false),
                    Some(log.file_name()),
                )
                .await?;
            log.log(format!("migration failed: {err}"))?;
            Err(err)
        }
    }
}

/// Revert one migration: mark it `running`, run hooks and `down.sql`, mark
/// it `reverted`.
pub async fn revert_one(
    store: &Store,
    migration: &MigrationDefinition,
    applied_by: &str,
    profile_timeout_sec: u64,
    log_dir: &Path,
) -> Result<(), Error> {
    let timeout = timeout_for(migration, profile_timeout_sec);
    let start = Instant::now();
    let started_at = OffsetDateTime::now_utc();
    let log_label = format!("{}_down", migration.migration_id);
    let mut log = LogSink::create(log_dir, &log_label, started_at)?;

    log.log(format!("-- reverting {} --", migration.migration_id))?;
    store
        .set_status(
            migration,
            MigrationStatus::Running,
            Some(applied_by),
            Some(started_at),
            None,
            None,
            Some(log.file_name()),
        )
        .await?;

    let outcome: Result<(), Error> = async {
        run_hooks(&migration.meta.pre_hooks, &mut log)?;
        execute_sql(store.client(), &migration.down_sql, timeout, &mut log).await?;
        run_hooks(&migration.meta.post_hooks, &mut log)?;
        Ok(())
    }
    .await;

    let execution_ms = start.elapsed().as_millis() as i32;
    let finished_at = OffsetDateTime::now_utc();

    match outcome {
        Ok(()) => {
            store
                .set_status(
                    migration,
                    MigrationStatus::Reverted,
                    Some(applied_by),
                    Some(finished_at),
                    Some(execution_ms),
                    None,
                    Some(log.file_name()),
                )
                .await?;
            log.log("migration reverted successfully")?;
            Ok(())
        }
        Err(err) => {
            store
                .set_status(
                    migration,
                    MigrationStatus::Failed,
                    Some(applied_by),
                    Some(finished_at),
                    Some(execution_ms),
                    Some(false),
                    Some(log.file_name()),
                )
                .await?;
            log.log(format!("rollback failed: {err}"))?;
            Err(err)
        }
    }
}
