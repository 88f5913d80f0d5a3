//! Decides which migrations need to run and in what order, without touching
//! the database connection itself.
//!
//! Ported from `original_source/runner.py::_pending_for_apply` /
//! `_pending_for_down`.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Kind};
use crate::model::{MigrationDefinition, MigrationState, MigrationStatus, PlanDown, PlanUp};

fn validate_tags(migration: &MigrationDefinition, allow_tags: &[String]) -> Result<(), Error> {
    if allow_tags.is_empty() {
        return Ok(());
    }
    let allowed: HashSet<&str> = allow_tags.iter().map(String::as_str).collect();
    if migration.meta.tags.iter().any(|tag| !allowed.contains(tag.as_str())) {
        return Err(Kind::TagNotAllowed(migration.migration_id.clone()).into());
    }
    Ok(())
}

fn validate_dependencies(
    states: &HashMap<String, MigrationState>,
    batch: &[MigrationDefinition],
) -> Result<(), Error> {
    let applied: HashSet<&str> = states
        .iter()
        .filter(|(_, state)| state.status == MigrationStatus::Applied)
        .map(|(id, _)| id.as_str())
        .collect();
    let in_batch: HashSet<&str> = batch.iter().map(|m| m.migration_id.as_str()).collect();

    for migration in batch {
        for required in &migration.meta.requires {
            if !applied.contains(required.as_str()) && !in_batch.contains(required.as_str()) {
                return Err(Kind::MissingDependency {
                    migration: migration.migration_id.clone(),
                    requires: required.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Determine which migrations need applying, optionally stopping at
/// `target`. Returns an error if any already-tracked migration's checksum
/// has drifted, is stuck `running`, or previously `failed`.
pub fn plan_up(
    migrations: &[MigrationDefinition],
    states: &HashMap<String, MigrationState>,
    target: Option<&str>,
    allow_tags: &[String],
) -> Result<PlanUp, Error> {
    let mut pending = Vec::new();
    let mut already_applied = Vec::new();
    let mut target_reached = false;

    for migration in migrations {
        if let Some(target) = target {
            if migration.migration_id.as_str() > target {
                break;
            }
        }

        if let Some(state) = states.get(&migration.migration_id) {
            if state.checksum != migration.checksum {
                return Err(Kind::ChecksumMismatch(migration.migration_id.clone()).into());
            }
            match state.status {
                MigrationStatus::Running => {
                    return Err(Kind::InProgress(migration.migration_id.clone()).into());
                }
                MigrationStatus::Failed => {
                    return Err(Kind::PreviousFailure(migration.migration_id.clone()).into());
                }
                MigrationStatus::Applied => {
                    // Already applied migrations are never pushed to `pending`,
                    // even when they match `target` — reaching the target this
                    // way is not good enough, it must actually be pending.
                    already_applied.push(migration.clone());
                    continue;
                }
                MigrationStatus::Reverted => {}
            }
        }

        validate_tags(migration, allow_tags)?;
        pending.push(migration.clone());
        if target == Some(migration.migration_id.as_str()) {
            target_reached = true;
            break;
        }
    }

    if let Some(target) = target {
        if !target_reached {
            return Err(Kind::TargetUnreachable(target.to_string()).into());
        }
    }

    validate_dependencies(states, &pending)?;

    Ok(PlanUp {
        pending,
        already_applied,
    })
}

/// Determine which applied migrations need reverting to reach `target`,
/// walking backwards from the newest applied migration.
pub fn plan_down(
    migrations: &[MigrationDefinition],
    states: &HashMap<String, MigrationState>,
    target: &str,
    allow_tags: &[String],
) -> Result<PlanDown, Error> {
    let mut pending = Vec::new();
    let mut seen_target = false;

    for migration in migrations.iter().rev() {
        let applied = states
            .get(&migration.migration_id)
            .is_some_and(|state| state.status == MigrationStatus::Applied);
        if !applied {
            continue;
        }
        pending.push(migration.clone());
        if migration.migration_id == target {
            seen_target = true;
            break;
        }
    }

    if !seen_target {
        return Err(Kind::TargetNotApplied(target.to_string()).into());
    }

    for migration in &pending {
        if !migration.is_reversible()? {
            return Err(Kind::Irreversible(migration.migration_id.clone()).into());
        }
        validate_tags(migration, allow_tags)?;
    }

    Ok(PlanDown { pending })
}
