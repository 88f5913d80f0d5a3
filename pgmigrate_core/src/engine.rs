//! Orchestrates loader, planner, store and executor into the operations the
//! CLI exposes: status, plan, apply, rollback, verify, repair, retry, and
//! reset-failed.
//!
//! Ported from `original_source/runner.py`'s `MigrationRunner` class as a
//! whole: the confirmation gate (`_confirm_action`/`_confirm_execution`),
//! the `_skip_next_confirmation` one-shot flag `retry` uses to avoid asking
//! twice, and the high-level operations all live here, matching the
//! original's single god-object shape rather than splitting each operation
//! into its own type.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_postgres::NoTls;

use crate::config::ProfileConfig;
use crate::error::{Error, Kind};
use crate::executor;
use crate::loader;
use crate::model::{MigrationDefinition, MigrationState, MigrationStatus, PlanDown, PlanUp, VerifyResult};
use crate::planner;
use crate::store::Store;

/// User confirmation, abstracted so the engine's control flow can be tested
/// without a terminal. The CLI's default implementation prompts on stdin
/// via `dialoguer`.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Ask a yes/no question. `Ok(false)` means the user declined (not an
    /// error); callers turn that into [`Kind::UserAborted`].
    async fn confirm_yes_no(&self, prompt: &str) -> Result<bool, Error>;

    /// Ask the user to type `expected` back verbatim, for the
    /// `confirm_prod` guard. `Ok(false)` means what was typed didn't match.
    async fn confirm_type_value(&self, prompt: &str, expected: &str) -> Result<bool, Error>;
}

/// A [`ConfirmPrompt`] that always answers yes, for non-interactive
/// automation and tests.
pub struct AutoConfirm;

#[async_trait]
impl ConfirmPrompt for AutoConfirm {
    async fn confirm_yes_no(&self, _prompt: &str) -> Result<bool, Error> {
        Ok(true)
    }

    async fn confirm_type_value(&self, _prompt: &str, _expected: &str) -> Result<bool, Error> {
        Ok(true)
    }
}

/// Orchestrates one profile's worth of migrations against one open
/// connection.
pub struct Engine {
    profile: ProfileConfig,
    migrations: Vec<MigrationDefinition>,
    store: Store,
    confirm: Box<dyn ConfirmPrompt>,
    /// Set by the CLI's `--confirm-prod` flag: a standing declaration that
    /// the operator has already confirmed this run out of band, distinct
    /// from `profile.confirm_prod` which marks the profile itself as
    /// requiring confirmation.
    confirm_override: bool,
    skip_next_confirmation: bool,
}

impl Engine {
    /// Connect to `profile.dsn`, load migrations from `profile.migrations_dir`,
    /// and prepare the bookkeeping table.
    pub async fn connect(
        profile: ProfileConfig,
        app_name: &str,
        confirm: Box<dyn ConfirmPrompt>,
        confirm_override: bool,
    ) -> Result<Engine, Error> {
        let migrations = loader::load_migrations(&profile.migrations_dir)?;
        loader::require_sequential(&migrations)?;

        let (client, connection) = tokio_postgres::connect(&profile.dsn, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::error!("postgres connection terminated: {err}");
            }
        });
        client
            .batch_execute(&format!("SET application_name = '{app_name}'"))
            .await?;

        let store = Store::new(client, profile.schema.clone());
        store.ensure_schema().await?;

        Ok(Engine {
            profile,
            migrations,
            store,
            confirm,
            confirm_override,
            skip_next_confirmation: false,
        })
    }

    fn find_migration(&self, migration_id: &str) -> Result<&MigrationDefinition, Error> {
        self.migrations
            .iter()
            .find(|m| m.migration_id == migration_id)
            .ok_or_else(|| Kind::UnknownMigration(migration_id.to_string()).into())
    }

    fn states_by_id(states: Vec<MigrationState>) -> HashMap<String, MigrationState> {
        states.into_iter().map(|s| (s.migration_id.clone(), s)).collect()
    }

    /// All migrations on disk plus their tracked state, for `pgmigrate status`.
    pub async fn status(&self) -> Result<(&[MigrationDefinition], HashMap<String, MigrationState>), Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        Ok((&self.migrations, states))
    }

    pub async fn plan_up(&self, target: Option<&str>) -> Result<PlanUp, Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        planner::plan_up(&self.migrations, &states, target, &self.profile.allow_tags)
    }

    pub async fn plan_down(&self, target: &str) -> Result<PlanDown, Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        planner::plan_down(&self.migrations, &states, target, &self.profile.allow_tags)
    }

    /// Apply every pending migration up to (and including) `target`, or all
    /// pending migrations if `target` is `None`.
    pub async fn apply(&mut self, target: Option<&str>, non_interactive: bool) -> Result<usize, Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        let plan = planner::plan_up(&self.migrations, &states, target, &self.profile.allow_tags)?;
        if plan.pending.is_empty() {
            return Ok(0);
        }

        self.confirm_execution(plan.pending.len(), "up", non_interactive).await?;

        let user = self.store.current_user().await?;
        if !self.store.try_advisory_lock(self.profile.lock_key).await? {
            return Err(Kind::LockHeld(self.profile.lock_key).into());
        }
        let result = async {
            for migration in &plan.pending {
                executor::apply_one(
                    &mut self.store,
                    migration,
                    &user,
                    self.profile.timeout_sec,
                    &self.profile.log_dir,
                )
                .await?;
            }
            Ok(plan.pending.len())
        }
        .await;
        self.store.advisory_unlock(self.profile.lock_key).await?;
        result
    }

    /// Revert every applied migration down to (and including) `target`.
    pub async fn rollback(&mut self, target: &str, non_interactive: bool) -> Result<usize, Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        let plan = planner::plan_down(&self.migrations, &states, target, &self.profile.allow_tags)?;
        if plan.pending.is_empty() {
            return Ok(0);
        }

        self.confirm_execution(plan.pending.len(), "down", non_interactive).await?;

        let user = self.store.current_user().await?;
        if !self.store.try_advisory_lock(self.profile.lock_key).await? {
            return Err(Kind::LockHeld(self.profile.lock_key).into());
        }
        let result = async {
            for migration in &plan.pending {
                executor::revert_one(
                    &self.store,
                    migration,
                    &user,
                    self.profile.timeout_sec,
                    &self.profile.log_dir,
                )
                .await?;
            }
            Ok(plan.pending.len())
        }
        .await;
        self.store.advisory_unlock(self.profile.lock_key).await?;
        result
    }

    /// Run `verify.sql` for the selected migrations: either the most
    /// recently applied one (`latest`), a specific `migration_id`, or every
    /// migration that carries a `verify.sql`.
    pub async fn verify(&self, latest: bool, migration_id: Option<&str>) -> Result<Vec<VerifyResult>, Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);

        let targets: Vec<&MigrationDefinition> = if latest {
            let applied: Vec<&MigrationDefinition> = self
                .migrations
                .iter()
                .filter(|m| states.get(&m.migration_id).map(|s| s.status) == Some(MigrationStatus::Applied))
                .collect();
            let last = applied.last().copied().ok_or_else(|| {
                Error::from(Kind::Format("no applied migrations to verify".into()))
            })?;
            if last.verify_sql.is_some() {
                vec![last]
            } else {
                Vec::new()
            }
        } else if let Some(id) = migration_id {
            let migration = self.find_migration(id)?;
            if migration.verify_sql.is_none() {
                return Err(Kind::Format(format!("migration {id} has no verify.sql")).into());
            }
            vec![migration]
        } else {
            self.migrations.iter().filter(|m| m.verify_sql.is_some()).collect()
        };

        if targets.is_empty() {
            return Err(Kind::Format("no migrations found to verify".into()).into());
        }

        let mut results = Vec::with_capacity(targets.len());
        for migration in targets {
            results.push(executor::run_verify(&self.store, migration, self.profile.timeout_sec).await);
        }
        Ok(results)
    }

    /// Overwrite the stored checksum for `migration_id` with the one
    /// computed from the file on disk. Requires `accept` (the
    /// `--accept-checksum` flag) to guard against accidental repairs.
    pub async fn repair(&self, migration_id: &str, accept: bool) -> Result<(), Error> {
        if !accept {
            return Err(Kind::Config("checksum repair requires --accept-checksum".into()).into());
        }
        let migration = self.find_migration(migration_id)?;
        self.store.repair_checksum(migration_id, &migration.checksum).await
    }

    /// Reset a `running`/`failed` migration back to `reverted` and re-apply
    /// it, skipping the confirmation prompt that `apply` would otherwise
    /// show a second time.
    pub async fn retry(
        &mut self,
        migration_id: &str,
        accept_checksum: bool,
        force: bool,
        non_interactive: bool,
    ) -> Result<(), Error> {
        let migration = self.find_migration(migration_id)?.clone();
        let states = Self::states_by_id(self.store.fetch_states().await?);
        let state = states
            .get(migration_id)
            .ok_or_else(|| Kind::NotTracked(migration_id.to_string()))?;

        if state.status == MigrationStatus::Applied {
            return Ok(());
        }
        if state.status == MigrationStatus::Running && !force {
            return Err(Kind::InProgress(migration_id.to_string()).into());
        }
        if state.checksum != migration.checksum {
            if !accept_checksum {
                return Err(Kind::ChecksumMismatch(migration_id.to_string()).into());
            }
            self.store.repair_checksum(migration_id, &migration.checksum).await?;
        }

        let message = format!(
            "reset migration {migration_id} to retry? this marks it reverted and re-applies pending migrations up to it"
        );
        self.confirm_action(&message, non_interactive, &format!("reset {migration_id} and retry"))
            .await?;
        self.store
            .reset_to(migration_id, MigrationStatus::Reverted)
            .await?;

        let previous_skip = self.skip_next_confirmation;
        self.skip_next_confirmation = true;
        let result = self.apply(Some(migration_id), non_interactive).await;
        self.skip_next_confirmation = previous_skip;
        result.map(|_| ())
    }

    /// Clear a failed/running bookkeeping row without running any SQL:
    /// either reset it to `reverted` or delete the row outright.
    pub async fn reset_failed(&mut self, migration_id: &str, delete: bool, non_interactive: bool) -> Result<(), Error> {
        let states = Self::states_by_id(self.store.fetch_states().await?);
        if !states.contains_key(migration_id) {
            return Err(Kind::NotTracked(migration_id.to_string()).into());
        }

        let action = if delete { "delete" } else { "reset" };
        let message = format!("about to {action} the failure record for {migration_id}. This runs no migrations. Continue?");
        let description = if delete { "delete the record".to_string() } else { "reset the failed status".to_string() };
        self.confirm_action(&message, non_interactive, &description).await?;

        if delete {
            self.store.delete_state(migration_id).await
        } else {
            self.store
                .reset_to(migration_id, MigrationStatus::Reverted)
                .await
        }
    }

    async fn confirm_execution(&mut self, count: usize, direction: &str, non_interactive: bool) -> Result<(), Error> {
        let env = self
            .profile
            .app_env
            .clone()
            .unwrap_or_else(|| self.profile.name.clone());
        let message = format!("about to run {count} migration(s) {direction} against environment {env}");
        let description = format!("apply {count} migration(s) ({direction})");
        self.confirm_action(&message, non_interactive, &description).await
    }

    /// The confirmation gate. Ordering mirrors the original exactly: a
    /// pending skip wins over everything else, then a pre-approved prod
    /// override, then the non-interactive/typed-schema-name prod guard,
    /// then the plain yes/no prompt.
    async fn confirm_action(&mut self, message: &str, non_interactive: bool, description: &str) -> Result<(), Error> {
        if self.skip_next_confirmation {
            self.skip_next_confirmation = false;
            return Ok(());
        }
        if self.profile.confirm_prod && self.confirm_override {
            return Ok(());
        }
        if non_interactive || !self.profile.interactive {
            if self.profile.confirm_prod && !self.confirm_override {
                return Err(Kind::ProdConfirmationRequired.into());
            }
            return Ok(());
        }
        if self.profile.confirm_prod {
            let prompt = format!("{message} Type the schema name to confirm: ");
            let matched = self.confirm.confirm_type_value(&prompt, &self.profile.schema).await?;
            if !matched {
                return Err(Kind::ConfirmationRejected.into());
            }
            return Ok(());
        }
        let prompt = format!("{description}? [y/N]: ");
        if !self.confirm.confirm_yes_no(&prompt).await? {
            return Err(Kind::UserAborted.into());
        }
        Ok(())
    }
}
