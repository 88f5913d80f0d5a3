//! Presentation layer: turns [`pgmigrate_core`] results into the terminal
//! output described for each subcommand, and owns the top-level dispatch.

use anyhow::{Context, Result};

use pgmigrate_core::config::{self, ProfileOverrides};
use pgmigrate_core::engine::Engine;
use pgmigrate_core::model::MigrationStatus;

use crate::cli::{Cli, Command};
use crate::confirm::TerminalConfirm;

const APP_NAME: &str = "pgmigrate";

pub async fn run(cli: Cli) -> Result<()> {
    let global_config = config::load_config(&cli.config)
        .with_context(|| format!("could not load config file {}", cli.config.display()))?;

    let overrides = ProfileOverrides {
        dsn: cli.dsn.clone(),
        log_dir: cli.log_dir.clone(),
        migrations_dir: cli.migrations_dir.clone(),
        timeout_sec: cli.timeout_sec,
        interactive: cli.non_interactive.then_some(false),
        confirm_prod: None,
    };
    let profile = config::resolve_profile(&global_config, cli.env.as_deref(), overrides)
        .context("could not resolve profile")?;

    let mut engine = Engine::connect(profile, APP_NAME, Box::new(TerminalConfirm), cli.confirm_prod)
        .await
        .context("could not initialize migration engine")?;

    match cli.command {
        Command::Status => status(&engine).await,
        Command::Plan { to } => plan(&engine, to.as_deref()).await,
        Command::Up { to } => up(&mut engine, to.as_deref(), cli.non_interactive).await,
        Command::Down { to } => down(&mut engine, &to, cli.non_interactive).await,
        Command::Verify { latest, id } => verify(&engine, latest, id.as_deref()).await,
        Command::Repair { accept_checksum, id } => repair(&engine, &id, accept_checksum).await,
        Command::Retry { id, accept_checksum, force } => {
            retry(&mut engine, &id, accept_checksum, force, cli.non_interactive).await
        }
        Command::ResetFailed { id, delete } => reset_failed(&mut engine, &id, delete, cli.non_interactive).await,
    }
}

async fn status(engine: &Engine) -> Result<()> {
    let (migrations, states) = engine.status().await?;

    let mut applied = 0;
    let mut failed_ids = Vec::new();
    let mut pending_ids = Vec::new();

    for migration in migrations {
        match states.get(&migration.migration_id).map(|s| s.status) {
            Some(MigrationStatus::Applied) => applied += 1,
            Some(MigrationStatus::Failed) => failed_ids.push(migration.migration_id.clone()),
            Some(MigrationStatus::Running) => failed_ids.push(format!("{} (running)", migration.migration_id)),
            _ => pending_ids.push(migration.migration_id.clone()),
        }
    }

    println!("{} total, {} applied, {} pending, {} failed", migrations.len(), applied, pending_ids.len(), failed_ids.len());
    if !pending_ids.is_empty() {
        println!("pending:");
        for id in &pending_ids {
            println!("  {id}");
        }
    }
    if !failed_ids.is_empty() {
        println!("failed:");
        for id in &failed_ids {
            println!("  {id}");
        }
    }
    Ok(())
}

async fn plan(engine: &Engine, to: Option<&str>) -> Result<()> {
    let plan = engine.plan_up(to).await?;
    if plan.pending.is_empty() {
        println!("nothing to do");
        return Ok(());
    }
    println!("pending migrations:");
    for migration in &plan.pending {
        let reversible = migration.is_reversible().unwrap_or(false);
        let tags = if migration.meta.tags.is_empty() {
            String::new()
        } else {
            format!(" tags=[{}]", migration.meta.tags.join(","))
        };
        println!(
            "  {} reversible={}{}",
            migration.migration_id, reversible, tags
        );
    }
    Ok(())
}

async fn up(engine: &mut Engine, to: Option<&str>, non_interactive: bool) -> Result<()> {
    let applied = engine.apply(to, non_interactive).await?;
    if applied == 0 {
        println!("nothing to do");
    } else {
        println!("applied {applied} migration(s)");
    }
    Ok(())
}

async fn down(engine: &mut Engine, to: &str, non_interactive: bool) -> Result<()> {
    let reverted = engine.rollback(to, non_interactive).await?;
    if reverted == 0 {
        println!("nothing to roll back");
    } else {
        println!("reverted {reverted} migration(s)");
    }
    Ok(())
}

async fn verify(engine: &Engine, latest: bool, id: Option<&str>) -> Result<()> {
    let results = engine.verify(latest, id).await?;
    let mut any_failed = false;
    for result in &results {
        if result.ok {
            println!("{}: ok", result.migration_id);
        } else {
            any_failed = true;
            let details = result.details.clone().unwrap_or_default();
            println!("{}: FAILED ({details})", result.migration_id);
        }
    }
    if any_failed {
        anyhow::bail!("one or more verifications failed");
    }
    Ok(())
}

async fn repair(engine: &Engine, id: &str, accept_checksum: bool) -> Result<()> {
    engine.repair(id, accept_checksum).await?;
    println!("repaired checksum for {id}");
    Ok(())
}

async fn retry(engine: &mut Engine, id: &str, accept_checksum: bool, force: bool, non_interactive: bool) -> Result<()> {
    engine.retry(id, accept_checksum, force, non_interactive).await?;
    println!("retried {id}");
    Ok(())
}

async fn reset_failed(engine: &mut Engine, id: &str, delete: bool, non_interactive: bool) -> Result<()> {
    engine.reset_failed(id, delete, non_interactive).await?;
    if delete {
        println!("removed migration {id} from schema_migrations");
    } else {
        println!("reset migration {id} status to reverted");
    }
    Ok(())
}
