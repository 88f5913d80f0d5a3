//! Entry point for the pgmigrate command line tool.

mod cli;
mod commands;
mod confirm;

use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();

    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(Some("pgmigrate_core"), LevelFilter::Info)
        .filter_level(LevelFilter::Warn)
        .target(Target::Stderr)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if let Err(err) = commands::run(cli).await {
        log::error!("{err:?}");
        std::process::exit(1);
    }

    Ok(())
}
