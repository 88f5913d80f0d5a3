//! The interactive [`ConfirmPrompt`] implementation. `dialoguer`'s prompts
//! are blocking, so each call is dispatched to a blocking thread and the
//! result awaited — matches the profile from `examples/lacodda-kasl`, which
//! drives `dialoguer` the same way from an async CLI.

use anyhow::Context;
use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};

use pgmigrate_core::{ConfirmPrompt, Error, Kind};

pub struct TerminalConfirm;

#[async_trait]
impl ConfirmPrompt for TerminalConfirm {
    async fn confirm_yes_no(&self, prompt: &str) -> Result<bool, Error> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await
        .context("confirmation prompt panicked")
        .map_err(prompt_error)?
        .context("failed to read confirmation")
        .map_err(prompt_error)
    }

    async fn confirm_type_value(&self, prompt: &str, expected: &str) -> Result<bool, Error> {
        let prompt = prompt.to_string();
        let expected = expected.to_string();
        let typed: String = tokio::task::spawn_blocking(move || {
            Input::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .context("confirmation prompt panicked")
        .map_err(prompt_error)?
        .context("failed to read confirmation")
        .map_err(prompt_error)?;
        Ok(typed.trim() == expected)
    }
}

fn prompt_error(err: anyhow::Error) -> Error {
    Kind::Config(err.to_string()).into()
}
