use std::collections::BTreeSet;

use deskexec_config::CommandsConfig;
use deskexec_config::constants::commands::FORBIDDEN_CHARACTERS;

use crate::error::{ExecError, ExecResult};

/// A command line that passed validation, split into its base command and
/// arguments. No shell ever sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    pub base: String,
    pub args: Vec<String>,
}

pub trait CommandPolicy: Send + Sync {
    fn validate(&self, input: &str) -> ExecResult<ValidatedCommand>;
}

/// Accepts any non-empty command. Only useful for tests and dry runs.
pub struct AllowAllPolicy;

impl CommandPolicy for AllowAllPolicy {
    fn validate(&self, input: &str) -> ExecResult<ValidatedCommand> {
        split_command(input)
    }
}

/// Rejects shell metacharacters and any base command outside a fixed set.
#[derive(Debug, Clone)]
pub struct AllowListPolicy {
    allowed: BTreeSet<String>,
}

impl AllowListPolicy {
    pub fn new(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CommandsConfig) -> Self {
        Self::new(config.allow_list.iter().cloned())
    }

    pub fn is_allowed(&self, base: &str) -> bool {
        self.allowed.contains(base)
    }

    pub fn allowed_commands(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl CommandPolicy for AllowListPolicy {
    fn validate(&self, input: &str) -> ExecResult<ValidatedCommand> {
        if input.contains(FORBIDDEN_CHARACTERS) {
            let listed = FORBIDDEN_CHARACTERS
                .iter()
                .map(char::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            return Err(ExecError::invalid_command(format!(
                "Command contains forbidden characters ({listed})"
            )));
        }

        let command = split_command(input)?;
        if !self.is_allowed(&command.base) {
            let allowed = self.allowed_commands().collect::<Vec<_>>().join(", ");
            return Err(ExecError::invalid_command(format!(
                "\"{}\" is not permitted. Allowed commands: {allowed}",
                command.base
            )));
        }

        Ok(command)
    }
}

fn split_command(input: &str) -> ExecResult<ValidatedCommand> {
    let mut tokens = input.split_whitespace().map(str::to_owned);
    let Some(base) = tokens.next() else {
        return Err(ExecError::invalid_command("Command is required"));
    };
    Ok(ValidatedCommand {
        base,
        args: tokens.collect(),
    })
}
