use std::io::IsTerminal;

use dialoguer::Select;
use patchup_api::{ApplyMode, Resolution};
use patchup_backend_api::{BackendError, BackendResult, OperatorPrompt};

const CHOICES: [&str; 2] = ["[c] resolved conflicts, continue", "[a] abort"];

/// Interactive continue/abort selection on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl OperatorPrompt for TerminalPrompt {
    fn choose(&self, mode: ApplyMode, title: &str) -> BackendResult<Resolution> {
        if !std::io::stdin().is_terminal() {
            return Err(BackendError::Prompt {
                message: format!("{mode} apply needs a decision but stdin is not a terminal"),
            });
        }

        let selection = Select::new()
            .with_prompt(format!("{title} ({mode})"))
            .items(&CHOICES)
            .default(0)
            .interact()
            .map_err(|err| BackendError::Prompt {
                message: err.to_string(),
            })?;

        Ok(resolution_for(selection))
    }
}

fn resolution_for(selection: usize) -> Resolution {
    if selection == 0 {
        Resolution::Continue
    } else {
        Resolution::Abort
    }
}
