//! User prompt utilities for interactive confirmation

use anyhow::Result;
use dialoguer::Confirm;

/// Ask user for yes/no confirmation; `assume_yes` skips the prompt
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }

    let result = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(result)
}
