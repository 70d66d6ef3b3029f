use std::io::IsTerminal;

use dialoguer::Input;
use migrator_common::{Error, Result};
use migrator_core::Confirm;
use tracing::warn;

/// Asks on the terminal whether to create a migration whose name is taken.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm_duplicate(&mut self, existing: &str) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            warn!("found duplicate migration '{existing}' and stdin is not a terminal, stopping");
            return Ok(false);
        }

        let answer: String = Input::new()
            .with_prompt(format!("Found duplicate migration '{existing}', continue? Y/n"))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(accepts(&answer))
    }
}

// Only an explicit capital Y goes ahead.
fn accepts(answer: &str) -> bool {
    answer.trim() == "Y"
}

#[cfg(test)]
mod tests {
    use super::accepts;

    #[test]
    fn only_capital_y_accepts() {
        assert!(accepts("Y"));
        assert!(accepts(" Y\n"));
        for answer in ["", "y", "n", "yes", "N"] {
            assert!(!accepts(answer), "{answer:?} should decline");
        }
    }
}
