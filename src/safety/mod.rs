//! Confirmation Gate for cloudrm-rs runs.
//!
//! - Dry-run mode: no prompt, nothing is destroyed anyway
//! - Force flag: no prompt
//! - Non-interactive environment without `--force`: treated as declined
//! - Otherwise: the user must type exactly "yes"
//!
//! A declined confirmation surfaces as [`CloudrmError::Cancelled`], which
//! maps to exit code 0.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::config::Config;
use crate::types::error::CloudrmError;

/// The only answer that lets a run proceed.
pub const CONFIRMATION_TOKEN: &str = "yes";

// ---------------------------------------------------------------------------
// PromptHandler trait (for testability)
// ---------------------------------------------------------------------------

/// Line-based prompt/response channel used by the [`SafetyChecker`].
///
/// [`StdioPromptHandler`] uses stdin/stdout. Tests provide their own
/// implementations to observe whether a prompt happened at all.
pub trait PromptHandler: Send + Sync {
    /// Show the prompt and read one line of input.
    ///
    /// `resource_types` are the types the run will process, in order.
    /// Returns the trimmed input.
    fn read_confirmation(&self, resource_types: &[&str]) -> Result<String>;

    /// Both stdin and stdout are attached to a terminal.
    fn is_interactive(&self) -> bool;
}

pub struct StdioPromptHandler;

impl PromptHandler for StdioPromptHandler {
    fn read_confirmation(&self, resource_types: &[&str]) -> Result<String> {
        println!(
            "Matching resources of these types will be destroyed: {}",
            resource_types.join(", ")
        );
        print!("Type '{CONFIRMATION_TOKEN}' to confirm deletion: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().lock().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }
}

// ---------------------------------------------------------------------------
// SafetyChecker
// ---------------------------------------------------------------------------

pub struct SafetyChecker {
    dry_run: bool,
    force: bool,
    prompt_handler: Box<dyn PromptHandler>,
}

impl SafetyChecker {
    /// Uses [`StdioPromptHandler`].
    pub fn new(config: &Config) -> Self {
        Self::with_prompt_handler(config, Box::new(StdioPromptHandler))
    }

    pub fn with_prompt_handler(config: &Config, prompt_handler: Box<dyn PromptHandler>) -> Self {
        Self {
            dry_run: config.dry_run,
            force: config.force,
            prompt_handler,
        }
    }

    /// Returns `Err(CloudrmError::Cancelled)` unless the run may proceed.
    pub fn check_before_deletion(&self, resource_types: &[&str]) -> Result<()> {
        if self.dry_run || self.force {
            return Ok(());
        }

        if !self.prompt_handler.is_interactive() {
            warn!("not running in a terminal, pass --force to delete without confirmation.");
            return Err(anyhow!(CloudrmError::Cancelled));
        }

        let input = self.prompt_handler.read_confirmation(resource_types)?;
        if input != CONFIRMATION_TOKEN {
            return Err(anyhow!(CloudrmError::Cancelled));
        }

        Ok(())
    }
}
