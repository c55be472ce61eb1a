// src/system/prompt.rs

use dialoguer::{Select, theme::ColorfulTheme};
use thiserror::Error;

/// Errors raised while asking the operator.
#[derive(Error, Debug)]
pub enum PromptError {
    /// The terminal prompt failed.
    #[error("Prompt failed: {0}")]
    Dialoguer(#[from] dialoguer::Error),
}

/// Result alias for prompts.
pub type PromptResult<T> = Result<T, PromptError>;

/// Operator decision for a template whose remote copy changed since the last upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAnswer {
    /// Upload and replace the remote copy.
    Overwrite,
    /// Show the difference, then ask again.
    Diff,
    /// Leave the remote copy alone.
    Skip,
}

impl ConflictAnswer {
    const CHOICES: [Self; 3] = [Self::Overwrite, Self::Diff, Self::Skip];

    fn label(self) -> &'static str {
        match self {
            Self::Overwrite => "yes  - overwrite",
            Self::Diff => "diff - show diff",
            Self::Skip => "no   - skip",
        }
    }
}

/// Decides what happens to a remotely changed template.
pub trait ConflictPrompt {
    /// Asks what to do with `template`. Asked again after each `Diff`.
    fn ask(&self, template: &str) -> PromptResult<ConflictAnswer>;
}

/// Interactive prompt on the terminal. Defaults to skipping.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompt;

impl ConflictPrompt for DialoguerPrompt {
    fn ask(&self, template: &str) -> PromptResult<ConflictAnswer> {
        let labels: Vec<&str> = ConflictAnswer::CHOICES.iter().map(|c| c.label()).collect();
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("\"{}\" changed remotely. Overwrite, show diff, or skip?", template))
            .items(&labels)
            .default(2)
            .interact()?;
        Ok(ConflictAnswer::CHOICES
            .get(selection)
            .copied()
            .unwrap_or(ConflictAnswer::Skip))
    }
}

/// Gives the same answer every time (`--yes`, non-interactive runs).
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub ConflictAnswer);

impl ConflictPrompt for FixedAnswer {
    fn ask(&self, template: &str) -> PromptResult<ConflictAnswer> {
        log::debug!("Answering {:?} for '{}'", self.0, template);
        Ok(self.0)
    }
}
