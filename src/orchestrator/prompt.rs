use std::io::{BufRead, Write};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, WardenError};

pub const CONFIRMATION_QUESTION: &str = "Do you have explicit permission to run destructive tests? (y/N): ";

/// Source of the operator's answer to the destructive-phase question.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Raw answer text. Errors and timeouts count as "no".
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Only a trimmed, case-insensitive `y` approves.
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Reads one line from stdin on a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct StdinPrompt {
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl StdinPrompt {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        let question = question.to_string();
        let read = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut stderr = std::io::stderr();
            stderr.write_all(question.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        });

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| WardenError::Internal(format!("no answer within {}s", limit.as_secs())))?,
            None => read.await,
        };
        joined.map_err(|e| WardenError::Internal(format!("prompt task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_y_is_affirmative() {
        for yes in ["y", "Y", " y\n", "\ty "] {
            assert!(is_affirmative(yes), "{yes:?}");
        }
        for no in ["", "n", "yes", "N", "yy", "\n"] {
            assert!(!is_affirmative(no), "{no:?}");
        }
    }
}
