use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};

/// Operator approval before anything is submitted.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, message: &str) -> Result<bool>;
}

/// Asks on the terminal; only `y` or `yes` proceeds.
pub struct Prompt;

#[async_trait]
impl ConfirmationGate for Prompt {
    async fn confirm(&self, message: &str) -> Result<bool> {
        let mut stdout = tokio::io::stdout();
        let prompt = format!("{message} y/N: ");
        let prompt_err = |e: std::io::Error| Error::Config(format!("cannot prompt: {e}"));
        stdout.write_all(prompt.as_bytes()).await.map_err(prompt_err)?;
        stdout.flush().await.map_err(prompt_err)?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await
            .map_err(|e| Error::Config(format!("cannot read answer: {e}")))?;
        Ok(is_affirmative(&answer))
    }
}

/// Approves everything, for `--no-prompt` runs.
pub struct NoPrompt;

#[async_trait]
impl ConfirmationGate for NoPrompt {
    async fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Fails the whole run with [`Error::UserAbort`] unless approved.
pub async fn require_approval(gate: &dyn ConfirmationGate, message: &str) -> Result<()> {
    if gate.confirm(message).await? {
        Ok(())
    } else {
        Err(Error::UserAbort)
    }
}
