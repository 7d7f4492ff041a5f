//! Markdown-to-document conversion.

use std::path::Path;

use async_trait::async_trait;
use seoforge_shared::{Result, SeoforgeError};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Converts a Markdown file into a downloadable document.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `input` to a document at `output`, overwriting it.
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Shells out to a pandoc-compatible executable (`-f markdown -t docx`).
#[derive(Debug, Clone)]
pub struct PandocConverter {
    command: String,
}

impl PandocConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    #[instrument(skip(self), fields(command = %self.command))]
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(SeoforgeError::Conversion(format!(
                "input {} does not exist",
                input.display()
            )));
        }

        let result = Command::new(&self.command)
            .arg(input)
            .args(["-f", "markdown", "-t", "docx", "-o"])
            .arg(output)
            .output()
            .await
            .map_err(|e| {
                SeoforgeError::Conversion(format!("failed to run `{}`: {e}", self.command))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SeoforgeError::Conversion(format!(
                "`{}` exited with {}: {}",
                self.command,
                result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(SeoforgeError::Conversion(format!(
                "`{}` produced no output at {}",
                self.command,
                output.display()
            )));
        }

        debug!(output = %output.display(), "document written");
        Ok(())
    }
}
