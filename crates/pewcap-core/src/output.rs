//! Destination for the fetched payload.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::transactions::TransactionBatch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Raw bytes to standard output
    Stdout,
    /// `<dir>/transactions_<end>_<start>.json`
    Directory(PathBuf),
}

impl OutputSink {
    pub fn new(to_stdout: bool, output_dir: &Path) -> Self {
        if to_stdout {
            OutputSink::Stdout
        } else {
            OutputSink::Directory(output_dir.to_path_buf())
        }
    }

    /// File the batch would be written to, if any
    pub fn path_for(&self, batch: &TransactionBatch) -> Option<PathBuf> {
        match self {
            OutputSink::Stdout => None,
            OutputSink::Directory(dir) => Some(dir.join(batch.window.file_name())),
        }
    }

    /// Write the batch; `stdout` is only touched for [`OutputSink::Stdout`].
    /// Returns the file written, if any.
    pub fn write(&self, batch: &TransactionBatch, stdout: &mut dyn Write) -> Result<Option<PathBuf>> {
        match self.path_for(batch) {
            None => {
                stdout
                    .write_all(batch.response.as_bytes())
                    .context("Failed to write transactions to stdout")?;
                stdout.flush().context("Failed to flush stdout")?;
                Ok(None)
            }
            Some(path) => {
                std::fs::write(&path, batch.response.as_bytes())
                    .with_context(|| format!("Failed to write transactions to {}", path.display()))?;
                let shown = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
                info!(path = %shown.display(), bytes = batch.response.len(), "Wrote transactions");
                Ok(Some(path))
            }
        }
    }
}
