use std::path::{Path, PathBuf};

use anyhow::Context;
use spa_common::SpaStatus;

/// Writes the latest status document for other local processes to poll.
#[derive(Debug, Clone)]
pub struct StatusExporter {
    path: PathBuf,
}

impl StatusExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temp file first and renames it over the target so
    /// readers never see a partial document.
    pub async fn publish(&self, status: &SpaStatus) -> anyhow::Result<()> {
        let payload = status.to_json().context("failed to encode status")?;
        let staging = self.path.with_extension("tmp");

        tokio::fs::write(&staging, payload)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
