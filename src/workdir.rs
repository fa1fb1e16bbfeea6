//! Process-wide scratch directory.
//!
//! Every artifact of a run (reference builds, probe result directories,
//! synthesized marker packages, extracted file contents) lives under one
//! temporary directory, removed on exit unless the user asked to keep it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

pub struct Workdir {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl Workdir {
    /// Create the scratch directory. With `keep` set it survives drop.
    pub fn create(keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("rpmsift-")
            .tempdir()
            .context("failed to create work directory")?;
        let path = dir.path().to_path_buf();
        info!("work directory: {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if self.keep {
            if let Some(dir) = self.dir.take() {
                let kept = dir.keep();
                info!("keeping work directory: {}", kept.display());
            }
        }
    }
}
