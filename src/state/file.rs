// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use super::{decode_snapshot, encode_snapshot, StateSnapshot, StateStore};
use crate::error::{Result, StratumError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// State kept in a JSON file on local disk
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<StateSnapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                debug!("Loaded state from {}", self.path.display());
                decode_snapshot(&text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state at {}, starting empty", self.path.display());
                Ok(StateSnapshot::default())
            }
            Err(e) => Err(StratumError::State(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Write to a sibling temp file, then rename over the target
    async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let text = encode_snapshot(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, text).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        info!(
            "Saved state for {} resources to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}
