// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Last-applied state, persisted between runs.
//!
//! Only fingerprints and provisioner outputs are stored, never payloads. A
//! fingerprint is an unsalted SHA-256 of the payload, so a reader of the state
//! can test guesses of low-entropy secret values against it. Access to the
//! state object should be restricted like access to the secrets themselves.

pub mod configmap;
pub mod file;

use crate::error::{Result, StratumError};
use crate::reconcile::Fingerprint;
use crate::report::{ApplyReport, Outcome};
use crate::resource::ResourceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub use configmap::ConfigMapStateStore;
pub use file::FileStateStore;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub outputs: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, StateEntry>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            resources: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn get(&self, id: &ResourceId) -> Option<&StateEntry> {
        self.resources.get(id)
    }

    pub fn insert(&mut self, id: ResourceId, entry: StateEntry) {
        self.resources.insert(id, entry);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Fold a run's results into the snapshot.
    ///
    /// Applied resources take their new fingerprint and outputs. Resources that
    /// failed, were blocked or were not attempted keep their previous entry.
    /// Entries for identities that are no longer declared are dropped.
    pub fn record(&mut self, report: &ApplyReport) {
        self.resources
            .retain(|id, _| report.results().iter().any(|r| &r.id == id));

        for result in report.results() {
            if let Outcome::Applied {
                fingerprint,
                outputs,
                ..
            } = &result.outcome
            {
                self.resources.insert(
                    result.id.clone(),
                    StateEntry {
                        fingerprint: fingerprint.clone(),
                        outputs: outputs.clone(),
                    },
                );
            }
        }
    }
}

pub(crate) fn decode_snapshot(text: &str) -> Result<StateSnapshot> {
    let snapshot: StateSnapshot = serde_json::from_str(text)?;
    if snapshot.version > STATE_VERSION {
        return Err(StratumError::State(format!(
            "state version {} is newer than supported version {}",
            snapshot.version, STATE_VERSION
        )));
    }
    Ok(snapshot)
}

pub(crate) fn encode_snapshot(snapshot: &StateSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Durable storage for the last applied state
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<StateSnapshot>;
    async fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
}

/// Process-local store, used for previews and tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<StateSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<StateSnapshot> {
        Ok(self
            .snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if let Ok(mut current) = self.snapshot.lock() {
            *current = snapshot.clone();
        }
        Ok(())
    }
}
