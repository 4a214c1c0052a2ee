// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Loading multi-document YAML manifests.

use crate::error::{Result, StratumError};
use crate::resource::transform::{apply_all, Transform};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Parse every non-empty document of a YAML stream into JSON values
pub fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        match value {
            Value::Null => continue,
            Value::Object(_) => documents.push(value),
            other => {
                return Err(StratumError::Manifest(format!(
                    "expected a mapping, found {}",
                    other
                )))
            }
        }
    }
    Ok(documents)
}

/// Hex SHA-256 of raw file contents
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Load a manifest file into a `ConfigFile` payload.
///
/// The payload is `{source, sha256, manifests}` with `transforms` applied to
/// each document. When `pin` is given the file digest must match it.
pub fn load_config_file(path: &Path, pin: Option<&str>, transforms: &[Transform]) -> Result<Value> {
    let bytes = std::fs::read(path).map_err(|e| {
        StratumError::Manifest(format!("cannot read {}: {}", path.display(), e))
    })?;
    let digest = sha256_hex(&bytes);

    if let Some(expected) = pin {
        if !expected.eq_ignore_ascii_case(&digest) {
            return Err(StratumError::Manifest(format!(
                "{} has sha256 {}, expected {}",
                path.display(),
                digest,
                expected
            )));
        }
        debug!("{} matches pinned digest", path.display());
    }

    let text = String::from_utf8(bytes)
        .map_err(|e| StratumError::Manifest(format!("{} is not UTF-8: {}", path.display(), e)))?;
    let manifests: Vec<Value> = parse_documents(&text)?
        .into_iter()
        .map(|m| apply_all(transforms, m))
        .collect();
    info!("Loaded {} documents from {}", manifests.len(), path.display());

    Ok(json!({
        "source": path.display().to_string(),
        "sha256": digest,
        "manifests": manifests,
    }))
}
