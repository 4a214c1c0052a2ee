// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pure manifest transforms applied while loading raw manifest files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    /// Force `metadata.namespace` on every document
    SetNamespace(String),
}

impl Transform {
    /// Apply this transform, returning the rewritten manifest
    pub fn apply(&self, manifest: Value) -> Value {
        match self {
            Transform::SetNamespace(namespace) => set_namespace(manifest, namespace),
        }
    }
}

/// Apply transforms in order
pub fn apply_all(transforms: &[Transform], manifest: Value) -> Value {
    transforms.iter().fold(manifest, |m, t| t.apply(m))
}

fn set_namespace(manifest: Value, namespace: &str) -> Value {
    let Value::Object(mut object) = manifest else {
        return manifest;
    };

    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(metadata) = metadata {
        metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    Value::Object(object)
}
