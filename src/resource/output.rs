// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed references from one descriptor's payload to another descriptor's outputs.
//!
//! A reference is a JSON object of the form
//! `{"$output": {"resource": "<id>", "pointer": "/json/pointer"}}` placed anywhere
//! inside a payload. The executor replaces it with the value found at `pointer`
//! in the outputs reported for `resource`, which must be a declared dependency.

use super::ResourceId;
use crate::provision::ProvisionError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key marking an output reference object
pub const OUTPUT_KEY: &str = "$output";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub pointer: String,
}

impl OutputRef {
    /// Parse a reference object, returning None for any other value
    fn parse(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        serde_json::from_value(obj.get(OUTPUT_KEY)?.clone()).ok()
    }
}

/// Build a reference to `pointer` in the outputs of `resource`
pub fn output_ref(resource: impl Into<ResourceId>, pointer: &str) -> Value {
    json!({
        OUTPUT_KEY: {
            "resource": resource.into(),
            "pointer": pointer,
        }
    })
}

/// All producers referenced anywhere in a payload, in first-seen order
pub fn referenced_producers(payload: &Value) -> Vec<ResourceId> {
    let mut producers = Vec::new();
    collect_producers(payload, &mut producers);
    producers
}

fn collect_producers(value: &Value, producers: &mut Vec<ResourceId>) {
    if let Some(reference) = OutputRef::parse(value) {
        if !producers.contains(&reference.resource) {
            producers.push(reference.resource);
        }
        return;
    }

    match value {
        Value::Object(map) => map.values().for_each(|v| collect_producers(v, producers)),
        Value::Array(items) => items.iter().for_each(|v| collect_producers(v, producers)),
        _ => {}
    }
}

/// Return a copy of `payload` with every output reference substituted.
///
/// `outputs` yields the outputs of a completed producer, or None when the producer
/// has not completed successfully.
pub fn resolve_outputs<'a, F>(payload: &Value, outputs: F) -> Result<Value, ProvisionError>
where
    F: Fn(&ResourceId) -> Option<&'a Value> + Copy,
{
    if let Some(reference) = OutputRef::parse(payload) {
        let unresolved = || ProvisionError::UnresolvedOutput {
            producer: reference.resource.clone(),
            pointer: reference.pointer.clone(),
        };
        let produced = outputs(&reference.resource).ok_or_else(unresolved)?;
        return produced.pointer(&reference.pointer).cloned().ok_or_else(unresolved);
    }

    match payload {
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_outputs(value, outputs)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_outputs(v, outputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
