// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource descriptors: immutable values describing one desired cluster object.

pub mod output;
pub mod transform;

use crate::error::{Result, StratumError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub use output::{output_ref, referenced_producers, resolve_outputs, OutputRef};
pub use transform::Transform;

/// Logical name of a resource, unique within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The kind of object a descriptor provisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Namespace,
    Secret,
    HelmRelease,
    CustomResource,
    ConfigFile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Secret => "secret",
            ResourceKind::HelmRelease => "helm-release",
            ResourceKind::CustomResource => "custom-resource",
            ResourceKind::ConfigFile => "config-file",
        };
        f.write_str(name)
    }
}

/// One desired external object together with the identities it depends on.
///
/// Fields are private; a descriptor never changes after it has been built.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    id: ResourceId,
    kind: ResourceKind,
    payload: Value,
    depends_on: Vec<ResourceId>,
}

impl Descriptor {
    pub fn new(id: impl Into<ResourceId>, kind: ResourceKind, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            depends_on: Vec::new(),
        }
    }

    /// Add dependencies; repeated identities are kept once, in first-seen order
    pub fn depends_on<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn dependencies(&self) -> &[ResourceId] {
        &self.depends_on
    }
}

/// Descriptors for a single run, kept in declaration order
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    descriptors: Vec<Descriptor>,
    index: HashMap<ResourceId, usize>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting empty or already used identities
    pub fn insert(&mut self, descriptor: Descriptor) -> Result<()> {
        if descriptor.id.as_str().trim().is_empty() {
            return Err(StratumError::InvalidIdentity(descriptor.id.0.clone()));
        }
        if self.index.contains_key(&descriptor.id) {
            return Err(StratumError::DuplicateIdentity(descriptor.id.clone()));
        }

        self.index
            .insert(descriptor.id.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Descriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }
}

impl TryFrom<Vec<Descriptor>> for DescriptorSet {
    type Error = StratumError;

    fn try_from(descriptors: Vec<Descriptor>) -> Result<Self> {
        let mut set = DescriptorSet::new();
        for descriptor in descriptors {
            set.insert(descriptor)?;
        }
        Ok(set)
    }
}
