// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::resource::ResourceId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratumError {
    #[error("Duplicate resource identity: {0}")]
    DuplicateIdentity(ResourceId),

    #[error("Invalid resource identity: {0:?}")]
    InvalidIdentity(String),

    #[error("Resource {resource} depends on unknown resource {dependency}")]
    UnresolvedDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    #[error("Resource {resource} reads outputs of {producer} without depending on it")]
    UndeclaredOutputDependency {
        resource: ResourceId,
        producer: ResourceId,
    },

    #[error("Dependency cycle between: {}", format_members(.members))]
    Cycle { members: Vec<ResourceId> },

    #[error("Missing required configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration {name}: {reason}")]
    InvalidConfiguration { name: String, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_members(members: &[ResourceId]) -> String {
    members
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, StratumError>;
