// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Provisioners turn a descriptor payload into a real object in the cluster.

pub mod helm;
pub mod k8s;

use crate::resource::{ResourceId, ResourceKind};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use helm::{HelmProvisioner, HelmRelease};
pub use k8s::KubeProvisioner;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Helm release {release} failed: {message}")]
    Helm { release: String, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Kind {0} is not served by the cluster")]
    KindUnavailable(String),

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Output {pointer} of {producer} is not available")]
    UnresolvedOutput {
        producer: ResourceId,
        pointer: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// External system that creates or updates the object a descriptor describes.
///
/// Returns the observed outputs of the object, which dependents may reference.
/// Retries and timeouts are the provisioner's own business.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn apply_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        payload: &Value,
    ) -> Result<Value, ProvisionError>;
}

/// Routes Helm releases to `helm` and everything else to the Kubernetes API
pub struct ClusterProvisioner {
    kube: KubeProvisioner,
    helm: HelmProvisioner,
}

impl ClusterProvisioner {
    pub fn new(kube: KubeProvisioner, helm: HelmProvisioner) -> Self {
        Self { kube, helm }
    }
}

#[async_trait]
impl Provisioner for ClusterProvisioner {
    async fn apply_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        payload: &Value,
    ) -> Result<Value, ProvisionError> {
        match kind {
            ResourceKind::HelmRelease => self.helm.apply_resource(kind, id, payload).await,
            ResourceKind::Namespace
            | ResourceKind::Secret
            | ResourceKind::CustomResource
            | ResourceKind::ConfigFile => self.kube.apply_resource(kind, id, payload).await,
        }
    }
}
