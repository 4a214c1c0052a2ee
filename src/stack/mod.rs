// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The declared cluster stack: cert-manager, Traefik, Argo CD and MetalLB.

mod argocd;
mod certs;
mod traefik;

use crate::config::Config;
use crate::error::Result;
use crate::manifest::load_config_file;
use crate::resource::{Descriptor, ResourceKind};
use serde_json::{json, Value};
use tracing::{debug, info};

pub use argocd::ARGOCD_NAMESPACE;
pub use certs::CERT_MANAGER_NAMESPACE;
pub use traefik::TRAEFIK_NAMESPACE;

pub const METALLB_MANIFEST: &str = "metallb-configmap.yaml";

/// Declare every resource of the stack in declaration order
pub fn declare(config: &Config) -> Result<Vec<Descriptor>> {
    let mut descriptors = Vec::new();

    if config.test_mode {
        debug!("Test mode, skipping MetalLB configuration");
    } else {
        let payload = load_config_file(
            &config.manifest_dir.join(METALLB_MANIFEST),
            config.metallb_sha256.as_deref(),
            &[],
        )?;
        descriptors.push(Descriptor::new(
            "metallb-configmap",
            ResourceKind::ConfigFile,
            payload,
        ));
    }

    descriptors.extend(certs::declare(config));
    descriptors.extend(traefik::declare(config));
    descriptors.extend(argocd::declare(config)?);

    info!(
        "Declared {} resources for environment {}",
        descriptors.len(),
        config.environment
    );
    Ok(descriptors)
}

fn namespace(id: &str, name: &str) -> Descriptor {
    Descriptor::new(
        id,
        ResourceKind::Namespace,
        json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
        }),
    )
}

/// An opaque secret; `namespace` may be an output reference
fn secret(id: &str, name: &str, namespace: Value, data: Value) -> Descriptor {
    Descriptor::new(
        id,
        ResourceKind::Secret,
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": name, "namespace": namespace},
            "type": "Opaque",
            "data": data,
        }),
    )
}

fn custom_resource(
    id: &str,
    api_version: &str,
    kind: &str,
    name: &str,
    namespace: Value,
    spec: Value,
) -> Descriptor {
    Descriptor::new(
        id,
        ResourceKind::CustomResource,
        json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": name, "namespace": namespace},
            "spec": spec,
        }),
    )
}
