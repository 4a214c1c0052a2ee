// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Server-side apply of typed and dynamic objects

use super::crd::{parse_api_version, wait_for_crd_established, wait_for_kind};
use crate::constants::FIELD_MANAGER;
use crate::provision::ProvisionError;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::{
    api::{DynamicObject, GroupVersionKind, Patch, PatchParams},
    discovery::Scope,
    Api, Client, ResourceExt,
};
use std::time::Duration;
use tracing::{debug, info, instrument};

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

/// Create or update a namespace
#[instrument(skip(client, namespace), fields(namespace = %namespace.name_any()))]
pub async fn apply_namespace(
    client: &Client,
    namespace: &Namespace,
) -> Result<Namespace, ProvisionError> {
    let name = required_name(namespace.metadata.name.as_deref(), "Namespace")?;
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let applied = namespaces
        .patch(name, &apply_params(), &Patch::Apply(namespace))
        .await?;
    info!("Namespace {} applied", name);
    Ok(applied)
}

/// Create or update a secret in its own namespace
#[instrument(skip(client, secret), fields(secret = %format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any())))]
pub async fn apply_secret(client: &Client, secret: &Secret) -> Result<Secret, ProvisionError> {
    let name = required_name(secret.metadata.name.as_deref(), "Secret")?;
    let Some(namespace) = secret.metadata.namespace.as_deref() else {
        return Err(ProvisionError::InvalidPayload(format!(
            "Secret {} has no namespace",
            name
        )));
    };

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let applied = secrets
        .patch(name, &apply_params(), &Patch::Apply(secret))
        .await?;
    info!("Secret {}/{} applied", namespace, name);
    Ok(applied)
}

/// Create or update an object of any kind the cluster serves.
///
/// Waits up to `kind_wait` for the kind to be discoverable. Cluster-scoped
/// objects lose any namespace they carry. Applied CRDs are awaited until
/// established so that later objects of the new kind can be applied.
#[instrument(skip(client, object, kind_wait), fields(object = %object.name_any()))]
pub async fn apply_dynamic(
    client: &Client,
    object: &DynamicObject,
    kind_wait: Duration,
) -> Result<DynamicObject, ProvisionError> {
    let Some(types) = object.types.as_ref() else {
        return Err(ProvisionError::InvalidPayload(format!(
            "object {} has no apiVersion/kind",
            object.name_any()
        )));
    };
    let name = required_name(object.metadata.name.as_deref(), &types.kind)?;
    let (group, version) = parse_api_version(&types.api_version);
    let gvk = GroupVersionKind::gvk(group, version, &types.kind);

    let (resource, caps) = wait_for_kind(client, &gvk, kind_wait).await?;

    let applied = if caps.scope == Scope::Namespaced {
        let namespace = object
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &namespace, &resource);
        debug!("Applying {} {}/{}", types.kind, namespace, name);
        api.patch(name, &apply_params(), &Patch::Apply(object))
            .await?
    } else {
        let mut object = object.clone();
        object.metadata.namespace = None;
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        debug!("Applying {} {}", types.kind, name);
        api.patch(name, &apply_params(), &Patch::Apply(&object))
            .await?
    };
    info!("{} {} applied", types.kind, name);

    if is_crd(&gvk) {
        wait_for_crd_established(client, name, kind_wait).await?;
    }

    Ok(applied)
}

fn is_crd(gvk: &GroupVersionKind) -> bool {
    gvk.group == "apiextensions.k8s.io" && gvk.kind == "CustomResourceDefinition"
}

fn required_name<'a>(name: Option<&'a str>, kind: &str) -> Result<&'a str, ProvisionError> {
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| ProvisionError::InvalidPayload(format!("{} has no metadata.name", kind)))
}
