// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Provisioning through the Kubernetes API with server-side apply.

use super::{ProvisionError, Provisioner};
use crate::kubernetes::{apply_dynamic, apply_namespace, apply_secret};
use crate::resource::{ResourceId, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::DynamicObject;
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Applies namespaces, secrets, custom resources and config files
pub struct KubeProvisioner {
    client: Client,
    crd_wait: Duration,
}

impl KubeProvisioner {
    pub fn new(client: Client, crd_wait: Duration) -> Self {
        Self { client, crd_wait }
    }

    async fn namespace(&self, payload: &Value) -> Result<Value, ProvisionError> {
        let namespace: Namespace = parse(payload, "Namespace")?;
        let applied = apply_namespace(&self.client, &namespace).await?;
        Ok(json!({ "name": applied.name_any() }))
    }

    // Outputs never include the secret data
    async fn secret(&self, payload: &Value) -> Result<Value, ProvisionError> {
        let secret: Secret = parse(payload, "Secret")?;
        let applied = apply_secret(&self.client, &secret).await?;
        Ok(json!({
            "name": applied.name_any(),
            "namespace": applied.namespace(),
        }))
    }

    async fn custom_resource(&self, payload: &Value) -> Result<Value, ProvisionError> {
        let object: DynamicObject = parse(payload, "custom resource")?;
        let applied = apply_dynamic(&self.client, &object, self.crd_wait).await?;
        Ok(describe(&applied))
    }

    async fn config_file(&self, payload: &Value) -> Result<Value, ProvisionError> {
        let Some(manifests) = payload.get("manifests").and_then(Value::as_array) else {
            return Err(ProvisionError::InvalidPayload(
                "config file payload has no manifests".to_string(),
            ));
        };

        let mut resources = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let object: DynamicObject = parse(manifest, "manifest document")?;
            let applied = apply_dynamic(&self.client, &object, self.crd_wait).await?;
            resources.push(reference(&applied));
        }
        debug!("Applied {} documents", resources.len());

        Ok(json!({
            "source": payload.get("source").cloned().unwrap_or(Value::Null),
            "sha256": payload.get("sha256").cloned().unwrap_or(Value::Null),
            "resources": resources,
        }))
    }
}

#[async_trait]
impl Provisioner for KubeProvisioner {
    #[instrument(skip(self, payload), fields(resource = %id, kind = %kind))]
    async fn apply_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        payload: &Value,
    ) -> Result<Value, ProvisionError> {
        match kind {
            ResourceKind::Namespace => self.namespace(payload).await,
            ResourceKind::Secret => self.secret(payload).await,
            ResourceKind::CustomResource => self.custom_resource(payload).await,
            ResourceKind::ConfigFile => self.config_file(payload).await,
            ResourceKind::HelmRelease => Err(ProvisionError::InvalidPayload(format!(
                "{} is a Helm release, not a Kubernetes object",
                id
            ))),
        }
    }
}

fn parse<T: DeserializeOwned>(payload: &Value, what: &str) -> Result<T, ProvisionError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| ProvisionError::InvalidPayload(format!("invalid {}: {}", what, e)))
}

fn describe(object: &DynamicObject) -> Value {
    let (api_version, kind) = object
        .types
        .as_ref()
        .map(|t| (t.api_version.clone(), t.kind.clone()))
        .unwrap_or_default();
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "name": object.name_any(),
        "namespace": object.namespace(),
    })
}

fn reference(object: &DynamicObject) -> String {
    let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    match object.namespace() {
        Some(ns) => format!("{}/{}/{}", kind, ns, object.name_any()),
        None => format!("{}/{}", kind, object.name_any()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{api_resource_list_json, namespace_json, MockService};

    fn provisioner(mock: MockService) -> KubeProvisioner {
        KubeProvisioner::new(mock.into_client(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_namespace_outputs_name() {
        let mock = MockService::new().on_patch("/api/v1/namespaces/traefik", 200, &namespace_json("traefik"));
        let payload = json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "traefik"}});

        let outputs = provisioner(mock)
            .apply_resource(ResourceKind::Namespace, &"traefik.ns".into(), &payload)
            .await
            .unwrap();

        assert_eq!(outputs, json!({"name": "traefik"}));
    }

    #[tokio::test]
    async fn test_secret_outputs_exclude_data() {
        let payload = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "duckdns-token", "namespace": "cert-manager"},
            "type": "Opaque",
            "data": {"token": "c29tZXRoaW5nc29tZXRoaW5n"}
        });
        let mock = MockService::new().on_patch(
            "/api/v1/namespaces/cert-manager/secrets/duckdns-token",
            200,
            &payload.to_string(),
        );

        let outputs = provisioner(mock.clone())
            .apply_resource(ResourceKind::Secret, &"duckdns.secret".into(), &payload)
            .await
            .unwrap();

        assert_eq!(outputs, json!({"name": "duckdns-token", "namespace": "cert-manager"}));
        assert_eq!(
            mock.requests(),
            vec![(
                "PATCH".to_string(),
                "/api/v1/namespaces/cert-manager/secrets/duckdns-token".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_custom_resource() {
        let payload = json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Certificate",
            "metadata": {"name": "wildcard", "namespace": "cert-manager"},
            "spec": {"dnsNames": ["*.example.duckdns.org"]}
        });
        let mock = MockService::new()
            .on_get(
                "/apis/cert-manager.io/v1",
                200,
                &api_resource_list_json("cert-manager.io/v1", "Certificate", "certificates", true),
            )
            .on_patch(
                "/apis/cert-manager.io/v1/namespaces/cert-manager/certificates/wildcard",
                200,
                &payload.to_string(),
            );

        let outputs = provisioner(mock)
            .apply_resource(ResourceKind::CustomResource, &"certificate".into(), &payload)
            .await
            .unwrap();

        assert_eq!(outputs["kind"], "Certificate");
        assert_eq!(outputs["name"], "wildcard");
        assert_eq!(outputs["namespace"], "cert-manager");
    }

    #[tokio::test]
    async fn test_config_file_applies_every_document() {
        let deployment = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "argocd-server", "namespace": "argocd"}
        });
        let role = json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": {"name": "argocd-server"}
        });
        let mock = MockService::new()
            .on_get(
                "/apis/apps/v1",
                200,
                &api_resource_list_json("apps/v1", "Deployment", "deployments", true),
            )
            .on_get(
                "/apis/rbac.authorization.k8s.io/v1",
                200,
                &api_resource_list_json("rbac.authorization.k8s.io/v1", "ClusterRole", "clusterroles", false),
            )
            .on_patch(
                "/apis/apps/v1/namespaces/argocd/deployments/argocd-server",
                200,
                &deployment.to_string(),
            )
            .on_patch(
                "/apis/rbac.authorization.k8s.io/v1/clusterroles/argocd-server",
                200,
                &role.to_string(),
            );
        let payload = json!({
            "source": "external/argocd.yaml",
            "sha256": "abc",
            "manifests": [deployment, role]
        });

        let outputs = provisioner(mock)
            .apply_resource(ResourceKind::ConfigFile, &"argocd.install".into(), &payload)
            .await
            .unwrap();

        assert_eq!(outputs["sha256"], "abc");
        assert_eq!(
            outputs["resources"],
            json!(["Deployment/argocd/argocd-server", "ClusterRole/argocd-server"])
        );
    }

    #[tokio::test]
    async fn test_config_file_without_manifests() {
        let err = provisioner(MockService::new())
            .apply_resource(ResourceKind::ConfigFile, &"metallb".into(), &json!({"source": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_helm_release_is_rejected() {
        let err = provisioner(MockService::new())
            .apply_resource(ResourceKind::HelmRelease, &"traefik".into(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidPayload(_)));
    }
}
