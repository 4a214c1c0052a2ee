// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Argo CD, exposed through Traefik, with a root application

use super::{custom_resource, namespace};
use crate::config::Config;
use crate::error::Result;
use crate::manifest::load_config_file;
use crate::resource::{output_ref, Descriptor, ResourceKind, Transform};
use serde_json::json;

pub const ARGOCD_NAMESPACE: &str = "argocd";
pub const ARGOCD_MANIFEST: &str = "argocd.yaml";

pub(super) fn declare(config: &Config) -> Result<Vec<Descriptor>> {
    let install = load_config_file(
        &config.manifest_dir.join(ARGOCD_MANIFEST),
        config.argocd_sha256.as_deref(),
        &[Transform::SetNamespace(ARGOCD_NAMESPACE.to_string())],
    )?;
    let argocd_namespace = || output_ref("argocd-namespace", "/name");
    let host = format!("Host(`argocd.{}`)", config.domain);

    Ok(vec![
        namespace("argocd-namespace", ARGOCD_NAMESPACE),
        Descriptor::new("argocd", ResourceKind::ConfigFile, install)
            .depends_on(["traefik", "argocd-namespace"]),
        custom_resource(
            "argocd-ingressroute",
            "traefik.containo.us/v1alpha1",
            "IngressRoute",
            "argocd-server",
            argocd_namespace(),
            json!({
                "entryPoints": ["web", "websecure"],
                "routes": [
                    {
                        "kind": "Rule",
                        "match": host,
                        "priority": 10,
                        "services": [{
                            "name": "argocd-server",
                            "namespace": argocd_namespace(),
                            "port": 80,
                        }],
                    },
                    {
                        "kind": "Rule",
                        "match": format!("{} && Headers(`Content-Type`, `application/grpc`)", host),
                        "priority": 11,
                        "services": [{
                            "name": "argocd-server",
                            "namespace": argocd_namespace(),
                            "port": 80,
                            "scheme": "h2c",
                        }],
                    },
                ],
            }),
        )
        .depends_on(["traefik", "argocd-namespace", "argocd"]),
        custom_resource(
            "root-app",
            "argoproj.io/v1alpha1",
            "Application",
            "root-app",
            json!(ARGOCD_NAMESPACE),
            json!({
                "project": "default",
                "destination": {"namespace": "default", "name": "in-cluster"},
                "source": {
                    "path": "apps",
                    "repoURL": "https://github.com/argoproj/argocd-example-apps",
                    "targetRevision": "HEAD",
                },
            }),
        )
        .depends_on(["argocd-namespace", "argocd"]),
    ])
}
