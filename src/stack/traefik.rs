// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Traefik ingress with an authenticated dashboard

use super::{custom_resource, namespace, secret, CERT_MANAGER_NAMESPACE};
use crate::config::Config;
use crate::provision::HelmRelease;
use crate::resource::{output_ref, Descriptor, ResourceKind};
use serde_json::json;

pub const TRAEFIK_NAMESPACE: &str = "traefik";

const TRAEFIK_API: &str = "traefik.containo.us/v1alpha1";
const AUTH_SECRET: &str = "traefik-auth";

pub(super) fn declare(config: &Config) -> Vec<Descriptor> {
    let traefik_namespace = || output_ref("traefik-namespace", "/name");
    let domain = &config.domain;

    let release = HelmRelease::new("traefik-helm", "traefik", TRAEFIK_NAMESPACE)
        .repo("https://helm.traefik.io/traefik")
        .version("10.15.0")
        .values(json!({
            "ingressRoute": {"dashboard": {"enabled": "false"}},
            "ports": {
                "web": {"redirectTo": "websecure"},
                "websecure": {"tls": {"enabled": "true"}},
            },
            "additionalArguments": [
                "--entryPoints.web.http.redirections.entryPoint.to=websecure",
                "--entryPoints.web.http.redirections.entryPoint.scheme=https",
                format!("--entrypoints.websecure.http.tls.domains[0].main={}", domain),
                format!("--entrypoints.websecure.http.tls.domains[0].sans=*.{}", domain),
                "--log.level=DEBUG",
            ],
        }));
    let mut release_payload = release.to_payload();
    release_payload["namespace"] = traefik_namespace();

    vec![
        namespace("traefik-namespace", TRAEFIK_NAMESPACE),
        secret(
            "traefik-dash-secret",
            AUTH_SECRET,
            traefik_namespace(),
            json!({"users": config.dashboard_users}),
        )
        .depends_on(["traefik-namespace"]),
        Descriptor::new("traefik", ResourceKind::HelmRelease, release_payload).depends_on([
            "traefik-namespace",
            "traefik-dash-secret",
            "certmanager-webhook-duckdns",
            "production-certificate",
        ]),
        custom_resource(
            "traefik-auth-object",
            TRAEFIK_API,
            "Middleware",
            "auth",
            json!(TRAEFIK_NAMESPACE),
            json!({
                "basicAuth": {
                    "namespace": TRAEFIK_NAMESPACE,
                    "secret": AUTH_SECRET,
                },
            }),
        )
        .depends_on(["traefik"]),
        custom_resource(
            "traefik-tls-store",
            TRAEFIK_API,
            "TLSStore",
            "default",
            json!(CERT_MANAGER_NAMESPACE),
            json!({
                "defaultCertificate": {
                    "secretName": format!("{}-tls", config.domain_dashed()),
                },
            }),
        )
        .depends_on(["traefik"]),
        custom_resource(
            "traefik-dashboard-ingressroute",
            TRAEFIK_API,
            "IngressRoute",
            "traefik-dashboard",
            json!(TRAEFIK_NAMESPACE),
            json!({
                "entryPoints": ["web", "websecure"],
                "routes": [{
                    "kind": "Rule",
                    "match": format!(
                        "Host(`traefik.{}`) && (PathPrefix(`/api`) || PathPrefix(`/dashboard`))",
                        domain
                    ),
                    "priority": 10,
                    "services": [{"name": "api@internal", "kind": "TraefikService"}],
                    "middlewares": [{"name": "auth", "namespace": TRAEFIK_NAMESPACE}],
                }],
            }),
        )
        .depends_on(["traefik"]),
    ]
}
