// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! cert-manager with the DuckDNS webhook and a wildcard certificate

use super::{custom_resource, namespace, secret};
use crate::config::Config;
use crate::provision::HelmRelease;
use crate::resource::{output_ref, Descriptor, ResourceKind};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";

const DUCKDNS_SECRET: &str = "duckdns-token";
const WEBHOOK_RELEASE_ID: &str = "certmanager-webhook-duckdns";
/// Names of the ClusterIssuers rendered by the webhook chart
const CLUSTER_ISSUER_NAMES: &str = "/resourceNames/ClusterIssuer.cert-manager.io~1cert-manager.io~1v1";

pub(super) fn declare(config: &Config) -> Vec<Descriptor> {
    let cert_manager = HelmRelease::new("cert-manager", "cert-manager", CERT_MANAGER_NAMESPACE)
        .repo("https://charts.jetstack.io")
        .values(json!({
            "installCRDs": true,
            "webhook": {"timeoutSeconds": "600"},
            "startupapicheck": {
                "enabled": false,
                "timeout": "10m",
                "backoffLimit": 8,
            },
        }))
        .timeout_seconds(600);

    let webhook = HelmRelease::new(
        "cert-manager-webhook-duckdns",
        "cert-manager-webhook-duckdns",
        CERT_MANAGER_NAMESPACE,
    )
    .repo("https://ebrianne.github.io/helm-charts")
    .version("v1.2.4")
    .values(json!({
        "groupName": "acme.duckdns.org",
        "logLevel": 6,
        "clusterIssuer": {
            "email": config.email,
            "production": {"create": true},
        },
        "secret": {
            "existingSecret": true,
            "existingSecretName": DUCKDNS_SECRET,
        },
        "certManager": {
            "serviceAccountName": output_ref("cert-manager", "/name"),
        },
        "duckdns": {"token": config.dns_token},
    }));

    let domain_dashed = config.domain_dashed();

    vec![
        namespace("cert-manager-namespace", CERT_MANAGER_NAMESPACE),
        Descriptor::new("cert-manager", ResourceKind::HelmRelease, cert_manager.to_payload())
            .depends_on(["cert-manager-namespace"]),
        secret(
            "duckdns-secret",
            DUCKDNS_SECRET,
            json!(CERT_MANAGER_NAMESPACE),
            json!({"token": STANDARD.encode(config.dns_token.as_bytes())}),
        )
        .depends_on(["cert-manager-namespace"]),
        Descriptor::new(WEBHOOK_RELEASE_ID, ResourceKind::HelmRelease, webhook.to_payload())
            .depends_on(["duckdns-secret", "cert-manager"]),
        custom_resource(
            "production-certificate",
            "cert-manager.io/v1",
            "Certificate",
            &domain_dashed,
            json!(CERT_MANAGER_NAMESPACE),
            json!({
                "secretName": format!("{}-tls", domain_dashed),
                "issuerRef": {
                    "name": output_ref(WEBHOOK_RELEASE_ID, &format!("{}/0", CLUSTER_ISSUER_NAMES)),
                    "kind": "ClusterIssuer",
                },
                "dnsNames": [format!("*.{}", config.domain)],
            }),
        )
        .depends_on([WEBHOOK_RELEASE_ID]),
    ]
}
