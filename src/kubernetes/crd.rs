// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Waiting for custom kinds to be served by the API server

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::provision::ProvisionError;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::discovery::{pinned_kind, ApiCapabilities, ApiResource};
use kube::runtime::wait::{await_condition, conditions};
use kube::{api::GroupVersionKind, Api, Client};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

/// Wait until `gvk` is discoverable, returning its resource description.
///
/// Kinds installed by an earlier release (CRDs bundled in a chart) may take a
/// moment to appear. Polls with exponential backoff starting at
/// POLL_INTERVAL_SECS seconds, giving up after `limit`.
pub async fn wait_for_kind(
    client: &Client,
    gvk: &GroupVersionKind,
    limit: Duration,
) -> Result<(ApiResource, ApiCapabilities), ProvisionError> {
    let deadline = Instant::now() + limit;
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        let last_error = match pinned_kind(client, gvk).await {
            Ok(found) => {
                debug!("{} is served by the cluster", describe(gvk));
                return Ok(found);
            }
            Err(e) => e,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(ProvisionError::KindUnavailable(format!(
                "{} ({})",
                describe(gvk),
                last_error
            )));
        }

        info!(
            "{} not yet available, waiting {} seconds...",
            describe(gvk),
            interval
        );
        sleep(Duration::from_secs(interval).min(deadline - now)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Wait until the named CRD reports the Established condition
pub async fn wait_for_crd_established(
    client: &Client,
    name: &str,
    limit: Duration,
) -> Result<(), ProvisionError> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let established = await_condition(crds, name, conditions::is_crd_established());

    match timeout(limit, established).await {
        Ok(Ok(_)) => {
            debug!("CRD {} is established", name);
            Ok(())
        }
        Ok(Err(e)) => Err(ProvisionError::KindUnavailable(format!("{} ({})", name, e))),
        Err(_) => Err(ProvisionError::Timeout {
            what: format!("CRD {} to become established", name),
            seconds: limit.as_secs(),
        }),
    }
}

/// Split an apiVersion into group and version; the core group is empty
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

fn describe(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.kind, gvk.version)
    } else {
        format!("{}.{}/{}", gvk.kind, gvk.group, gvk.version)
    }
}
