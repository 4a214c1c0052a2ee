// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helm releases installed through the `helm` binary.

use super::{ProvisionError, Provisioner};
use crate::manifest::parse_documents;
use crate::resource::{ResourceId, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Payload of a `HelmRelease` descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    pub chart: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub values: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub skip_await: bool,
    #[serde(default)]
    pub create_namespace: bool,
}

impl HelmRelease {
    pub fn new(name: &str, chart: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            chart: chart.to_string(),
            repo: None,
            version: None,
            namespace: namespace.to_string(),
            values: Value::Null,
            timeout_seconds: None,
            skip_await: false,
            create_namespace: false,
        }
    }

    pub fn repo(mut self, repo: &str) -> Self {
        self.repo = Some(repo.to_string());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Serialize into a descriptor payload
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn from_payload(payload: &Value) -> Result<Self, ProvisionError> {
        let release: HelmRelease = serde_json::from_value(payload.clone())
            .map_err(|e| ProvisionError::InvalidPayload(format!("invalid Helm release: {}", e)))?;
        release.validate()?;
        Ok(release)
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.name.is_empty() || self.chart.is_empty() || self.namespace.is_empty() {
            return Err(ProvisionError::InvalidPayload(
                "Helm release needs a name, chart and namespace".to_string(),
            ));
        }
        if let Some(repo) = &self.repo {
            let url = Url::parse(repo).map_err(|e| {
                ProvisionError::InvalidPayload(format!("invalid chart repository {}: {}", repo, e))
            })?;
            if !matches!(url.scheme(), "http" | "https" | "oci") {
                return Err(ProvisionError::InvalidPayload(format!(
                    "unsupported chart repository scheme {}",
                    url.scheme()
                )));
            }
        }
        if !(self.values.is_null() || self.values.is_object()) {
            return Err(ProvisionError::InvalidPayload(format!(
                "values of {} must be a map",
                self.name
            )));
        }
        Ok(())
    }
}

/// Status printed by `helm upgrade --output json`
#[derive(Debug, Deserialize)]
struct ReleaseStatus {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    info: ReleaseInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    status: String,
}

/// Installs or upgrades releases with `helm upgrade --install`
pub struct HelmProvisioner {
    binary: String,
    kube_context: Option<String>,
}

impl HelmProvisioner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kube_context: None,
        }
    }

    /// Pass `--kube-context` on every invocation
    pub fn with_kube_context(mut self, context: Option<String>) -> Self {
        self.kube_context = context;
        self
    }

    /// Arguments of the install/upgrade invocation; values are read from stdin
    pub fn upgrade_args(release: &HelmRelease) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "upgrade".into(),
            "--install".into(),
            release.name.clone(),
            release.chart.clone(),
            "--namespace".into(),
            release.namespace.clone(),
        ];
        if let Some(repo) = &release.repo {
            args.extend(["--repo".into(), repo.clone()]);
        }
        if let Some(version) = &release.version {
            args.extend(["--version".into(), version.clone()]);
        }
        args.extend(["--values".into(), "-".into()]);
        if !release.skip_await {
            args.push("--wait".into());
        }
        if let Some(seconds) = release.timeout_seconds {
            args.extend(["--timeout".into(), format!("{}s", seconds)]);
        }
        if release.create_namespace {
            args.push("--create-namespace".into());
        }
        args.extend(["--output".into(), "json".into()]);
        args
    }

    async fn run(&self, release: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String, ProvisionError> {
        debug!("Running {} {}", self.binary, args.join(" "));
        let helm_error = |message: String| ProvisionError::Helm {
            release: release.to_string(),
            message,
        };

        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(context) = &self.kube_context {
            command.args(["--kube-context", context.as_str()]);
        }

        let mut child = command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| helm_error(format!("cannot run {}: {}", self.binary, e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            // Closing stdin lets helm finish reading values
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(helm_error(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Provisioner for HelmProvisioner {
    #[instrument(skip(self, payload), fields(resource = %id))]
    async fn apply_resource(
        &self,
        kind: ResourceKind,
        id: &ResourceId,
        payload: &Value,
    ) -> Result<Value, ProvisionError> {
        if kind != ResourceKind::HelmRelease {
            return Err(ProvisionError::InvalidPayload(format!(
                "{} is a {}, not a Helm release",
                id, kind
            )));
        }
        let release = HelmRelease::from_payload(payload)?;
        let values = if release.values.is_null() {
            json!({})
        } else {
            release.values.clone()
        };
        let values = serde_json::to_vec(&values)
            .map_err(|e| ProvisionError::InvalidPayload(e.to_string()))?;

        info!("Installing release {} in {}", release.name, release.namespace);
        let status = self
            .run(&release.name, &Self::upgrade_args(&release), Some(&values))
            .await?;
        let status: ReleaseStatus = serde_json::from_str(&status).map_err(|e| ProvisionError::Helm {
            release: release.name.clone(),
            message: format!("unexpected status output: {}", e),
        })?;

        let get_manifest = [
            "get".to_string(),
            "manifest".to_string(),
            release.name.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
        ];
        let manifest = self.run(&release.name, &get_manifest, None).await?;
        let names = resource_names(&manifest).map_err(|message| ProvisionError::Helm {
            release: release.name.clone(),
            message,
        })?;

        if status.info.status != "deployed" {
            warn!("Release {} is {}", release.name, status.info.status);
        }
        info!(
            "Release {} at revision {} is {}",
            release.name, status.version, status.info.status
        );

        Ok(json!({
            "name": release.name,
            "namespace": release.namespace,
            "revision": status.version,
            "status": status.info.status,
            "resourceNames": names,
        }))
    }
}

/// Group the objects of a rendered release by `Kind.group/apiVersion`.
///
/// Core kinds have no group and are keyed `Kind/apiVersion`.
pub fn resource_names(manifest: &str) -> Result<BTreeMap<String, Vec<String>>, String> {
    let mut names: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for document in parse_documents(manifest).map_err(|e| e.to_string())? {
        let api_version = document["apiVersion"].as_str().unwrap_or_default();
        let kind = document["kind"].as_str().unwrap_or_default();
        let Some(name) = document["metadata"]["name"].as_str() else {
            continue;
        };
        if kind.is_empty() || api_version.is_empty() {
            continue;
        }
        let key = match api_version.split_once('/') {
            Some((group, _)) => format!("{}.{}/{}", kind, group, api_version),
            None => format!("{}/{}", kind, api_version),
        };
        names.entry(key).or_default().push(name.to_string());
    }
    Ok(names)
}
