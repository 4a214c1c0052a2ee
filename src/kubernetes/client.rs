// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster client creation from the local kubeconfig

use crate::config::Config;
use crate::error::{Result, StratumError};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{debug, info, instrument};

/// Create a client for the target cluster.
///
/// Uses the named kubeconfig context when one is configured, otherwise the
/// standard inference (in-cluster service account, then `KUBECONFIG`).
#[instrument(skip(config), fields(context = config.kube_context.as_deref().unwrap_or("default")))]
pub async fn create_client(config: &Config) -> Result<Client> {
    match &config.kube_context {
        Some(context) => create_client_for_context(context).await,
        None => {
            debug!("Inferring cluster configuration");
            Ok(Client::try_default().await?)
        }
    }
}

async fn create_client_for_context(context: &str) -> Result<Client> {
    let kubeconfig = Kubeconfig::read().map_err(|e| StratumError::InvalidConfiguration {
        name: "kubeconfig".to_string(),
        reason: e.to_string(),
    })?;

    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| StratumError::InvalidConfiguration {
            name: "kube context".to_string(),
            reason: format!("{}: {}", context, e),
        })?;

    info!("Using kubeconfig context {}", context);
    Ok(Client::try_from(client_config)?)
}
