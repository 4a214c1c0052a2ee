// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use super::{decode_snapshot, encode_snapshot, StateSnapshot, StateStore};
use crate::constants::state::{CONFIGMAP_KEY, CONFIGMAP_NAME};
use crate::constants::FIELD_MANAGER;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// State kept as a JSON blob in a ConfigMap inside the cluster
pub struct ConfigMapStateStore {
    client: Client,
    namespace: String,
}

impl ConfigMapStateStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl StateStore for ConfigMapStateStore {
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn load(&self) -> Result<StateSnapshot> {
        let Some(config_map) = self.api().get_opt(CONFIGMAP_NAME).await? else {
            info!("No state ConfigMap in {}, starting empty", self.namespace);
            return Ok(StateSnapshot::default());
        };

        match config_map.data.as_ref().and_then(|d| d.get(CONFIGMAP_KEY)) {
            Some(text) => {
                debug!("Loaded state from {}/{}", self.namespace, CONFIGMAP_NAME);
                decode_snapshot(text)
            }
            None => Ok(StateSnapshot::default()),
        }
    }

    #[instrument(skip(self, snapshot), fields(namespace = %self.namespace))]
    async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(CONFIGMAP_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                CONFIGMAP_KEY.to_string(),
                encode_snapshot(snapshot)?,
            )])),
            ..Default::default()
        };

        self.api()
            .patch(
                CONFIGMAP_NAME,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&config_map),
            )
            .await?;
        info!(
            "Saved state for {} resources to {}/{}",
            snapshot.len(),
            self.namespace,
            CONFIGMAP_NAME
        );
        Ok(())
    }
}
