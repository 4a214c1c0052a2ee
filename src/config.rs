// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{crd, env, state, test_defaults};
use crate::error::{Result, StratumError};
use crate::executor::DEFAULT_PARALLELISM;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where the last applied state is kept between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    ConfigMap,
    File(PathBuf),
    Memory,
}

impl FromStr for StateBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "configmap" => Ok(StateBackend::ConfigMap),
            "memory" => Ok(StateBackend::Memory),
            _ => match s.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(StateBackend::File(PathBuf::from(path))),
                _ => Err(format!(
                    "expected configmap, memory or file:<path>, got {:?}",
                    s
                )),
            },
        }
    }
}

/// Run configuration, resolved once before any graph is built
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    /// Test mode uses literal credentials and skips the MetalLB config
    pub test_mode: bool,
    pub email: String,
    pub dns_token: String,
    pub domain: String,
    /// Base64 htpasswd blob for the Traefik dashboard
    pub dashboard_users: String,
    pub manifest_dir: PathBuf,
    pub state: StateBackend,
    pub state_namespace: String,
    pub kube_context: Option<String>,
    pub helm_bin: String,
    pub parallelism: usize,
    pub crd_wait: Duration,
    pub argocd_sha256: Option<String>,
    pub metallb_sha256: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str| get(name).ok_or_else(|| StratumError::MissingConfiguration(name.to_string()));

        let environment = require(env::ENVIRONMENT)?;
        let test_mode = environment == test_defaults::ENVIRONMENT;

        let (email, dns_token, domain, dashboard_users) = if test_mode {
            (
                test_defaults::EMAIL.to_string(),
                test_defaults::DNS_TOKEN.to_string(),
                test_defaults::DOMAIN.to_string(),
                test_defaults::DASHBOARD_USERS.to_string(),
            )
        } else {
            (
                require(env::EMAIL)?,
                require(env::DNS_TOKEN)?,
                require(env::DOMAIN)?,
                require(env::DASHBOARD_USERS)?,
            )
        };

        let backend = match get(env::STATE) {
            Some(value) => value
                .parse::<StateBackend>()
                .map_err(|reason| invalid(env::STATE, reason))?,
            None => StateBackend::ConfigMap,
        };

        let parallelism = match get(env::PARALLELISM) {
            Some(value) => parse_parallelism(&value).map_err(|reason| invalid(env::PARALLELISM, reason))?,
            None => DEFAULT_PARALLELISM,
        };
        let crd_wait_secs = parse_or(get(env::CRD_WAIT_SECS), env::CRD_WAIT_SECS, crd::DEFAULT_WAIT_SECS)?;

        Ok(Config {
            environment,
            test_mode,
            email,
            dns_token,
            domain,
            dashboard_users,
            manifest_dir: get(env::MANIFEST_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("external")),
            state: backend,
            state_namespace: get(env::STATE_NAMESPACE)
                .unwrap_or_else(|| state::DEFAULT_NAMESPACE.to_string()),
            kube_context: get(env::KUBE_CONTEXT),
            helm_bin: get(env::HELM_BIN).unwrap_or_else(|| "helm".to_string()),
            parallelism,
            crd_wait: Duration::from_secs(crd_wait_secs),
            argocd_sha256: get(env::ARGOCD_SHA256),
            metallb_sha256: get(env::METALLB_SHA256),
        })
    }

    /// The domain with dots replaced by dashes, for object names
    pub fn domain_dashed(&self) -> String {
        self.domain.replace('.', "-")
    }
}

/// Parse a worker count; zero is rejected
pub fn parse_parallelism(value: &str) -> std::result::Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("{:?}: {}", value, e)),
    }
}

fn invalid(name: &str, reason: String) -> StratumError {
    StratumError::InvalidConfiguration {
        name: name.to_string(),
        reason,
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, format!("{:?}: {}", raw, e))),
        None => Ok(default),
    }
}
