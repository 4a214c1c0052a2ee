// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "stratum";

/// Environment variable names read by `Config::from_env`
pub mod env {
    pub const ENVIRONMENT: &str = "STRATUM_ENVIRONMENT";
    pub const EMAIL: &str = "STRATUM_EMAIL";
    pub const DNS_TOKEN: &str = "STRATUM_DNS_TOKEN";
    pub const DOMAIN: &str = "STRATUM_DOMAIN";
    pub const DASHBOARD_USERS: &str = "STRATUM_DASHBOARD_USERS";
    pub const MANIFEST_DIR: &str = "STRATUM_MANIFEST_DIR";
    pub const STATE: &str = "STRATUM_STATE";
    pub const STATE_NAMESPACE: &str = "STRATUM_STATE_NAMESPACE";
    pub const KUBE_CONTEXT: &str = "STRATUM_KUBE_CONTEXT";
    pub const HELM_BIN: &str = "STRATUM_HELM_BIN";
    pub const PARALLELISM: &str = "STRATUM_PARALLELISM";
    pub const CRD_WAIT_SECS: &str = "STRATUM_CRD_WAIT_SECS";
    pub const ARGOCD_SHA256: &str = "STRATUM_ARGOCD_SHA256";
    pub const METALLB_SHA256: &str = "STRATUM_METALLB_SHA256";
}

/// Literal values used when the environment is `test`
pub mod test_defaults {
    pub const ENVIRONMENT: &str = "test";
    pub const EMAIL: &str = "no_reply@example.com";
    pub const DNS_TOKEN: &str = "somethingsomething";
    pub const DOMAIN: &str = "example";
    pub const DASHBOARD_USERS: &str =
        "YWRtaW46JGFwcjEkYm1XRFRuVkEkU3VsUk1YbTRtL2NrTnpqMDVuS21UMAoK";
}

/// Persisted state location
pub mod state {
    pub const CONFIGMAP_NAME: &str = "stratum-state";
    pub const CONFIGMAP_KEY: &str = "state.json";
    pub const DEFAULT_NAMESPACE: &str = "kube-system";
}

/// Kind discovery polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for a kind
    pub const POLL_INTERVAL_SECS: u64 = 2;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 30;
    /// Default upper bound on waiting for a kind to be served
    pub const DEFAULT_WAIT_SECS: u64 = 600;
}
