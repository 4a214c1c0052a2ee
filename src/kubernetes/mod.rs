// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for client creation, kind discovery and server-side apply.

pub mod apply;
pub mod client;
pub mod crd;

pub use apply::{apply_dynamic, apply_namespace, apply_secret};
pub use client::create_client;
pub use crd::{wait_for_crd_established, wait_for_kind};
