// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod graph;
pub mod kubernetes;
pub mod manifest;
pub mod provision;
pub mod reconcile;
pub mod report;
pub mod resource;
pub mod scheduler;
pub mod stack;
pub mod state;

#[cfg(test)]
pub mod test_utils;
