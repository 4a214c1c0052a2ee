// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-resource apply results and the run summary.

use crate::provision::ProvisionError;
use crate::reconcile::{Change, Fingerprint};
use crate::resource::ResourceId;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Desired state matches the last applied state
    Unchanged,
    /// A dependency failed or was itself blocked
    BlockedBy(ResourceId),
    /// The run was cancelled before this resource started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unchanged => f.write_str("unchanged"),
            SkipReason::BlockedBy(dep) => write!(f, "blocked by failed dependency {}", dep),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Applied {
        change: Change,
        fingerprint: Fingerprint,
        outputs: Value,
    },
    Skipped {
        reason: SkipReason,
        /// Recorded outputs, present when the resource was unchanged
        outputs: Option<Value>,
    },
    Failed {
        error: ProvisionError,
    },
}

#[derive(Debug)]
pub struct ApplyResult {
    pub id: ResourceId,
    pub outcome: Outcome,
}

impl ApplyResult {
    pub fn new(id: impl Into<ResourceId>, outcome: Outcome) -> Self {
        Self {
            id: id.into(),
            outcome,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Applied { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    /// Outputs usable by dependents: set for applied and unchanged resources only
    pub fn outputs(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Applied { outputs, .. } => Some(outputs),
            Outcome::Skipped {
                reason: SkipReason::Unchanged,
                outputs,
            } => outputs.as_ref(),
            _ => None,
        }
    }

    /// Whether dependents may start after this result
    pub fn unblocks_dependents(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Applied { .. }
                | Outcome::Skipped {
                    reason: SkipReason::Unchanged,
                    ..
                }
        )
    }
}

/// Results of one run, one per resource, in schedule order
#[derive(Debug, Default)]
pub struct ApplyReport {
    results: Vec<ApplyResult>,
}

impl ApplyReport {
    pub fn new(results: Vec<ApplyResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ApplyResult] {
        &self.results
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ApplyResult> {
        self.results.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.is_applied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .results
            .iter()
            .map(|r| r.id.as_str().len())
            .max()
            .unwrap_or(0);

        writeln!(f, "Resources:")?;
        for result in &self.results {
            let (marker, status) = match &result.outcome {
                Outcome::Applied { change, .. } => {
                    let marker = if *change == Change::Create { '+' } else { '~' };
                    (marker, format!("applied ({})", change))
                }
                Outcome::Skipped {
                    reason: SkipReason::Unchanged,
                    ..
                } => ('=', "skipped (unchanged)".to_string()),
                Outcome::Skipped { reason, .. } => ('-', format!("skipped ({})", reason)),
                Outcome::Failed { error } => ('!', format!("failed: {}", error)),
            };
            writeln!(f, "  {} {:<width$}  {}", marker, result.id, status, width = width)?;
        }

        write!(
            f,
            "\n{} applied, {} skipped, {} failed",
            self.applied(),
            self.skipped(),
            self.failed()
        )
    }
}
