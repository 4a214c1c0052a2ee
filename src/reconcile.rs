// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired-versus-recorded state comparison.

use crate::graph::DependencyGraph;
use crate::resource::{referenced_producers, resolve_outputs, ResourceId};
use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// What has to happen to bring one resource to its desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Change {
    Create,
    Update,
    Noop,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Create => f.write_str("create"),
            Change::Update => f.write_str("update"),
            Change::Noop => f.write_str("noop"),
        }
    }
}

/// SHA-256 of the canonical JSON encoding of a payload.
///
/// `serde_json` maps are key-sorted, so two payloads share a fingerprint exactly
/// when they are structurally equal. The digest is unkeyed; it hides a payload
/// but does not protect a guessable secret inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(payload: &Value) -> Self {
        let encoded = serde_json::to_vec(payload).unwrap_or_default();
        Self(hex::encode(Sha256::digest(&encoded)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Compare a desired payload with the last applied one
pub fn diff(id: &ResourceId, desired: &Fingerprint, observed: Option<&Fingerprint>) -> Change {
    let change = match observed {
        None => Change::Create,
        Some(observed) if observed == desired => Change::Noop,
        Some(_) => Change::Update,
    };
    debug!("Resource {} plans {}", id, change);
    change
}

/// Decides create/update/noop against a recorded state snapshot
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    state: &'a StateSnapshot,
}

impl<'a> Reconciler<'a> {
    pub fn new(state: &'a StateSnapshot) -> Self {
        Self { state }
    }

    pub fn plan(&self, id: &ResourceId, desired: &Value) -> Change {
        let observed = self.state.get(id).map(|entry| &entry.fingerprint);
        diff(id, &Fingerprint::of(desired), observed)
    }

    /// Outputs recorded by the last successful apply
    pub fn recorded_outputs(&self, id: &ResourceId) -> Option<&'a Value> {
        self.state.get(id).map(|entry| &entry.outputs)
    }
}

/// Planned change of one resource; `None` when it depends on outputs not known yet
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub id: ResourceId,
    pub change: Option<Change>,
}

/// Changes a run would make, in schedule order
#[derive(Debug, Clone, PartialEq)]
pub struct Preview(pub Vec<PlannedChange>);

/// Plan every resource in `order` without provisioning anything.
///
/// Output references resolve against recorded outputs. A consumer of a producer
/// that is about to change cannot be planned and gets an unknown change.
pub fn preview(graph: &DependencyGraph, order: &[ResourceId], state: &StateSnapshot) -> Preview {
    let reconciler = Reconciler::new(state);
    let mut changing: HashSet<&ResourceId> = HashSet::new();
    let mut planned = Vec::with_capacity(order.len());

    for id in order {
        let Some(descriptor) = graph.descriptor(id) else {
            continue;
        };
        let payload = descriptor.payload();

        let waits_on_producer = referenced_producers(payload)
            .iter()
            .any(|producer| changing.contains(producer));
        let change = if waits_on_producer {
            None
        } else {
            resolve_outputs(payload, |producer| reconciler.recorded_outputs(producer))
                .ok()
                .map(|resolved| reconciler.plan(id, &resolved))
        };

        if change != Some(Change::Noop) {
            changing.insert(id);
        }
        planned.push(PlannedChange {
            id: id.clone(),
            change,
        });
    }

    Preview(planned)
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.0.iter().map(|p| p.id.as_str().len()).max().unwrap_or(0);
        writeln!(f, "Planned changes:")?;
        for planned in &self.0 {
            let (marker, label) = match planned.change {
                Some(Change::Create) => ('+', "create".to_string()),
                Some(Change::Update) => ('~', "update".to_string()),
                Some(Change::Noop) => ('=', "unchanged".to_string()),
                None => ('?', "unknown until dependencies are applied".to_string()),
            };
            writeln!(f, "  {} {:<width$}  {}", marker, planned.id, label, width = width)?;
        }
        let count = |c: Change| self.0.iter().filter(|p| p.change == Some(c)).count();
        write!(
            f,
            "\n{} to create, {} to update, {} unchanged",
            count(Change::Create),
            count(Change::Update),
            count(Change::Noop)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{output_ref, Descriptor, ResourceKind};
    use crate::scheduler::order;
    use crate::state::StateEntry;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_structural() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_fingerprint_detects_nested_change() {
        let a = json!({"values": {"ports": [80, 443]}});
        let b = json!({"values": {"ports": [443, 80]}});
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_diff() {
        let id = ResourceId::from("ns");
        let one = Fingerprint::of(&json!({"name": "one"}));
        let two = Fingerprint::of(&json!({"name": "two"}));

        assert_eq!(diff(&id, &one, None), Change::Create);
        assert_eq!(diff(&id, &one, Some(&one)), Change::Noop);
        assert_eq!(diff(&id, &one, Some(&two)), Change::Update);
    }

    #[test]
    fn test_reconciler_plan_against_snapshot() {
        let payload = json!({"metadata": {"name": "traefik"}});
        let mut state = StateSnapshot::default();
        state.insert(
            ResourceId::from("traefik-ns"),
            StateEntry {
                fingerprint: Fingerprint::of(&payload),
                outputs: json!({"name": "traefik"}),
            },
        );
        let reconciler = Reconciler::new(&state);

        assert_eq!(reconciler.plan(&"traefik-ns".into(), &payload), Change::Noop);
        assert_eq!(
            reconciler.plan(&"traefik-ns".into(), &json!({"metadata": {"name": "other"}})),
            Change::Update
        );
        assert_eq!(reconciler.plan(&"argocd-ns".into(), &payload), Change::Create);
        assert_eq!(
            reconciler.recorded_outputs(&"traefik-ns".into()),
            Some(&json!({"name": "traefik"}))
        );
    }

    #[test]
    fn test_preview_first_run_creates_everything() {
        let graph = DependencyGraph::build(vec![
            Descriptor::new("ns", ResourceKind::Namespace, json!({"name": "cert-manager"})),
            Descriptor::new("secret", ResourceKind::Secret, json!({"ns": output_ref("ns", "/name")}))
                .depends_on(["ns"]),
        ])
        .unwrap();
        let order = order(&graph).unwrap();

        let preview = preview(&graph, &order, &StateSnapshot::default());

        assert_eq!(
            preview.0,
            vec![
                PlannedChange { id: "ns".into(), change: Some(Change::Create) },
                PlannedChange { id: "secret".into(), change: None },
            ]
        );
        assert!(preview.to_string().ends_with("1 to create, 0 to update, 0 unchanged"));
    }

    #[test]
    fn test_preview_uses_recorded_outputs() {
        let ns_payload = json!({"name": "cert-manager"});
        let secret_payload = json!({"ns": output_ref("ns", "/name")});
        let graph = DependencyGraph::build(vec![
            Descriptor::new("ns", ResourceKind::Namespace, ns_payload.clone()),
            Descriptor::new("secret", ResourceKind::Secret, secret_payload).depends_on(["ns"]),
        ])
        .unwrap();
        let mut state = StateSnapshot::default();
        state.insert(
            "ns".into(),
            StateEntry {
                fingerprint: Fingerprint::of(&ns_payload),
                outputs: json!({"name": "cert-manager"}),
            },
        );
        state.insert(
            "secret".into(),
            StateEntry {
                fingerprint: Fingerprint::of(&json!({"ns": "cert-manager"})),
                outputs: json!({}),
            },
        );
        let order = order(&graph).unwrap();

        let preview = preview(&graph, &order, &state);

        assert!(preview.0.iter().all(|p| p.change == Some(Change::Noop)));
    }
}
