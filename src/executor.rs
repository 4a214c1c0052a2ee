// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applies a scheduled dependency graph through a provisioner.
//!
//! Resources start once every dependency has been applied or found unchanged.
//! Independent resources run concurrently, bounded by `parallelism`. A failure
//! blocks the failed resource's transitive dependents and nothing else.

use crate::graph::DependencyGraph;
use crate::provision::{ProvisionError, Provisioner};
use crate::reconcile::{Change, Fingerprint, Reconciler};
use crate::report::{ApplyReport, ApplyResult, Outcome, SkipReason};
use crate::resource::{resolve_outputs, ResourceId, ResourceKind};
use crate::state::StateSnapshot;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_PARALLELISM: usize = 4;

/// Work handed to the provisioner for one resource
struct Task {
    id: ResourceId,
    kind: ResourceKind,
    payload: Value,
    change: Change,
}

struct Completion {
    id: ResourceId,
    change: Change,
    fingerprint: Fingerprint,
    result: Result<Value, ProvisionError>,
}

pub struct Executor<'a> {
    provisioner: &'a dyn Provisioner,
    parallelism: usize,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> Executor<'a> {
    pub fn new(provisioner: &'a dyn Provisioner) -> Self {
        Self {
            provisioner,
            parallelism: DEFAULT_PARALLELISM,
            cancel: None,
        }
    }

    /// Maximum number of concurrent provisioner calls (at least one)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Stop starting new resources once the receiver observes `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Apply every resource in `order`, returning exactly one result per resource
    #[instrument(skip_all, fields(resources = order.len(), parallelism = self.parallelism))]
    pub async fn apply(
        &self,
        graph: &DependencyGraph,
        order: &[ResourceId],
        state: &StateSnapshot,
    ) -> ApplyReport {
        let reconciler = Reconciler::new(state);
        let mut results: HashMap<ResourceId, ApplyResult> = HashMap::with_capacity(order.len());
        let mut started: HashSet<ResourceId> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        let mut cancel_logged = false;

        loop {
            if self.is_cancelled() {
                if !cancel_logged {
                    warn!("Run cancelled, waiting for {} in-flight resources", in_flight.len());
                    cancel_logged = true;
                }
            } else {
                while in_flight.len() < self.parallelism {
                    let Some(id) = next_ready(graph, order, &results, &started) else {
                        break;
                    };
                    started.insert(id.clone());

                    if let Some(task) = self.prepare(graph, &reconciler, &id, &mut results) {
                        info!("Applying {} {} ({})", task.kind, task.id, task.change);
                        in_flight.push(provision(self.provisioner, task));
                    }
                }
            }

            let Some(completion) = in_flight.next().await else {
                break;
            };
            record_completion(graph, completion, &mut results);
        }

        for id in order {
            if !results.contains_key(id) {
                results.insert(
                    id.clone(),
                    ApplyResult::new(
                        id.clone(),
                        Outcome::Skipped {
                            reason: SkipReason::Cancelled,
                            outputs: None,
                        },
                    ),
                );
            }
        }

        let report = ApplyReport::new(
            order
                .iter()
                .filter_map(|id| results.remove(id))
                .collect(),
        );
        info!(
            "Run finished: {} applied, {} skipped, {} failed",
            report.applied(),
            report.skipped(),
            report.failed()
        );
        report
    }

    /// Resolve outputs and consult the reconciler; returns work for the provisioner
    /// unless the resource completed on the spot.
    fn prepare(
        &self,
        graph: &DependencyGraph,
        reconciler: &Reconciler<'_>,
        id: &ResourceId,
        results: &mut HashMap<ResourceId, ApplyResult>,
    ) -> Option<Task> {
        let Some(descriptor) = graph.descriptor(id) else {
            error!("{} is scheduled but not declared", id);
            let e = ProvisionError::InvalidPayload(format!("unknown resource {}", id));
            fail(graph, id, e, results);
            return None;
        };

        let resolved = resolve_outputs(descriptor.payload(), |producer| {
            results.get(producer).and_then(|r| r.outputs())
        });
        let payload = match resolved {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to resolve outputs for {}: {}", id, e);
                fail(graph, id, e, results);
                return None;
            }
        };

        let change = reconciler.plan(id, &payload);
        if change == Change::Noop {
            debug!("{} is unchanged, skipping", id);
            results.insert(
                id.clone(),
                ApplyResult::new(
                    id.clone(),
                    Outcome::Skipped {
                        reason: SkipReason::Unchanged,
                        outputs: reconciler.recorded_outputs(id).cloned(),
                    },
                ),
            );
            return None;
        }

        Some(Task {
            id: id.clone(),
            kind: descriptor.kind(),
            payload,
            change,
        })
    }
}

/// Cancel the run on the first interrupt.
///
/// Returns `true` when a second interrupt arrives, so the caller can exit
/// without waiting for in-flight resources.
pub async fn watch_interrupts<S>(mut interrupts: S, cancel: watch::Sender<bool>) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("Interrupted, no new resources will be started (interrupt again to exit)");
    let _ = cancel.send(true);
    interrupts.next().await.is_some()
}

async fn provision(provisioner: &dyn Provisioner, task: Task) -> Completion {
    let result = provisioner
        .apply_resource(task.kind, &task.id, &task.payload)
        .await;
    Completion {
        fingerprint: Fingerprint::of(&task.payload),
        id: task.id,
        change: task.change,
        result,
    }
}

/// First resource in schedule order that has not started and whose dependencies
/// all completed in a way that lets dependents proceed
fn next_ready(
    graph: &DependencyGraph,
    order: &[ResourceId],
    results: &HashMap<ResourceId, ApplyResult>,
    started: &HashSet<ResourceId>,
) -> Option<ResourceId> {
    order
        .iter()
        .filter(|id| !started.contains(*id) && !results.contains_key(*id))
        .find(|id| {
            graph.dependencies(id).iter().all(|dep| {
                results
                    .get(dep)
                    .is_some_and(|r| r.unblocks_dependents())
            })
        })
        .cloned()
}

fn record_completion(
    graph: &DependencyGraph,
    completion: Completion,
    results: &mut HashMap<ResourceId, ApplyResult>,
) {
    let Completion {
        id,
        change,
        fingerprint,
        result,
    } = completion;

    match result {
        Ok(outputs) => {
            info!("Applied {} ({})", id, change);
            results.insert(
                id.clone(),
                ApplyResult::new(
                    id,
                    Outcome::Applied {
                        change,
                        fingerprint,
                        outputs,
                    },
                ),
            );
        }
        Err(e) => {
            error!("Failed to apply {}: {}", id, e);
            fail(graph, &id, e, results);
        }
    }
}

/// Record a failure and block every transitive dependent that has no result yet
fn fail(
    graph: &DependencyGraph,
    id: &ResourceId,
    error: ProvisionError,
    results: &mut HashMap<ResourceId, ApplyResult>,
) {
    results.insert(id.clone(), ApplyResult::new(id.clone(), Outcome::Failed { error }));

    for dependent in graph.transitive_dependents(id) {
        if results.contains_key(&dependent) {
            continue;
        }
        warn!("Skipping {}: blocked by failed dependency {}", dependent, id);
        results.insert(
            dependent.clone(),
            ApplyResult::new(
                dependent,
                Outcome::Skipped {
                    reason: SkipReason::BlockedBy(id.clone()),
                    outputs: None,
                },
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{output_ref, Descriptor};
    use crate::scheduler::order;
    use crate::test_utils::FakeProvisioner;
    use serde_json::json;
    use std::time::Duration;

    fn ns(id: &str) -> Descriptor {
        Descriptor::new(id, ResourceKind::Namespace, json!({"metadata": {"name": id}}))
    }

    fn outcome_names(report: &ApplyReport) -> Vec<(String, &'static str)> {
        report
            .results()
            .iter()
            .map(|r| {
                let status = match &r.outcome {
                    Outcome::Applied { .. } => "applied",
                    Outcome::Skipped { .. } => "skipped",
                    Outcome::Failed { .. } => "failed",
                };
                (r.id.to_string(), status)
            })
            .collect()
    }

    fn pairs(items: &[(&str, &'static str)]) -> Vec<(String, &'static str)> {
        items.iter().map(|(a, b)| (a.to_string(), *b)).collect()
    }

    fn chain() -> DependencyGraph {
        DependencyGraph::build(vec![
            ns("N"),
            Descriptor::new("S", ResourceKind::Secret, json!({"data": {"token": "dG9rZW4="}}))
                .depends_on(["N"]),
            Descriptor::new("R", ResourceKind::HelmRelease, json!({"chart": "traefik"}))
                .depends_on(["S"]),
        ])
        .unwrap()
    }

    async fn run(
        graph: &DependencyGraph,
        provisioner: &FakeProvisioner,
        state: &StateSnapshot,
        parallelism: usize,
    ) -> ApplyReport {
        let order = order(graph).unwrap();
        Executor::new(provisioner)
            .with_parallelism(parallelism)
            .apply(graph, &order, state)
            .await
    }

    #[tokio::test]
    async fn test_chain_all_applied_in_order() {
        let graph = chain();
        let provisioner = FakeProvisioner::new();

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 1).await;

        assert_eq!(
            outcome_names(&report),
            pairs(&[("N", "applied"), ("S", "applied"), ("R", "applied")])
        );
        assert_eq!(provisioner.calls(), vec!["N", "S", "R"]);
    }

    #[tokio::test]
    async fn test_chain_root_failure_blocks_dependents() {
        let graph = chain();
        let provisioner = FakeProvisioner::new().fail_on("N");

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 4).await;

        assert_eq!(
            outcome_names(&report),
            pairs(&[("N", "failed"), ("S", "skipped"), ("R", "skipped")])
        );
        assert_eq!(provisioner.calls(), vec!["N"]);
        match &report.get(&"R".into()).unwrap().outcome {
            Outcome::Skipped { reason, .. } => {
                assert_eq!(reason, &SkipReason::BlockedBy("N".into()))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_independent_branch_continues_after_failure() {
        let graph = DependencyGraph::build(vec![
            ns("cert-manager"),
            ns("traefik"),
            ns("duckdns").depends_on(["cert-manager"]),
            ns("dashboard").depends_on(["traefik"]),
            ns("broken"),
        ])
        .unwrap();
        let provisioner = FakeProvisioner::new()
            .fail_on("cert-manager")
            .fail_on("broken");

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 2).await;

        assert_eq!(report.len(), 5);
        assert!(report.get(&"cert-manager".into()).unwrap().is_failed());
        assert!(report.get(&"duckdns".into()).unwrap().is_skipped());
        assert!(report.get(&"traefik".into()).unwrap().is_applied());
        assert!(report.get(&"dashboard".into()).unwrap().is_applied());
        assert!(report.get(&"broken".into()).unwrap().is_failed());
        assert!(!provisioner.calls().contains(&"duckdns".to_string()));
    }

    #[tokio::test]
    async fn test_second_run_is_all_skipped() {
        let graph = chain();
        let provisioner = FakeProvisioner::new();
        let mut state = StateSnapshot::default();

        let first = run(&graph, &provisioner, &state, 4).await;
        assert_eq!(first.applied(), 3);
        state.record(&first);

        let second = run(&graph, &provisioner, &state, 4).await;
        assert_eq!(second.skipped(), 3);
        assert_eq!(provisioner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_changed_payload_is_updated() {
        let provisioner = FakeProvisioner::new();
        let mut state = StateSnapshot::default();

        let first_graph = DependencyGraph::build(vec![ns("a")]).unwrap();
        let first = run(&first_graph, &provisioner, &state, 1).await;
        state.record(&first);

        let second_graph = DependencyGraph::build(vec![Descriptor::new(
            "a",
            ResourceKind::Namespace,
            json!({"metadata": {"name": "a", "labels": {"tier": "edge"}}}),
        )])
        .unwrap();
        let second = run(&second_graph, &provisioner, &state, 1).await;

        assert!(matches!(
            second.get(&"a".into()).unwrap().outcome,
            Outcome::Applied {
                change: Change::Update,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_outputs_flow_to_dependents() {
        let graph = DependencyGraph::build(vec![
            Descriptor::new("release", ResourceKind::HelmRelease, json!({"name": "webhook"})),
            Descriptor::new(
                "cert",
                ResourceKind::CustomResource,
                json!({"spec": {"issuerRef": {"name": output_ref("release", "/issuer")}}}),
            )
            .depends_on(["release"]),
        ])
        .unwrap();
        let provisioner =
            FakeProvisioner::new().with_outputs("release", json!({"issuer": "letsencrypt"}));

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 1).await;

        assert_eq!(report.applied(), 2);
        assert_eq!(
            provisioner.payload_of("cert").unwrap(),
            json!({"spec": {"issuerRef": {"name": "letsencrypt"}}})
        );
    }

    #[tokio::test]
    async fn test_unresolvable_output_fails_consumer() {
        let graph = DependencyGraph::build(vec![
            ns("release"),
            ns("after-cert").depends_on(["cert"]),
            Descriptor::new(
                "cert",
                ResourceKind::CustomResource,
                json!({"issuer": output_ref("release", "/missing")}),
            )
            .depends_on(["release"]),
        ])
        .unwrap();
        let provisioner = FakeProvisioner::new();

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 1).await;

        assert!(report.get(&"cert".into()).unwrap().is_failed());
        assert!(report.get(&"after-cert".into()).unwrap().is_skipped());
        assert_eq!(provisioner.calls(), vec!["release"]);
    }

    #[tokio::test]
    async fn test_unchanged_resource_provides_recorded_outputs() {
        let graph = DependencyGraph::build(vec![
            ns("release"),
            Descriptor::new(
                "cert",
                ResourceKind::CustomResource,
                json!({"issuer": output_ref("release", "/metadata/name")}),
            )
            .depends_on(["release"]),
        ])
        .unwrap();
        let provisioner = FakeProvisioner::new();
        let mut state = StateSnapshot::default();

        let first = run(&graph, &provisioner, &state, 1).await;
        state.record(&first);
        let second = run(&graph, &provisioner, &state, 1).await;

        assert_eq!(second.skipped(), 2);
        assert_eq!(provisioner.calls(), vec!["release", "cert"]);
    }

    #[tokio::test]
    async fn test_parallel_siblings_overlap() {
        let graph = DependencyGraph::build(vec![ns("a"), ns("b"), ns("c")]).unwrap();
        let provisioner = FakeProvisioner::new().with_delay(Duration::from_millis(50));

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 3).await;

        assert_eq!(report.applied(), 3);
        assert_eq!(provisioner.max_concurrency(), 3);
    }

    #[tokio::test]
    async fn test_parallelism_bounds_concurrency() {
        let graph =
            DependencyGraph::build(vec![ns("a"), ns("b"), ns("c"), ns("d")]).unwrap();
        let provisioner = FakeProvisioner::new().with_delay(Duration::from_millis(20));

        let report = run(&graph, &provisioner, &StateSnapshot::default(), 2).await;

        assert_eq!(report.applied(), 4);
        assert!(provisioner.max_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing_new() {
        let graph = chain();
        let provisioner = FakeProvisioner::new();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let order = order(&graph).unwrap();
        let report = Executor::new(&provisioner)
            .with_cancellation(rx)
            .apply(&graph, &order, &StateSnapshot::default())
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.skipped(), 3);
        assert!(provisioner.calls().is_empty());
        assert!(matches!(
            report.results()[0].outcome,
            Outcome::Skipped {
                reason: SkipReason::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_mid_run_keeps_completed_results() {
        let graph = chain();
        let (tx, rx) = watch::channel(false);
        let provisioner = FakeProvisioner::new().cancel_after("N", tx);

        let order = order(&graph).unwrap();
        let report = Executor::new(&provisioner)
            .with_cancellation(rx)
            .apply(&graph, &order, &StateSnapshot::default())
            .await;

        assert!(report.get(&"N".into()).unwrap().is_applied());
        assert!(report.get(&"S".into()).unwrap().is_skipped());
        assert!(report.get(&"R".into()).unwrap().is_skipped());
        assert_eq!(provisioner.calls(), vec!["N"]);
    }

    #[tokio::test]
    async fn test_undeclared_scheduled_resource_fails() {
        let graph = DependencyGraph::build(vec![ns("a")]).unwrap();
        let provisioner = FakeProvisioner::new();
        let order: Vec<ResourceId> = vec!["a".into(), "ghost".into()];

        let report = Executor::new(&provisioner)
            .apply(&graph, &order, &StateSnapshot::default())
            .await;

        assert_eq!(outcome_names(&report), pairs(&[("a", "applied"), ("ghost", "failed")]));
        assert_eq!(provisioner.calls(), vec!["a"]);
        assert!(matches!(
            &report.get(&"ghost".into()).unwrap().outcome,
            Outcome::Failed {
                error: ProvisionError::InvalidPayload(msg),
            } if msg == "unknown resource ghost"
        ));
    }

    #[tokio::test]
    async fn test_first_interrupt_cancels() {
        let (tx, rx) = watch::channel(false);

        let force = watch_interrupts(futures::stream::iter([()]), tx).await;

        assert!(!force);
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let (tx, rx) = watch::channel(false);

        assert!(watch_interrupts(futures::stream::iter([(), ()]), tx).await);
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_no_interrupt_leaves_run_alone() {
        let (tx, rx) = watch::channel(false);

        assert!(!watch_interrupts(futures::stream::empty(), tx).await);
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let graph = DependencyGraph::build(Vec::new()).unwrap();
        let report = run(&graph, &FakeProvisioner::new(), &StateSnapshot::default(), 4).await;
        assert!(report.is_empty());
    }
}
