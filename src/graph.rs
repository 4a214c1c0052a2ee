// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dependency graph over resource descriptors.
//!
//! `A depends_on B` becomes the edge `B -> A`. Node indices equal declaration
//! indices, so declaration order is available to the scheduler for tie-breaking.

use crate::error::{Result, StratumError};
use crate::resource::{referenced_producers, Descriptor, DescriptorSet, ResourceId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Validated, acyclic dependency graph
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    descriptors: Vec<Descriptor>,
    index: HashMap<ResourceId, NodeIndex>,
}

impl DependencyGraph {
    /// Build a graph from descriptors in declaration order.
    ///
    /// Fails on duplicate identities, dependencies on unknown identities, output
    /// references to resources that are not declared dependencies, and cycles.
    pub fn build<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = Descriptor>,
    {
        let mut set = DescriptorSet::new();
        for descriptor in descriptors {
            set.insert(descriptor)?;
        }
        Self::from_set(set)
    }

    pub fn from_set(set: DescriptorSet) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(set.len(), 0);
        let mut index = HashMap::with_capacity(set.len());

        for (i, descriptor) in set.iter().enumerate() {
            let node = graph.add_node(i);
            index.insert(descriptor.id().clone(), node);
        }

        for descriptor in set.iter() {
            let dependent = index[descriptor.id()];

            for dep in descriptor.dependencies() {
                let Some(&dependency) = index.get(dep) else {
                    return Err(StratumError::UnresolvedDependency {
                        resource: descriptor.id().clone(),
                        dependency: dep.clone(),
                    });
                };
                graph.add_edge(dependency, dependent, ());
            }

            for producer in referenced_producers(descriptor.payload()) {
                if !descriptor.dependencies().contains(&producer) {
                    return Err(StratumError::UndeclaredOutputDependency {
                        resource: descriptor.id().clone(),
                        producer,
                    });
                }
            }
        }

        let dag = Self {
            graph,
            descriptors: set.iter().cloned().collect(),
            index,
        };
        dag.verify_acyclic()?;

        debug!(
            "Built dependency graph with {} resources and {} edges",
            dag.len(),
            dag.graph.edge_count()
        );
        Ok(dag)
    }

    /// Fail with the members of the earliest-declared cycle, if any
    fn verify_acyclic(&self) -> Result<()> {
        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut members: Vec<usize> = scc.iter().map(|n| self.graph[*n]).collect();
                members.sort_unstable();
                members
            })
            .min();

        match cycle {
            Some(members) => Err(StratumError::Cycle {
                members: members
                    .into_iter()
                    .map(|i| self.descriptors[i].id().clone())
                    .collect(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn inner(&self) -> &DiGraph<usize, ()> {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, id: &ResourceId) -> Option<&Descriptor> {
        self.index.get(id).map(|n| &self.descriptors[self.graph[*n]])
    }

    pub(crate) fn descriptor_at(&self, position: usize) -> &Descriptor {
        &self.descriptors[position]
    }

    /// Declaration index of a resource
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).map(|n| self.graph[*n])
    }

    /// Direct dependencies, in the order they were declared
    pub fn dependencies(&self, id: &ResourceId) -> &[ResourceId] {
        self.descriptor(id)
            .map(|d| d.dependencies())
            .unwrap_or_default()
    }

    /// Direct dependents, in declaration order
    pub fn dependents(&self, id: &ResourceId) -> Vec<ResourceId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let positions: BTreeSet<usize> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        positions
            .into_iter()
            .map(|i| self.descriptors[i].id().clone())
            .collect()
    }

    /// Everything that depends on `id` directly or transitively, in declaration order
    pub fn transitive_dependents(&self, id: &ResourceId) -> Vec<ResourceId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(self.graph[next]) {
                    queue.push_back(next);
                }
            }
        }

        seen.into_iter()
            .map(|i| self.descriptors[i].id().clone())
            .collect()
    }
}
