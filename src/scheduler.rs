// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Topological scheduling of a dependency graph.

use crate::error::{Result, StratumError};
use crate::graph::DependencyGraph;
use crate::resource::ResourceId;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Produce an apply order where every resource follows all of its dependencies.
///
/// Among resources that are ready at the same time, the one declared first goes
/// first, which makes the order reproducible.
pub fn order(graph: &DependencyGraph) -> Result<Vec<ResourceId>> {
    let inner = graph.inner();
    let mut in_degree: Vec<usize> = inner
        .node_indices()
        .map(|n| inner.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = inner
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .map(|n| Reverse(inner[n]))
        .collect();

    let mut ordered = Vec::with_capacity(graph.len());
    while let Some(Reverse(position)) = ready.pop() {
        ordered.push(graph.descriptor_at(position).id().clone());

        let node = petgraph::graph::NodeIndex::new(position);
        for next in inner.neighbors_directed(node, Direction::Outgoing) {
            let degree = &mut in_degree[next.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(inner[next]));
            }
        }
    }

    if ordered.len() != graph.len() {
        return Err(StratumError::Cycle {
            members: unscheduled(graph, &ordered),
        });
    }

    Ok(ordered)
}

/// Group resources into waves; every dependency of a resource lies in an earlier wave.
pub fn waves(graph: &DependencyGraph) -> Result<Vec<Vec<ResourceId>>> {
    let mut level = vec![0usize; graph.len()];
    let mut waves: Vec<Vec<ResourceId>> = Vec::new();

    for id in order(graph)? {
        let wave = graph
            .dependencies(&id)
            .iter()
            .filter_map(|dep| graph.position(dep))
            .map(|p| level[p] + 1)
            .max()
            .unwrap_or(0);

        if let Some(position) = graph.position(&id) {
            level[position] = wave;
        }
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(id);
    }

    Ok(waves)
}

fn unscheduled(graph: &DependencyGraph, ordered: &[ResourceId]) -> Vec<ResourceId> {
    graph
        .descriptors()
        .iter()
        .map(|d| d.id())
        .filter(|id| !ordered.contains(id))
        .cloned()
        .collect()
}
