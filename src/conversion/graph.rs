// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Weighted directed graph over [DataType]s.

use crate::conversion::{DataType, Transform};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One learned conversion `from -> to`.
#[derive(Debug, Clone)]
pub struct ConversionEdge {
    from: DataType,
    to: DataType,
    weight: i64,
    transform: Transform,
}

impl ConversionEdge {
    pub fn from(&self) -> &DataType {
        &self.from
    }
    pub fn to(&self) -> &DataType {
        &self.to
    }
    pub fn weight(&self) -> i64 {
        self.weight
    }
    pub fn transform(&self) -> &Transform {
        &self.transform
    }
}

/**
An ordered list of edges leading from a source type to a target type.

`edges[0].from()` is the source, each edge starts where the previous one ended, and the last
edge ends at the target.  The path for `t -> t` is empty and costs nothing.
*/
#[derive(Debug, Clone)]
pub struct ConversionPath {
    edges: Vec<ConversionEdge>,
    cost: i64,
}

impl ConversionPath {
    pub(crate) fn identity() -> Self {
        ConversionPath {
            edges: Vec::new(),
            cost: 0,
        }
    }
    pub fn edges(&self) -> &[ConversionEdge] {
        &self.edges
    }
    pub fn cost(&self) -> i64 {
        self.cost
    }
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
    pub fn len(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Default)]
pub struct ConversionGraph {
    index: HashMap<DataType, usize>,
    vertices: Vec<DataType>,
    //outgoing edges per vertex, in discovery order
    adjacency: Vec<Vec<ConversionEdge>>,
}

impl ConversionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a vertex.  Returns `false` if it was already present.
    pub fn add_vertex(&mut self, id: &DataType) -> bool {
        if self.index.contains_key(id) {
            return false;
        }
        self.index.insert(id.clone(), self.vertices.len());
        self.vertices.push(id.clone());
        self.adjacency.push(Vec::new());
        true
    }

    pub fn contains(&self, id: &DataType) -> bool {
        self.index.contains_key(id)
    }

    pub fn vertices(&self) -> &[DataType] {
        &self.vertices
    }

    /**
    Inserts the edge `from -> to`, replacing any existing edge between the same pair.

    Returns whether an edge was replaced.  A replaced edge keeps its position in the
    discovery order.

    # Panics
    Both vertices must have been added first.
    */
    pub fn add_edge(&mut self, from: &DataType, to: &DataType, weight: i64, transform: Transform) -> bool {
        let from_index = *self
            .index
            .get(from)
            .unwrap_or_else(|| panic!("add_edge: vertex {from} was never added"));
        assert!(self.index.contains_key(to), "add_edge: vertex {to} was never added");
        if weight < 0 {
            logwise::warn_sync!(
                "Negative conversion weight {weight} on {from} -> {to}; shortest paths are unsupported with negative weights",
                weight = weight,
                from = from.to_string(),
                to = to.to_string()
            );
        }
        let edge = ConversionEdge {
            from: from.clone(),
            to: to.clone(),
            weight,
            transform,
        };
        let outgoing = &mut self.adjacency[from_index];
        match outgoing.iter_mut().find(|e| &e.to == to) {
            Some(existing) => {
                *existing = edge;
                true
            }
            None => {
                outgoing.push(edge);
                false
            }
        }
    }

    pub fn edge(&self, from: &DataType, to: &DataType) -> Option<&ConversionEdge> {
        let from_index = *self.index.get(from)?;
        self.adjacency[from_index].iter().find(|e| &e.to == to)
    }

    /**
    Cheapest path from `source` to `target`, or `None` if `target` is unreachable.

    Dijkstra over the edge weights.  Among equally cheap paths, the one found first wins:
    a vertex's predecessor only changes on a strictly cheaper relaxation, and the queue pops
    equal costs in insertion order.  The result is therefore fixed for a fixed insertion order.

    Weights are expected to be non-negative.  Negative weights are accepted but the result is
    unspecified.
    */
    pub fn shortest_path(&self, source: &DataType, target: &DataType) -> Option<ConversionPath> {
        if source == target {
            return Some(ConversionPath::identity());
        }
        let source_index = *self.index.get(source)?;
        let target_index = *self.index.get(target)?;

        let n = self.vertices.len();
        let mut distance: Vec<Option<i64>> = vec![None; n];
        //(vertex, index into that vertex's adjacency list)
        let mut previous: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut settled = vec![false; n];
        let mut queue = BinaryHeap::new();
        let mut sequence: u64 = 0;

        distance[source_index] = Some(0);
        queue.push(Reverse((0i64, sequence, source_index)));

        while let Some(Reverse((cost, _, vertex))) = queue.pop() {
            if settled[vertex] {
                continue;
            }
            settled[vertex] = true;
            if vertex == target_index {
                break;
            }
            for (edge_index, edge) in self.adjacency[vertex].iter().enumerate() {
                let next = self.index[&edge.to];
                let next_cost = cost + edge.weight;
                if distance[next].is_none_or(|known| next_cost < known) {
                    distance[next] = Some(next_cost);
                    previous[next] = Some((vertex, edge_index));
                    sequence += 1;
                    queue.push(Reverse((next_cost, sequence, next)));
                }
            }
        }

        let cost = distance[target_index]?;
        let mut edges = Vec::new();
        let mut at = target_index;
        while let Some((from, edge_index)) = previous[at] {
            edges.push(self.adjacency[from][edge_index].clone());
            at = from;
            if at == source_index {
                break;
            }
        }
        edges.reverse();
        Some(ConversionPath { edges, cost })
    }
}
