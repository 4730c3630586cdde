// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The registry of known conversions.

Learning is rare and happens mostly at startup; path lookups happen for every tile.  Paths
are therefore memoized per `(from, to)` pair, and the whole memo is dropped whenever an edge
is learned.
*/

use crate::conversion::graph::{ConversionGraph, ConversionPath};
use crate::conversion::{DataType, Destructor, Transform};
use std::collections::HashMap;
use std::sync::Mutex;

/// Width of one cost class.  An edge of class `p` weighs `(p + 1) * COST_CLASS_SCALE + multiplier`.
pub const COST_CLASS_SCALE: i64 = 100_000;
/// Largest accepted cost multiplier; larger values are clamped.
pub const MAX_COST_MULTIPLIER: i64 = 100_000;
/// Largest accepted cost class.
pub const MAX_COST_POWER: u32 = 7;

#[derive(Debug, Default)]
struct Inner {
    graph: ConversionGraph,
    copies: HashMap<DataType, Transform>,
    destructors: HashMap<DataType, Destructor>,
    //from -> to -> memoized result; `None` memoizes "no path"
    known: HashMap<DataType, HashMap<DataType, Option<ConversionPath>>>,
}

/**
Everything the conversion system knows.

One registry is created at the composition root (see [crate::Viewer]) and shared by handle.
All methods take `&self`.
*/
#[derive(Debug, Default)]
pub struct ConversionRegistry {
    inner: Mutex<Inner>,
}

impl ConversionRegistry {
    /// An empty registry with no conversions.
    pub fn new() -> Self {
        Self::default()
    }

    /**
    Learns that `transform` turns a `from` into a `to`.

    When `from == to` the transform is instead stored as the copy operator for that type,
    replacing any previous one.

    `cost_power` is the complexity class of the conversion, the exponent in O(n^p): 0 for
    reference lookups, 1 for linear work, and so on.  `cost_multiplier` orders conversions
    within a class and is clamped to `1..=MAX_COST_MULTIPLIER`.  Learning the same pair twice
    replaces the earlier transform.

    # Panics
    If `cost_power` is greater than [MAX_COST_POWER].
    */
    pub fn learn(&self, from: &DataType, to: &DataType, transform: Transform, cost_power: u32, cost_multiplier: i64) {
        assert!(
            cost_power <= MAX_COST_POWER,
            "Conversion cost power must be within 0..={MAX_COST_POWER}, got {cost_power}"
        );
        let mut inner = self.inner.lock().unwrap();
        if from == to {
            inner.copies.insert(from.clone(), transform);
            return;
        }
        let weight = (cost_power as i64 + 1) * COST_CLASS_SCALE + cost_multiplier.clamp(1, MAX_COST_MULTIPLIER);
        inner.graph.add_vertex(from);
        inner.graph.add_vertex(to);
        let replaced = inner.graph.add_edge(from, to, weight, transform);
        inner.known.clear();
        logwise::trace_sync!(
            "learned conversion {from} -> {to} weight {weight} replaced {replaced}",
            from = from.to_string(),
            to = to.to_string(),
            weight = weight,
            replaced = replaced
        );
    }

    /// Learns how to release values of type `ty`.  The last registration wins.
    pub fn learn_destroy(&self, ty: &DataType, destructor: Destructor) {
        self.inner.lock().unwrap().destructors.insert(ty.clone(), destructor);
    }

    /**
    Finds a path from `from` to one of the acceptable targets in `to`.

    Only targets whose path is already memoized compete, and the cheapest of those wins.  If
    none is memoized yet, the path to the *first* target is computed, memoized and returned.
    On a cold memo this is not necessarily the cheapest option over all targets; callers
    should list targets in order of preference.

    Returns an empty path when `from` is the chosen target, and `None` when no path exists.

    # Panics
    If `to` is empty.
    */
    pub fn get_conversion_path(&self, from: &DataType, to: &[DataType]) -> Option<ConversionPath> {
        assert!(!to.is_empty(), "get_conversion_path requires at least one target type");
        let mut inner = self.inner.lock().unwrap();
        let Inner { graph, known, .. } = &mut *inner;
        let known_from = known.entry(from.clone()).or_default();

        let mut best: Option<&ConversionPath> = None;
        for target in to {
            if let Some(Some(path)) = known_from.get(target) {
                if best.is_none_or(|b| path.cost() < b.cost()) {
                    best = Some(path);
                }
            }
        }
        if let Some(best) = best {
            return Some(best.clone());
        }

        let first = &to[0];
        if let Some(memoized) = known_from.get(first) {
            return memoized.clone();
        }
        let computed = graph.shortest_path(from, first);
        known_from.insert(first.clone(), computed.clone());
        computed
    }

    /// Whether `ty` takes part in any learned conversion.
    pub fn exists_type(&self, ty: &DataType) -> bool {
        self.inner.lock().unwrap().graph.contains(ty)
    }

    /// Every type that takes part in a learned conversion, in learning order.
    pub fn known_types(&self) -> Vec<DataType> {
        self.inner.lock().unwrap().graph.vertices().to_vec()
    }

    pub(crate) fn copy_operator(&self, ty: &DataType) -> Option<Transform> {
        self.inner.lock().unwrap().copies.get(ty).cloned()
    }

    pub(crate) fn destructor(&self, ty: &DataType) -> Option<Destructor> {
        self.inner.lock().unwrap().destructors.get(ty).cloned()
    }
}
