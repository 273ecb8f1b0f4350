//! Currency graph built from stored rates and shortest path conversion.
//!
//! Every rate `A -> B = r` becomes two weighted edges, `A -> B` with weight
//! `r` and `B -> A` with weight `1 / r`. Paths are found with a breadth-first
//! search, so the result has the fewest hops. Ties are broken by the order in
//! which edges were first inserted, which follows the order of the input rates.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::model::{CurrencyId, ExchangeRate};

/// Outgoing edges of a single currency, kept in first-insertion order.
#[derive(Debug, Default, Clone)]
struct Edges {
    order: Vec<CurrencyId>,
    weights: HashMap<CurrencyId, Decimal>,
}

impl Edges {
    fn set(&mut self, to: CurrencyId, weight: Decimal) {
        if self.weights.insert(to, weight).is_none() {
            self.order.push(to);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (CurrencyId, Decimal)> + '_ {
        self.order.iter().map(|id| (*id, self.weights[id]))
    }
}

#[derive(Debug, Default, Clone)]
pub struct RateGraph {
    adj: HashMap<CurrencyId, Edges>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPath {
    pub path: Vec<CurrencyId>,
    pub rate: Decimal,
}

impl RateGraph {
    /// Builds the graph. When several rates exist for the same ordered pair,
    /// the last one yielded by `rates` wins.
    pub fn from_rates<'a>(rates: impl IntoIterator<Item = &'a ExchangeRate>) -> Self {
        let mut graph = RateGraph::default();
        for rate in rates {
            graph.add_rate(rate.from_currency, rate.to_currency, rate.rate);
        }
        graph
    }

    pub fn add_rate(&mut self, from: CurrencyId, to: CurrencyId, rate: Decimal) {
        // A zero rate has no inverse and cannot be composed
        let Some(inverse) = Decimal::ONE.checked_div(rate) else {
            return;
        };
        self.adj.entry(from).or_default().set(to, rate);
        self.adj.entry(to).or_default().set(from, inverse);
    }

    pub fn contains(&self, id: CurrencyId) -> bool {
        self.adj.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }
}

/// Finds the path with the fewest hops from `from` to `to` and the rate
/// obtained by multiplying the edge weights along it.
///
/// Returns `None` when either currency is missing from the graph or the two
/// are not connected.
pub fn find_path(graph: &RateGraph, from: CurrencyId, to: CurrencyId) -> Option<ConversionPath> {
    if !graph.contains(from) || !graph.contains(to) {
        return None;
    }

    // Each frontier entry points back to the entry it was discovered from
    let mut nodes: Vec<(CurrencyId, Option<usize>, Decimal)> = vec![(from, None, Decimal::ONE)];
    let mut queue = VecDeque::from([0usize]);
    let mut visited = HashSet::from([from]);

    while let Some(index) = queue.pop_front() {
        let (current, _, current_rate) = nodes[index];
        if current == to {
            return Some(ConversionPath {
                path: unwind(&nodes, index),
                rate: current_rate,
            });
        }

        for (neighbor, weight) in graph.adj[&current].iter() {
            if visited.contains(&neighbor) {
                continue;
            }
            // Overflowing products are treated as unreachable through this edge
            let Some(rate) = current_rate.checked_mul(weight) else {
                continue;
            };
            visited.insert(neighbor);
            nodes.push((neighbor, Some(index), rate));
            queue.push_back(nodes.len() - 1);
        }
    }

    None
}

fn unwind(nodes: &[(CurrencyId, Option<usize>, Decimal)], mut index: usize) -> Vec<CurrencyId> {
    let mut path = vec![nodes[index].0];
    while let Some(parent) = nodes[index].1 {
        path.push(nodes[parent].0);
        index = parent;
    }
    path.reverse();
    path
}
