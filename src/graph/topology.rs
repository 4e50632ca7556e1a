use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::connections::Connections;
use crate::error::{FlowError, Result};
use crate::scope;
use crate::store::{NodeId, Registry};

/// One entry of a workflow being ordered.
#[derive(Debug, Clone)]
pub struct Unit {
    pub node: NodeId,
    /// Siblings executed on this unit's behalf (a driver's iteration set, recursively).
    pub covers: Vec<NodeId>,
    /// Siblings this unit reads without running them.
    pub after: Vec<NodeId>,
}

impl Unit {
    pub fn plain(node: NodeId) -> Self {
        Self { node, covers: Vec::new(), after: Vec::new() }
    }
}

/// Orders `units` so every connection source runs before its consumers.
///
/// Units with no forcing relationship keep their workflow position: Kahn's
/// algorithm always takes the ready unit with the lowest insertion index.
pub fn order_units(reg: &Registry, links: &Connections, scope: NodeId, units: &[Unit]) -> Result<Vec<NodeId>> {
    let count = units.len();

    // Members claim themselves before any driver claims them as covered.
    let mut cover: HashMap<NodeId, usize> = HashMap::with_capacity(count);
    for (i, unit) in units.iter().enumerate() {
        cover.entry(unit.node).or_insert(i);
    }
    for (i, unit) in units.iter().enumerate() {
        for &n in &unit.covers {
            cover.entry(n).or_insert(i);
        }
    }
    let locate = |node: NodeId| scope::sibling_in(reg, scope, node).and_then(|s| cover.get(&s).copied());

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(count, links.len());
    let idx: Vec<NodeIndex> = (0..count).map(|i| graph.add_node(i)).collect();

    for (src, dst) in links.iter() {
        let from = locate(reg.var_owner[src.index()]);
        let to = locate(reg.var_owner[dst.index()]);
        if let (Some(a), Some(b)) = (from, to) {
            if a != b {
                graph.update_edge(idx[a], idx[b], ());
            }
        }
    }
    for (i, unit) in units.iter().enumerate() {
        for &dep in &unit.after {
            if let Some(a) = locate(dep).filter(|a| *a != i) {
                graph.update_edge(idx[a], idx[i], ());
            }
        }
    }

    // 1. In-degrees
    let mut in_degree = vec![0usize; count];
    for i in 0..count {
        for next in graph.neighbors(idx[i]) {
            in_degree[next.index()] += 1;
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..count).filter(|i| in_degree[*i] == 0).map(Reverse).collect();

    // 2. Drain, lowest workflow position first
    let mut order = Vec::with_capacity(count);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(units[i].node);
        for next in graph.neighbors(idx[i]) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    if order.len() != count {
        let culprit = match toposort(&graph, None) {
            Err(cycle) => units[graph[cycle.node_id()]].node,
            Ok(_) => units[0].node,
        };
        return Err(FlowError::CyclicDependency {
            origin: reg.pathname(scope).into(),
            node: reg.pathname(culprit),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, NodeKind, Value, VarId};

    fn scope_with(n: usize) -> (Registry, Vec<NodeId>, Vec<(VarId, VarId)>) {
        let mut reg = Registry::with_root("top");
        let mut nodes = Vec::new();
        let mut ports = Vec::new();
        for i in 0..n {
            let c = reg.add_node(reg.root(), &format!("c{}", i + 1), NodeKind::Component).unwrap();
            let a = reg.add_var(c, "a", Direction::Input, Value::Int(0)).unwrap();
            let out = reg.add_var(c, "c", Direction::Output, Value::Int(0)).unwrap();
            nodes.push(c);
            ports.push((a, out));
        }
        (reg, nodes, ports)
    }

    fn names(reg: &Registry, order: &[NodeId]) -> Vec<String> {
        order.iter().map(|n| reg.pathname(*n)).collect()
    }

    #[test]
    fn test_unconnected_units_keep_insertion_order() {
        let (reg, nodes, ports) = scope_with(4);
        let mut links = Connections::default();
        links.insert(ports[3].1, ports[2].0).unwrap();
        let units: Vec<Unit> = nodes.iter().map(|n| Unit::plain(*n)).collect();
        let order = order_units(&reg, &links, reg.root(), &units).unwrap();
        assert_eq!(names(&reg, &order), ["c1", "c2", "c4", "c3"]);
    }

    #[test]
    fn test_covered_nodes_route_edges_to_their_driver() {
        let (reg, nodes, ports) = scope_with(3);
        let mut links = Connections::default();
        // c2 -> c1, but c2 is only reachable through the unit c3 covering it
        links.insert(ports[1].1, ports[0].0).unwrap();
        let units = vec![
            Unit::plain(nodes[0]),
            Unit { node: nodes[2], covers: vec![nodes[1]], after: vec![] },
        ];
        let order = order_units(&reg, &links, reg.root(), &units).unwrap();
        assert_eq!(names(&reg, &order), ["c3", "c1"]);
    }

    #[test]
    fn test_cycle_is_reported_before_anything_runs() {
        let (reg, nodes, ports) = scope_with(2);
        let mut links = Connections::default();
        links.insert(ports[0].1, ports[1].0).unwrap();
        links.insert(ports[1].1, ports[0].0).unwrap();
        let units: Vec<Unit> = nodes.iter().map(|n| Unit::plain(*n)).collect();
        let err = order_units(&reg, &links, reg.root(), &units).unwrap_err();
        assert!(matches!(err, FlowError::CyclicDependency { .. }));
    }
}
