//! Tarjan's strongly connected components.
//!
//! Over a call graph a component is a group of mutually recursive subroutines. A
//! subroutine outside any cycle is a component of its own, with or without a self call.
//!
//! The walk keeps its frames on the heap, so a long call chain cannot overflow the
//! native stack.

use std::collections::HashSet;

use crate::utils::graph::{NodeId, Successors};

/// Groups the nodes of `graph` into strongly connected components.
///
/// Components come out callee-first: when an edge leads from component `X` to component
/// `Y`, `Y` is listed before `X`. Within a component, nodes appear in the order they were
/// popped from the Tarjan stack.
///
/// Runs in O(V + E).
///
/// # Examples
///
/// ```rust,ignore
/// // even <-> odd, main -> even
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let main = graph.add_node("main");
/// let even = graph.add_node("even");
/// let odd = graph.add_node("odd");
/// graph.add_edge(main, even, ())?;
/// graph.add_edge(even, odd, ())?;
/// graph.add_edge(odd, even, ())?;
///
/// let sccs = strongly_connected_components(&graph);
/// assert_eq!(sccs, vec![vec![odd, even], vec![main]]);
/// ```
pub fn strongly_connected_components<G>(graph: &G) -> Vec<Vec<NodeId>>
where
    G: Successors,
{
    let node_count = graph.node_count();
    if node_count == 0 {
        return Vec::new();
    }

    let mut state = TarjanState::new(node_count);
    for node in (0..node_count).map(NodeId::new) {
        if state.index[node.index()].is_none() {
            state.strongconnect(graph, node);
        }
    }

    state.sccs
}

struct TarjanState {
    /// Discovery order, `None` until visited
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<NodeId>,
    next_index: usize,
    sccs: Vec<Vec<NodeId>>,
}

impl TarjanState {
    fn new(nodes: usize) -> Self {
        Self {
            index: vec![None; nodes],
            lowlink: vec![0; nodes],
            on_stack: vec![false; nodes],
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn visit(&mut self, v: NodeId) {
        self.index[v.index()] = Some(self.next_index);
        self.lowlink[v.index()] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v.index()] = true;
    }

    fn strongconnect<G: Successors>(&mut self, graph: &G, root: NodeId) {
        // Each frame is a node plus its not yet examined successors.
        let mut frames: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        self.visit(root);
        frames.push((root, graph.successors(root).collect()));

        while let Some((v, pending)) = frames.last_mut() {
            let v = *v;
            if let Some(w) = pending.pop() {
                match self.index[w.index()] {
                    None => {
                        self.visit(w);
                        frames.push((w, graph.successors(w).collect()));
                    }
                    Some(w_index) if self.on_stack[w.index()] => {
                        self.lowlink[v.index()] = self.lowlink[v.index()].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some((parent, _)) = frames.last() {
                let parent = parent.index();
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v.index()]);
            }

            if Some(self.lowlink[v.index()]) == self.index[v.index()] {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w.index()] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
        }
    }
}

/// Collapses each component of `sccs` to one node.
///
/// # Arguments
///
/// * `graph` - The graph the components were computed on
/// * `sccs` - Output of [`strongly_connected_components`]
///
/// # Returns
///
/// The component index of every node, and the deduplicated edges between distinct
/// components in first-seen order.
pub fn condensation<G>(graph: &G, sccs: &[Vec<NodeId>]) -> (Vec<usize>, Vec<(usize, usize)>)
where
    G: Successors,
{
    let mut component = vec![0; graph.node_count()];
    for (index, members) in sccs.iter().enumerate() {
        for &node in members {
            component[node.index()] = index;
        }
    }

    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for (node, &from) in component.iter().enumerate() {
        for successor in graph.successors(NodeId::new(node)) {
            let to = component[successor.index()];
            if from != to && seen.insert((from, to)) {
                edges.push((from, to));
            }
        }
    }
    (component, edges)
}

#[cfg(test)]
mod tests {
    use crate::utils::graph::{
        algorithms::scc::{condensation, strongly_connected_components},
        DirectedGraph, NodeId,
    };

    fn calls(
        names: &[&'static str],
        edges: &[(usize, usize)],
    ) -> (DirectedGraph<&'static str, ()>, Vec<NodeId>) {
        let mut graph = DirectedGraph::new();
        let nodes: Vec<NodeId> = names.iter().map(|name| graph.add_node(*name)).collect();
        for &(from, to) in edges {
            graph.add_edge(nodes[from], nodes[to], ()).unwrap();
        }
        (graph, nodes)
    }

    #[test]
    fn test_no_subroutines() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert!(strongly_connected_components(&graph).is_empty());
    }

    #[test]
    fn test_self_recursive_subroutine_is_one_component() {
        let (graph, nodes) = calls(&["main", "loop"], &[(0, 1), (1, 1)]);
        assert_eq!(
            strongly_connected_components(&graph),
            vec![vec![nodes[1]], vec![nodes[0]]]
        );
    }

    #[test]
    fn test_call_chain_is_callee_first() {
        let (graph, nodes) = calls(&["main", "helper", "leaf"], &[(0, 1), (1, 2)]);
        assert_eq!(
            strongly_connected_components(&graph),
            vec![vec![nodes[2]], vec![nodes[1]], vec![nodes[0]]]
        );
    }

    #[test]
    fn test_mutual_recursion_groups() {
        // main -> even <-> odd -> print <-> format
        let (graph, nodes) = calls(
            &["main", "even", "odd", "print", "format"],
            &[(0, 1), (1, 2), (2, 1), (2, 3), (3, 4), (4, 3)],
        );
        let mut sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 3);
        for scc in &mut sccs {
            scc.sort();
        }
        assert_eq!(
            sccs,
            vec![
                vec![nodes[3], nodes[4]],
                vec![nodes[1], nodes[2]],
                vec![nodes[0]]
            ]
        );
    }

    #[test]
    fn test_deep_call_chain() {
        let names = vec!["sub"; 20_000];
        let edges: Vec<(usize, usize)> = (1..names.len()).map(|i| (i - 1, i)).collect();
        let (graph, nodes) = calls(&names, &edges);

        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 20_000);
        assert_eq!(sccs[0], vec![nodes[19_999]]);
        assert_eq!(sccs[19_999], vec![nodes[0]]);
    }

    #[test]
    fn test_condensation_merges_parallel_calls() {
        // main calls both halves of a recursive pair, each of which calls leaf
        let (graph, nodes) = calls(
            &["main", "even", "odd", "leaf"],
            &[(0, 1), (0, 2), (1, 2), (2, 1), (1, 3), (2, 3)],
        );
        let sccs = strongly_connected_components(&graph);
        let (component, edges) = condensation(&graph, &sccs);

        assert_eq!(component[nodes[1].index()], component[nodes[2].index()]);
        let (main, pair, leaf) = (
            component[nodes[0].index()],
            component[nodes[1].index()],
            component[nodes[3].index()],
        );
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&(main, pair)));
        assert!(edges.contains(&(pair, leaf)));
    }
}
