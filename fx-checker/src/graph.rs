//! Call graph and strongly connected components

use fx_core::{FunctionId, Program};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Directed caller → callee graph over a program's functions
#[derive(Debug, Clone)]
pub struct CallGraph {
    graph: DiGraph<FunctionId, ()>,
    nodes: Vec<NodeIndex>,
}

impl CallGraph {
    /// Calls to ids outside the program are skipped here and reported by the checker.
    pub fn build(program: &Program) -> Self {
        let mut graph = DiGraph::with_capacity(program.len(), program.len());
        let nodes: Vec<NodeIndex> = program.functions().map(|(id, _)| graph.add_node(id)).collect();

        for (caller, def) in program.functions() {
            for callee in def.body.callees() {
                if let Some(&target) = nodes.get(callee.index()) {
                    graph.update_edge(nodes[caller.index()], target, ());
                }
            }
        }

        CallGraph { graph, nodes }
    }

    /// Components in callee-first order: every component appears after the
    /// components it calls into.
    pub fn components(&self) -> Vec<Vec<FunctionId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                let mut ids: Vec<FunctionId> = component.into_iter().map(|n| self.graph[n]).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    pub fn calls(&self, caller: FunctionId, callee: FunctionId) -> bool {
        match (self.nodes.get(caller.index()), self.nodes.get(callee.index())) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_core::{EffectSet, Operation, Signature, Type};

    fn sig(name: &str) -> Signature {
        Signature::new(name, vec![], Type::Unit, EffectSet::pure())
    }

    #[test]
    fn test_components_are_callee_first() {
        let mut program = Program::new();
        let leaf = program.declare(sig("leaf"));
        let even = program.declare(sig("even"));
        let odd = program.declare(sig("odd"));
        let main = program.declare(sig("main"));
        program.define(even, Operation::Block(vec![Operation::call(odd, vec![]), Operation::call(leaf, vec![])]));
        program.define(odd, Operation::call(even, vec![]));
        program.define(main, Operation::call(even, vec![]));

        let graph = CallGraph::build(&program);
        let components = graph.components();
        assert_eq!(components.len(), 3);

        let position = |id: FunctionId| components.iter().position(|c| c.contains(&id)).unwrap();
        assert_eq!(components[position(even)], vec![even, odd]);
        assert!(position(leaf) < position(even));
        assert!(position(even) < position(main));
        assert!(graph.calls(odd, even));
        assert!(!graph.calls(leaf, main));
    }

    #[test]
    fn test_unknown_callees_are_skipped() {
        let mut program = Program::new();
        program.add_function(sig("f"), Operation::call(FunctionId(42), vec![]));
        let graph = CallGraph::build(&program);
        assert_eq!(graph.edge_count(), 0);
    }
}
