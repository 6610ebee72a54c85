//! Cycle detection over the module `uses` graph

use std::collections::{BTreeMap, BTreeSet};

/// Every cycle reached by a depth-first walk from each module in name
/// order. A cycle is returned once, rotated so that its smallest module
/// comes first, without repeating the start at the end.
pub fn find_cycles(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let mut found = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut stack = Vec::new();

    for module in graph.keys() {
        if !visited.contains(module.as_str()) {
            dfs_cycle(module, graph, &mut visited, &mut stack, &mut found);
        }
    }
    found.into_iter().collect()
}

fn dfs_cycle<'a>(
    node: &'a str,
    graph: &'a BTreeMap<String, BTreeSet<String>>,
    visited: &mut BTreeSet<&'a str>,
    stack: &mut Vec<&'a str>,
    found: &mut BTreeSet<Vec<String>>,
) {
    visited.insert(node);
    stack.push(node);

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            if neighbor == node {
                continue;
            }
            if let Some(start) = stack.iter().position(|n| *n == neighbor.as_str()) {
                found.insert(canonical(&stack[start..]));
            } else if !visited.contains(neighbor.as_str()) {
                dfs_cycle(neighbor, graph, visited, stack, found);
            }
        }
    }

    stack.pop();
}

fn canonical(cycle: &[&str]) -> Vec<String> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, name)| *name)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..]
        .iter()
        .chain(&cycle[..start])
        .map(|s| s.to_string())
        .collect()
}

/// `a -> b -> a`
pub fn render(cycle: &[String]) -> String {
    let mut path: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        path.push(first.as_str());
    }
    path.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> BTreeMap<String, BTreeSet<String>> {
        let mut g: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (from, to) in edges {
            g.entry(from.to_string()).or_default().insert(to.to_string());
            g.entry(to.to_string()).or_default();
        }
        g
    }

    #[test]
    fn test_two_module_cycle() {
        let cycles = find_cycles(&graph(&[("a", "b"), ("b", "a")]));
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(render(&cycles[0]), "a -> b -> a");
    }

    #[test]
    fn test_cycle_is_rotated_to_smallest_module() {
        let cycles = find_cycles(&graph(&[("x", "c"), ("c", "a"), ("a", "b"), ("b", "c")]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(render(&cycles[0]), "a -> b -> c -> a");
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let cycles = find_cycles(&graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]));
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_disjoint_cycles_all_reported() {
        let cycles = find_cycles(&graph(&[("a", "b"), ("b", "a"), ("m", "n"), ("n", "m")]));
        let rendered: Vec<_> = cycles.iter().map(|c| render(c)).collect();
        assert_eq!(rendered, vec!["a -> b -> a", "m -> n -> m"]);
    }

    #[test]
    fn test_self_edge_is_not_a_cycle() {
        assert!(find_cycles(&graph(&[("a", "a")])).is_empty());
    }

    #[test]
    fn test_deterministic_over_100_iterations() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("c", "d"), ("d", "c")]);
        let first = find_cycles(&g);
        for _ in 0..100 {
            assert_eq!(find_cycles(&g), first);
        }
    }
}
