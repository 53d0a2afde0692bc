//! Nested dissection ordering
//!
//! Splits the graph with the middle level of a breadth-first level structure
//! rooted at a pseudo-peripheral node, orders both halves recursively and
//! numbers the separator last. Disconnected pieces are ordered one after the
//! other. Pieces at or below [`LEAF_SIZE`] nodes, or too shallow to split,
//! keep their natural order.

use super::{AdjacencyGraph, Permutation};
use crate::error::Result;
use crate::sparse::csc::CscMatrix;
use crate::sparse::kernels::Workspace;

/// Subgraphs this small are not dissected further
pub const LEAF_SIZE: usize = 8;

enum Task {
    Dissect(Vec<usize>),
    Emit(Vec<usize>),
}

/// Nested dissection ordering of a square matrix
pub fn nested_dissection(a: &CscMatrix) -> Result<Permutation> {
    let graph = AdjacencyGraph::symmetric(a)?;
    let n = graph.len();
    let mut order = Vec::with_capacity(n);
    let mut member = vec![false; n];
    let mut visited = Workspace::new(n);

    let mut tasks = vec![Task::Dissect((0..n).collect())];
    while let Some(task) = tasks.pop() {
        let nodes = match task {
            Task::Emit(mut nodes) => {
                nodes.sort_unstable();
                order.extend(nodes);
                continue;
            }
            Task::Dissect(nodes) => nodes,
        };
        if nodes.len() <= LEAF_SIZE {
            tasks.push(Task::Emit(nodes));
            continue;
        }

        for &i in &nodes {
            member[i] = true;
        }
        let in_set = |i: usize| member[i];

        // Split off the component holding the first node
        let components = graph.bfs_levels(nodes[0], in_set, &mut visited);
        let component_size: usize = components.iter().map(Vec::len).sum();
        if component_size < nodes.len() {
            let (first, rest): (Vec<usize>, Vec<usize>) =
                nodes.iter().partition(|&&i| visited.is_marked(i));
            for &i in &nodes {
                member[i] = false;
            }
            tasks.push(Task::Dissect(rest));
            tasks.push(Task::Dissect(first));
            continue;
        }

        let (_, levels) = graph.pseudo_peripheral(nodes[0], in_set, &mut visited);
        for &i in &nodes {
            member[i] = false;
        }
        if levels.len() < 3 {
            tasks.push(Task::Emit(nodes));
            continue;
        }

        let mid = levels.len() / 2;
        let part_a: Vec<usize> = levels[..mid].concat();
        let part_b: Vec<usize> = levels[mid + 1..].concat();
        let separator = levels[mid].clone();
        tasks.push(Task::Emit(separator));
        tasks.push(Task::Dissect(part_b));
        tasks.push(Task::Dissect(part_a));
    }

    Ok(Permutation::from_vec_unchecked(order))
}

#[cfg(test)]
mod tests {
    use super::super::symbolic_fill;
    use super::super::tests::grid_laplacian;
    use super::*;

    #[test]
    fn test_nested_dissection_valid_permutation() {
        for (nx, ny) in [(1, 1), (3, 2), (9, 9), (20, 3)] {
            let a = grid_laplacian(nx, ny);
            let p = nested_dissection(&a).unwrap();
            let mut sorted = p.into_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..nx * ny).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_nested_dissection_separator_last_on_path() {
        // Path of 11 nodes: the root separator is a single middle node
        let a = grid_laplacian(11, 1);
        let p = nested_dissection(&a).unwrap();
        let last = *p.as_slice().last().unwrap();
        assert!((4..=6).contains(&last), "separator {last}");
    }

    #[test]
    fn test_nested_dissection_reduces_fill_on_grid() {
        let a = grid_laplacian(16, 16);
        let natural = symbolic_fill(&a, &Permutation::identity(256)).unwrap();
        let nd = symbolic_fill(&a, &nested_dissection(&a).unwrap()).unwrap();
        assert!(nd < natural, "nd fill {nd} vs natural {natural}");
    }

    #[test]
    fn test_nested_dissection_disconnected() {
        let a = CscMatrix::identity(20);
        let p = nested_dissection(&a).unwrap();
        assert_eq!(p.len(), 20);
    }
}
