//! Reverse Cuthill-McKee ordering
//!
//! Breadth-first numbering from a pseudo-peripheral node, visiting neighbours
//! by increasing degree, then reversed. Each connected component is numbered
//! in turn. The result narrows the band of `A + Aᵀ`.

use super::{AdjacencyGraph, Permutation};
use crate::error::Result;
use crate::sparse::csc::CscMatrix;
use crate::sparse::kernels::Workspace;

/// Reverse Cuthill-McKee ordering of a square matrix
pub fn rcm(a: &CscMatrix) -> Result<Permutation> {
    let graph = AdjacencyGraph::symmetric(a)?;
    let n = graph.len();
    let mut numbered = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut visited = Workspace::new(n);
    let mut neighbors = Vec::new();

    // Components are started from their lowest-degree node
    let mut starts: Vec<usize> = (0..n).collect();
    starts.sort_by_key(|&i| (graph.degree(i), i));

    for start in starts {
        if numbered[start] {
            continue;
        }
        let (root, _) = graph.pseudo_peripheral(start, |_| true, &mut visited);

        let head = order.len();
        numbered[root] = true;
        order.push(root);
        let mut cursor = head;
        while cursor < order.len() {
            let i = order[cursor];
            cursor += 1;
            neighbors.clear();
            neighbors.extend(graph.neighbors(i).iter().copied().filter(|&j| !numbered[j]));
            neighbors.sort_by_key(|&j| (graph.degree(j), j));
            for &j in &neighbors {
                numbered[j] = true;
                order.push(j);
            }
        }
    }

    order.reverse();
    Ok(Permutation::from_vec_unchecked(order))
}
