//! AMD: Approximate Minimum Degree ordering
//!
//! Eliminates nodes of a symmetric graph in order of (approximate) degree,
//! working on the quotient graph so that fill is never formed explicitly.
//!
//! # Quotient graph
//!
//! Each node is a *variable* (not yet eliminated) or an *element* (an
//! eliminated node standing for the clique it created). A variable keeps its
//! variable neighbours `A_i` and its element neighbours `E_i`; an element `e`
//! keeps its variables `L_e`. Eliminating pivot `p` merges `A_p` and the
//! `L_e` of every `e` in `E_p` into the new element `L_p`; those elements are
//! absorbed.
//!
//! # Approximate degree
//!
//! For `i` in `L_p` the external degree is bounded by
//!
//! ```text
//! d(i) = min(n_live - 1, d_old(i) + |L_p \ i|, |A_i \ i| + |L_p \ i| + Σ |L_e \ L_p|)
//! ```
//!
//! with the sum over the other elements of `i`. Elements with
//! `|L_e \ L_p| = 0` lie inside `L_p` and are absorbed on the spot.
//!
//! Nodes with degree above [`dense_threshold`] skip elimination and are
//! ordered last.
//!
//! # References
//!
//! Amestoy, P. R., Davis, T. A., & Duff, I. S. (1996).
//! "An approximate minimum degree ordering algorithm."
//! SIAM Journal on Matrix Analysis and Applications, 17(4), 886-905.

use super::{AdjacencyGraph, AmdMode, Permutation, dense_threshold};
use crate::error::{Error, Result};
use crate::sparse::csc::CscMatrix;
use crate::sparse::kernels::Workspace;

/// Node state during elimination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Variable,
    Element,
    Absorbed,
    Dense,
}

/// Doubly linked degree buckets
struct DegreeLists {
    head: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    prev: Vec<Option<usize>>,
    degree: Vec<usize>,
    min_degree: usize,
}

impl DegreeLists {
    fn new(n: usize) -> Self {
        Self {
            head: vec![None; n + 1],
            next: vec![None; n],
            prev: vec![None; n],
            degree: vec![0; n],
            min_degree: 0,
        }
    }

    fn insert(&mut self, i: usize, d: usize) {
        let d = d.min(self.head.len() - 1);
        self.degree[i] = d;
        self.prev[i] = None;
        self.next[i] = self.head[d];
        if let Some(h) = self.head[d] {
            self.prev[h] = Some(i);
        }
        self.head[d] = Some(i);
        self.min_degree = self.min_degree.min(d);
    }

    fn remove(&mut self, i: usize) {
        let d = self.degree[i];
        match self.prev[i] {
            Some(p) => self.next[p] = self.next[i],
            None => self.head[d] = self.next[i],
        }
        if let Some(n) = self.next[i] {
            self.prev[n] = self.prev[i];
        }
    }

    fn pop_min(&mut self) -> Option<usize> {
        while self.min_degree < self.head.len() && self.head[self.min_degree].is_none() {
            self.min_degree += 1;
        }
        let i = (*self.head.get(self.min_degree)?)?;
        self.remove(i);
        Some(i)
    }
}

/// Approximate minimum degree ordering of `a` for the graph chosen by `mode`
///
/// `Cholesky` needs a square matrix and orders rows and columns together;
/// `Lu` and `Qr` return a column ordering.
pub fn amd(a: &CscMatrix, mode: AmdMode) -> Result<Permutation> {
    let graph = match mode {
        AmdMode::Natural => return Ok(Permutation::identity(a.cols)),
        AmdMode::Cholesky => AdjacencyGraph::symmetric(a)?,
        AmdMode::Lu => AdjacencyGraph::normal(a, Some(dense_threshold(a.cols))),
        AmdMode::Qr => AdjacencyGraph::normal(a, None),
    };
    let order = amd_order(&graph);
    if order.len() != graph.len() {
        return Err(Error::Internal(format!(
            "amd ordered {} of {} nodes",
            order.len(),
            graph.len()
        )));
    }
    tracing::trace!(n = order.len(), ?mode, "amd ordering computed");
    Ok(Permutation::from_vec_unchecked(order))
}

pub(crate) fn amd_order(graph: &AdjacencyGraph) -> Vec<usize> {
    let n = graph.len();
    if n == 0 {
        return Vec::new();
    }

    let dense = dense_threshold(n);
    let mut state = vec![NodeState::Variable; n];
    let mut dense_nodes = Vec::new();
    for i in 0..n {
        if graph.degree(i) > dense {
            state[i] = NodeState::Dense;
            dense_nodes.push(i);
        }
    }

    let mut adj_vars: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            graph
                .neighbors(i)
                .iter()
                .copied()
                .filter(|&j| state[j] == NodeState::Variable)
                .collect()
        })
        .collect();
    let mut adj_elems: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut elem_vars: Vec<Vec<usize>> = vec![Vec::new(); n];

    let mut lists = DegreeLists::new(n);
    let mut n_live = 0;
    for i in 0..n {
        if state[i] == NodeState::Variable {
            lists.insert(i, adj_vars[i].len());
            n_live += 1;
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut in_lp = Workspace::new(n);
    let mut w_seen = Workspace::new(n);
    let mut w = vec![0usize; n];

    while let Some(p) = lists.pop_min() {
        order.push(p);
        n_live -= 1;

        // Form L_p
        in_lp.next_generation();
        in_lp.mark(p);
        let mut lp = Vec::new();
        for &j in &adj_vars[p] {
            if state[j] == NodeState::Variable && in_lp.mark(j) {
                lp.push(j);
            }
        }
        for e in std::mem::take(&mut adj_elems[p]) {
            if state[e] != NodeState::Element {
                continue;
            }
            for &j in &elem_vars[e] {
                if state[j] == NodeState::Variable && in_lp.mark(j) {
                    lp.push(j);
                }
            }
            state[e] = NodeState::Absorbed;
            elem_vars[e] = Vec::new();
        }
        state[p] = NodeState::Element;
        adj_vars[p] = Vec::new();

        // Prune: entries inside L_p are now reached through p
        for &i in &lp {
            adj_vars[i].retain(|&j| state[j] == NodeState::Variable && !in_lp.is_marked(j));
            adj_elems[i].retain(|&e| state[e] == NodeState::Element);
        }

        // w(e) = |L_e \ L_p|
        w_seen.next_generation();
        let mut touched = Vec::new();
        for &i in &lp {
            for &e in &adj_elems[i] {
                if w_seen.mark(e) {
                    w[e] = elem_vars[e].len();
                    touched.push(e);
                }
                w[e] -= 1;
            }
        }
        // Aggressive absorption
        for &e in &touched {
            if w[e] == 0 {
                state[e] = NodeState::Absorbed;
                elem_vars[e] = Vec::new();
            }
        }

        let lp_len = lp.len();
        for &i in &lp {
            adj_elems[i].retain(|&e| state[e] == NodeState::Element);
            let external: usize = adj_elems[i].iter().map(|&e| w[e]).sum();
            adj_elems[i].push(p);

            let old = lists.degree[i];
            let degree = (n_live - 1)
                .min(old + lp_len - 1)
                .min(adj_vars[i].len() + lp_len - 1 + external);
            lists.remove(i);
            lists.insert(i, degree);
        }
        elem_vars[p] = lp;
    }

    order.extend(dense_nodes);
    order
}

#[cfg(test)]
mod tests {
    use super::super::symbolic_fill;
    use super::super::tests::grid_laplacian;
    use super::*;

    fn is_permutation(p: &[usize], n: usize) -> bool {
        let mut sorted = p.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn test_amd_empty_and_natural() {
        let empty = CscMatrix::zeros(0, 0);
        assert!(amd(&empty, AmdMode::Cholesky).unwrap().is_empty());
        let a = grid_laplacian(3, 3);
        assert!(amd(&a, AmdMode::Natural).unwrap().is_identity());
    }

    #[test]
    fn test_amd_permutation_validity_all_modes() {
        let a = grid_laplacian(6, 5);
        for mode in [AmdMode::Cholesky, AmdMode::Lu, AmdMode::Qr] {
            let p = amd(&a, mode).unwrap();
            assert!(is_permutation(p.as_slice(), 30), "{mode:?}");
        }
    }

    #[test]
    fn test_amd_rectangular_column_ordering() {
        let a = CscMatrix::from_triplets(
            3,
            5,
            &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0), (0, 3, 1.0), (2, 4, 1.0), (1, 4, 1.0)],
        )
        .unwrap();
        let p = amd(&a, AmdMode::Qr).unwrap();
        assert!(is_permutation(p.as_slice(), 5));
        assert!(matches!(
            amd(&a, AmdMode::Cholesky),
            Err(Error::NotSquare { .. })
        ));
    }

    #[test]
    fn test_amd_puts_arrow_hub_last() {
        let n = 8;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 1.0));
            if i > 0 {
                t.push((0, i, 1.0));
                t.push((i, 0, 1.0));
            }
        }
        let a = CscMatrix::from_triplets(n, n, &t).unwrap();
        let p = amd(&a, AmdMode::Cholesky).unwrap();
        assert_eq!(*p.as_slice().last().unwrap(), 0);
        assert_eq!(symbolic_fill(&a, &p).unwrap(), 2 * n - 1);
    }

    #[test]
    fn test_amd_reduces_fill_on_grid() {
        let a = grid_laplacian(10, 10);
        let natural = symbolic_fill(&a, &Permutation::identity(100)).unwrap();
        let ordered = symbolic_fill(&a, &amd(&a, AmdMode::Cholesky).unwrap()).unwrap();
        assert!(ordered < natural, "amd fill {ordered} vs natural {natural}");
    }
}
