//! Fill-reducing and bandwidth-reducing orderings
//!
//! Every ordering returns a [`Permutation`] `p` in the new-to-old convention:
//! position `k` of the reordered matrix holds row/column `p[k]` of the input.
//!
//! - [`amd`]: approximate minimum degree on `A + Aᵀ`, `AᵀA` or the identity
//! - [`rcm`]: reverse Cuthill-McKee, for banded solvers
//! - [`nested_dissection`]: recursive level-structure separators
//!
//! [`bandwidth`] and [`symbolic_fill`] measure the quality of an ordering.

mod amd;
mod nested_dissection;
mod rcm;

pub use amd::amd;
pub use nested_dissection::nested_dissection;
pub use rcm::rcm;

pub use super::permute::Permutation;

use super::csc::CscMatrix;
use super::graph::{ereach, etree};
use super::kernels::Workspace;
use super::permute::symperm;
use crate::error::{Error, Result};

/// Which graph [`amd`] orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmdMode {
    /// Identity ordering
    Natural,
    /// `A + Aᵀ`, for Cholesky (A must be square)
    #[default]
    Cholesky,
    /// `AᵀA` with dense rows of `A` dropped, for LU column ordering
    Lu,
    /// Full `AᵀA`, for QR column ordering
    Qr,
}

/// Threshold above which a node counts as dense: `max(16, 10 sqrt(n))`,
/// capped at `n - 2`
pub(crate) fn dense_threshold(n: usize) -> usize {
    let dense = (10.0 * (n as f64).sqrt()) as usize;
    dense.max(16).min(n.saturating_sub(2))
}

// ============================================================================
// Adjacency graph
// ============================================================================

/// Undirected graph in compressed adjacency form, without self loops
#[derive(Debug, Clone)]
pub(crate) struct AdjacencyGraph {
    ptrs: Vec<usize>,
    adj: Vec<usize>,
}

impl AdjacencyGraph {
    fn from_lists(mut lists: Vec<Vec<usize>>) -> Self {
        let mut ptrs = Vec::with_capacity(lists.len() + 1);
        let mut adj = Vec::new();
        ptrs.push(0);
        for list in &mut lists {
            list.sort_unstable();
            list.dedup();
            adj.extend_from_slice(list);
            ptrs.push(adj.len());
        }
        Self { ptrs, adj }
    }

    /// Graph of `A + Aᵀ`
    pub(crate) fn symmetric(a: &CscMatrix) -> Result<Self> {
        if a.rows != a.cols {
            return Err(Error::NotSquare {
                rows: a.rows,
                cols: a.cols,
            });
        }
        let mut lists = vec![Vec::new(); a.cols];
        for j in 0..a.cols {
            for p in a.col_range(j) {
                let i = a.row_indices[p];
                if i != j {
                    lists[i].push(j);
                    lists[j].push(i);
                }
            }
        }
        Ok(Self::from_lists(lists))
    }

    /// Graph of `AᵀA`: columns sharing a row are adjacent
    ///
    /// Rows with more than `dense_row_limit` entries are skipped.
    pub(crate) fn normal(a: &CscMatrix, dense_row_limit: Option<usize>) -> Self {
        let at = a.pattern().transpose();
        let limit = dense_row_limit.unwrap_or(usize::MAX);
        let mut ws = Workspace::new(a.cols);
        let mut lists = Vec::with_capacity(a.cols);
        for j in 0..a.cols {
            ws.next_generation();
            ws.mark(j);
            let mut list = Vec::new();
            for p in a.col_range(j) {
                let i = a.row_indices[p];
                let row = at.col_range(i);
                if row.len() > limit {
                    continue;
                }
                for q in row {
                    let k = at.row_indices[q];
                    if ws.mark(k) {
                        list.push(k);
                    }
                }
            }
            lists.push(list);
        }
        Self::from_lists(lists)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.ptrs.len() - 1
    }

    #[inline]
    pub(crate) fn neighbors(&self, i: usize) -> &[usize] {
        &self.adj[self.ptrs[i]..self.ptrs[i + 1]]
    }

    #[inline]
    pub(crate) fn degree(&self, i: usize) -> usize {
        self.ptrs[i + 1] - self.ptrs[i]
    }

    /// Breadth-first level structure rooted at `root`, restricted to nodes
    /// accepted by `member`
    pub(crate) fn bfs_levels<F>(&self, root: usize, member: F, visited: &mut Workspace) -> Vec<Vec<usize>>
    where
        F: Fn(usize) -> bool,
    {
        visited.next_generation();
        visited.mark(root);
        let mut levels = vec![vec![root]];
        loop {
            let mut next = Vec::new();
            if let Some(last) = levels.last() {
                for &i in last {
                    for &j in self.neighbors(i) {
                        if member(j) && visited.mark(j) {
                            next.push(j);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }
        levels
    }

    /// A pseudo-peripheral node of the component holding `start` (George-Liu)
    /// together with its level structure
    pub(crate) fn pseudo_peripheral<F>(
        &self,
        start: usize,
        member: F,
        visited: &mut Workspace,
    ) -> (usize, Vec<Vec<usize>>)
    where
        F: Fn(usize) -> bool + Copy,
    {
        let mut root = start;
        let mut levels = self.bfs_levels(root, member, visited);
        loop {
            let Some(candidate) = levels
                .last()
                .and_then(|last| last.iter().copied().min_by_key(|&i| (self.degree(i), i)))
            else {
                break;
            };
            let candidate_levels = self.bfs_levels(candidate, member, visited);
            if candidate_levels.len() > levels.len() {
                root = candidate;
                levels = candidate_levels;
            } else {
                break;
            }
        }
        (root, levels)
    }
}

// ============================================================================
// Quality measures
// ============================================================================

/// Maximum `|i - j|` over the stored entries
pub fn bandwidth(a: &CscMatrix) -> usize {
    let mut bw = 0;
    for j in 0..a.cols {
        for p in a.col_range(j) {
            bw = bw.max(a.row_indices[p].abs_diff(j));
        }
    }
    bw
}

/// Number of entries (diagonal included) in the Cholesky factor of
/// `P (A + Aᵀ) Pᵀ`, computed symbolically
pub fn symbolic_fill(a: &CscMatrix, perm: &Permutation) -> Result<usize> {
    if a.rows != a.cols {
        return Err(Error::NotSquare {
            rows: a.rows,
            cols: a.cols,
        });
    }
    let n = a.cols;
    if perm.len() != n {
        return Err(Error::dimension_mismatch("perm", &[n], &[perm.len()]));
    }

    // Upper triangle of the pattern of A + Aᵀ, diagonal included
    let mut triplets: Vec<(usize, usize, f64)> = (0..n).map(|k| (k, k, 1.0)).collect();
    for j in 0..n {
        for p in a.col_range(j) {
            let i = a.row_indices[p];
            triplets.push((i.min(j), i.max(j), 1.0));
        }
    }
    let upper = CscMatrix::from_triplets(n, n, &triplets)?;
    let c = symperm(&upper, Some(perm.inverse().as_slice()))?;

    let parent = etree(&c, false);
    let mut ws = Workspace::new(n);
    let mut count = 0;
    for k in 0..n {
        count += ereach(&c, k, &parent, &mut ws).len() + 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn grid_laplacian(nx: usize, ny: usize) -> CscMatrix {
        let idx = |x: usize, y: usize| y * nx + x;
        let mut t = Vec::new();
        for y in 0..ny {
            for x in 0..nx {
                let i = idx(x, y);
                t.push((i, i, 4.0));
                if x + 1 < nx {
                    t.push((i, idx(x + 1, y), -1.0));
                    t.push((idx(x + 1, y), i, -1.0));
                }
                if y + 1 < ny {
                    t.push((i, idx(x, y + 1), -1.0));
                    t.push((idx(x, y + 1), i, -1.0));
                }
            }
        }
        CscMatrix::from_triplets(nx * ny, nx * ny, &t).unwrap()
    }

    #[test]
    fn test_symmetric_graph_drops_self_loops() {
        let a = CscMatrix::from_triplets(3, 3, &[(0, 0, 1.0), (1, 0, 1.0), (2, 2, 1.0)]).unwrap();
        let g = AdjacencyGraph::symmetric(&a).unwrap();
        assert_eq!(g.neighbors(0), &[1]);
        assert_eq!(g.neighbors(1), &[0]);
        assert!(g.neighbors(2).is_empty());
    }

    #[test]
    fn test_normal_graph_links_columns_sharing_a_row() {
        // Row 0 touches columns 0 and 2; row 1 touches column 1 only
        let a = CscMatrix::from_triplets(2, 3, &[(0, 0, 1.0), (1, 1, 1.0), (0, 2, 1.0)]).unwrap();
        let g = AdjacencyGraph::normal(&a, None);
        assert_eq!(g.neighbors(0), &[2]);
        assert!(g.neighbors(1).is_empty());
        assert_eq!(g.neighbors(2), &[0]);

        let dropped = AdjacencyGraph::normal(&a, Some(1));
        assert!(dropped.neighbors(0).is_empty());
    }

    #[test]
    fn test_bandwidth() {
        let a = grid_laplacian(4, 3);
        assert_eq!(bandwidth(&a), 4);
        assert_eq!(bandwidth(&CscMatrix::identity(5)), 0);
    }

    #[test]
    fn test_symbolic_fill_tridiagonal_has_no_fill() {
        let a = grid_laplacian(6, 1);
        // L is bidiagonal: n diagonal entries and n - 1 below
        assert_eq!(symbolic_fill(&a, &Permutation::identity(6)).unwrap(), 11);
    }

    #[test]
    fn test_symbolic_fill_arrow_depends_on_order() {
        let n = 6;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 1.0));
            if i > 0 {
                t.push((0, i, 1.0));
                t.push((i, 0, 1.0));
            }
        }
        let a = CscMatrix::from_triplets(n, n, &t).unwrap();
        // Hub first fills everything, hub last fills nothing
        let natural = symbolic_fill(&a, &Permutation::identity(n)).unwrap();
        let hub_last = Permutation::new(vec![1, 2, 3, 4, 5, 0]).unwrap();
        assert_eq!(natural, n * (n + 1) / 2);
        assert_eq!(symbolic_fill(&a, &hub_last).unwrap(), 2 * n - 1);
    }

    #[test]
    fn test_pseudo_peripheral_on_path_finds_an_end() {
        let a = grid_laplacian(7, 1);
        let g = AdjacencyGraph::symmetric(&a).unwrap();
        let mut ws = Workspace::new(7);
        let (root, levels) = g.pseudo_peripheral(3, |_| true, &mut ws);
        assert!(root == 0 || root == 6);
        assert_eq!(levels.len(), 7);
    }
}
