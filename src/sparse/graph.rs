//! Graph algorithms on sparse structure: elimination tree, postorder and
//! reachability
//!
//! The column pattern of a square CSC matrix `G` is read as a directed graph
//! with an edge `j -> i` for every entry `G[i, j]`.

use super::csc::CscMatrix;
use super::kernels::{Workspace, cs_mark, cs_marked, cs_unflip};

/// Elimination tree of `A` (or of `AᵀA` when `ata` is set, without forming it)
///
/// For the symmetric case only the upper triangle of `A` is used. Returns
/// `parent[j]`, `None` for roots.
pub fn etree(a: &CscMatrix, ata: bool) -> Vec<Option<usize>> {
    let (m, n) = a.shape();
    let mut parent = vec![None; n];
    let mut ancestor: Vec<Option<usize>> = vec![None; n];
    let mut prev: Vec<Option<usize>> = if ata { vec![None; m] } else { Vec::new() };

    for k in 0..n {
        for p in a.col_range(k) {
            let row = a.row_indices[p];
            let mut i = if ata { prev[row] } else { Some(row) };
            // Walk from i to the root of its subtree, compressing the path to k
            while let Some(node) = i {
                if node >= k {
                    break;
                }
                let next = ancestor[node];
                ancestor[node] = Some(k);
                if next.is_none() {
                    parent[node] = Some(k);
                }
                i = next;
            }
            if ata {
                prev[row] = Some(k);
            }
        }
    }
    parent
}

/// Postorder of a forest given by `parent`; children are visited in
/// increasing index order
pub fn postorder(parent: &[Option<usize>]) -> Vec<usize> {
    let n = parent.len();
    let mut head: Vec<Option<usize>> = vec![None; n];
    let mut next: Vec<Option<usize>> = vec![None; n];
    // Reverse traversal so each child list comes out in increasing order
    for j in (0..n).rev() {
        if let Some(p) = parent[j] {
            next[j] = head[p];
            head[p] = Some(j);
        }
    }

    let mut post = Vec::with_capacity(n);
    let mut stack = Vec::new();
    for root in 0..n {
        if parent[root].is_some() {
            continue;
        }
        stack.push(root);
        while let Some(&node) = stack.last() {
            match head[node] {
                Some(child) => {
                    head[node] = next[child];
                    stack.push(child);
                }
                None => {
                    stack.pop();
                    post.push(node);
                }
            }
        }
    }
    post
}

/// Nodes reachable in `G` from the rows in `b_rows`, in topological order
///
/// This is the nonzero pattern of `x` in `G x = b` for a triangular `G`.
/// `pinv` maps a node to the column of `G` holding its out-edges; nodes whose
/// entry is `None` have no out-edges (the not-yet-pivotal rows of a
/// left-looking factorization).
pub fn reach(g: &CscMatrix, b_rows: &[usize], pinv: Option<&[Option<usize>]>) -> Vec<usize> {
    reach_raw(&g.col_ptrs, &g.row_indices, g.rows.max(g.cols), b_rows, pinv)
}

/// [`reach`] over raw column arrays; `col_ptrs` may cover only the first
/// columns of a factor still being built, `n` is the number of nodes
pub(crate) fn reach_raw(
    col_ptrs: &[usize],
    row_indices: &[usize],
    n: usize,
    b_rows: &[usize],
    pinv: Option<&[Option<usize>]>,
) -> Vec<usize> {
    // Column pointers double as visit marks via cs_flip; padded to n + 1
    let last = col_ptrs.last().copied().unwrap_or(0);
    let mut w: Vec<isize> = col_ptrs
        .iter()
        .copied()
        .chain(std::iter::repeat(last))
        .take(n.max(col_ptrs.len().saturating_sub(1)) + 1)
        .map(|p| p as isize)
        .collect();
    let mut finished = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut pstack: Vec<usize> = Vec::new();

    for &start in b_rows {
        if start >= n || cs_marked(&w, start) {
            continue;
        }
        // Iterative depth-first search
        stack.clear();
        pstack.clear();
        stack.push(start);
        pstack.push(0);
        while let Some(&j) = stack.last() {
            let top = stack.len() - 1;
            let col = match pinv {
                Some(pinv) => pinv[j],
                None => Some(j),
            }
            .filter(|&c| c + 1 < col_ptrs.len());
            if !cs_marked(&w, j) {
                cs_mark(&mut w, j);
                pstack[top] = col.map_or(0, |c| cs_unflip(w[c]) as usize);
            }
            let end = col.map_or(0, |c| cs_unflip(w[c + 1]) as usize);

            let mut descended = false;
            for p in pstack[top]..end {
                let i = row_indices[p];
                if cs_marked(&w, i) {
                    continue;
                }
                pstack[top] = p;
                stack.push(i);
                pstack.push(0);
                descended = true;
                break;
            }
            if !descended {
                stack.pop();
                pstack.pop();
                finished.push(j);
            }
        }
    }

    for &j in &finished {
        cs_mark(&mut w, j);
    }
    finished.reverse();
    finished
}

/// Nonzero pattern of row `k` of the Cholesky factor `L`, excluding the
/// diagonal
///
/// Uses the upper triangle of column `k` of `A` and the elimination tree.
/// Nodes come out with every node before its ancestors, the order an
/// up-looking triangular solve needs.
pub fn ereach(a: &CscMatrix, k: usize, parent: &[Option<usize>], ws: &mut Workspace) -> Vec<usize> {
    ws.next_generation();
    ws.mark(k);
    let mut rev = Vec::new();
    let mut path = Vec::new();
    for p in a.col_range(k) {
        let mut i = a.row_indices[p];
        if i > k {
            continue;
        }
        path.clear();
        // Climb the tree until a node already on a path
        loop {
            if !ws.mark(i) {
                break;
            }
            path.push(i);
            match parent[i] {
                Some(next) => i = next,
                None => break,
            }
        }
        rev.extend(path.iter().rev());
    }
    rev.reverse();
    rev
}
