//! Low-level sparse kernels: index marking, prefix sums, scatter/gather and
//! entry filtering
//!
//! # Marking
//!
//! Graph traversals mark a node by flipping its (non-negative) index into the
//! negative range: `cs_flip(i) = -i - 2`. The flip is an involution and maps
//! every `i >= 0` to a value `<= -2`, so `-1` stays free as a "none" sentinel.

use super::csc::CscMatrix;

/// Flip a non-negative index into the marked range
#[inline]
pub const fn cs_flip(i: isize) -> isize {
    -i - 2
}

/// Undo [`cs_flip`] on a marked value; unmarked values pass through
#[inline]
pub const fn cs_unflip(i: isize) -> isize {
    if i < 0 { cs_flip(i) } else { i }
}

/// Whether `w[j]` is marked
#[inline]
pub fn cs_marked(w: &[isize], j: usize) -> bool {
    w[j] < 0
}

/// Mark `w[j]` (toggles: marking twice unmarks)
#[inline]
pub fn cs_mark(w: &mut [isize], j: usize) {
    w[j] = cs_flip(w[j]);
}

/// Exclusive prefix sum of `counts` into `ptrs`, also copied back to `counts`
///
/// `ptrs` has length `counts.len() + 1`; returns the total.
pub fn cumsum(ptrs: &mut [usize], counts: &mut [usize]) -> usize {
    debug_assert_eq!(ptrs.len(), counts.len() + 1);
    let mut total = 0;
    for (p, c) in ptrs.iter_mut().zip(counts.iter_mut()) {
        *p = total;
        total += *c;
        *c = *p;
    }
    ptrs[counts.len()] = total;
    total
}

// ============================================================================
// Generation-marked workspace
// ============================================================================

/// Dense accumulator with O(1) reset
///
/// A slot belongs to the current pass when its mark equals the current
/// generation; bumping the generation forgets every slot at once. Values in
/// stale slots are garbage and are overwritten on first touch.
#[derive(Debug, Clone)]
pub struct Workspace {
    marks: Vec<usize>,
    values: Vec<f64>,
    generation: usize,
}

impl Workspace {
    /// Workspace over `n` slots
    pub fn new(n: usize) -> Self {
        Self {
            marks: vec![0; n],
            values: vec![0.0; n],
            generation: 1,
        }
    }

    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether the workspace has no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Start a new pass, forgetting all marks
    #[inline]
    pub fn next_generation(&mut self) {
        if self.generation == usize::MAX {
            self.marks.fill(0);
            self.generation = 0;
        }
        self.generation += 1;
    }

    /// Whether slot `i` was touched in the current pass
    #[inline]
    pub fn is_marked(&self, i: usize) -> bool {
        self.marks[i] == self.generation
    }

    /// Mark slot `i`; returns `true` if it was not yet marked
    #[inline]
    pub fn mark(&mut self, i: usize) -> bool {
        if self.marks[i] == self.generation {
            false
        } else {
            self.marks[i] = self.generation;
            true
        }
    }

    /// Current value of slot `i` (zero if untouched this pass)
    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        if self.is_marked(i) { self.values[i] } else { 0.0 }
    }

    /// Overwrite slot `i`, marking it
    #[inline]
    pub fn set(&mut self, i: usize, v: f64) {
        self.marks[i] = self.generation;
        self.values[i] = v;
    }

    /// Scatter `beta * A[:, j]` into the workspace, accumulating
    ///
    /// First-touch rows are appended to `pattern`; rows already marked in this
    /// pass accumulate instead of overwriting. For a pattern matrix the
    /// structure is recorded and values are left at zero. Returns the number
    /// of entries visited.
    pub fn scatter(&mut self, a: &CscMatrix, j: usize, beta: f64, pattern: &mut Vec<usize>) -> usize {
        let range = a.col_range(j);
        let visited = range.len();
        let values = a.values();
        for p in range {
            let i = a.row_indices[p];
            let v = values.map_or(0.0, |vals| beta * vals[p]);
            if self.mark(i) {
                pattern.push(i);
                self.values[i] = v;
            } else {
                self.values[i] += v;
            }
        }
        visited
    }

    /// Read back the values for `pattern`, in pattern order
    pub fn gather(&self, pattern: &[usize]) -> Vec<f64> {
        pattern.iter().map(|&i| self.value(i)).collect()
    }
}

// ============================================================================
// Entry filtering
// ============================================================================

/// Keep the entries for which `keep(row, col, value)` holds, compacting in
/// place; returns the number of entries kept
///
/// A pattern matrix passes `1.0` as the value.
pub fn fkeep<F>(a: &mut CscMatrix, mut keep: F) -> usize
where
    F: FnMut(usize, usize, f64) -> bool,
{
    let mut nz = 0;
    let mut start = a.col_ptrs[0];
    for j in 0..a.cols {
        let end = a.col_ptrs[j + 1];
        a.col_ptrs[j] = nz;
        for p in start..end {
            let i = a.row_indices[p];
            let v = a.values.as_ref().map_or(1.0, |vals| vals[p]);
            if keep(i, j, v) {
                a.row_indices[nz] = i;
                if let Some(vals) = a.values.as_mut() {
                    vals[nz] = v;
                }
                nz += 1;
            }
        }
        start = end;
    }
    a.col_ptrs[a.cols] = nz;
    a.row_indices.truncate(nz);
    if let Some(vals) = a.values.as_mut() {
        vals.truncate(nz);
    }
    nz
}

/// Remove explicitly stored zeros; returns how many were dropped
pub fn dropzeros(a: &mut CscMatrix) -> usize {
    let before = a.nnz();
    fkeep(a, |_, _, v| v != 0.0);
    before - a.nnz()
}

/// Remove entries with `|value| < tolerance`; returns how many were dropped
pub fn drop_tolerance(a: &mut CscMatrix, tolerance: f64) -> usize {
    let before = a.nnz();
    fkeep(a, |_, _, v| v.abs() >= tolerance);
    before - a.nnz()
}
