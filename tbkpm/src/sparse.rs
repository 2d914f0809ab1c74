// SPDX-License-Identifier: AGPL-3.0-only

//! Compressed Sparse Row matrix format and SpMV.
//!
//! CSR is the layout shared by the system's hopping-id matrix, the
//! Hamiltonian, and the GPU SpMV kernel. Matrices are always stored
//! compressed: rows sorted by column, no duplicate entries.

use crate::scalar::Scalar;

/// Sparse matrix in Compressed Sparse Row format.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    pub rows: usize,
    pub cols: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub values: Vec<T>,
}

impl<T: Copy> CsrMatrix<T> {
    /// Empty `rows × cols` matrix.
    #[must_use]
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Assemble from `(row, col, value)` triplets.
    ///
    /// Entries are sorted by `(row, col)`; duplicates are merged with
    /// `combine(existing, new)`.
    pub fn from_triplets_with(
        rows: usize,
        cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
        combine: impl Fn(T, T) -> T,
    ) -> Self {
        triplets.sort_by_key(|&(r, c, _)| (r, c));

        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        row_ptr.push(0);

        let mut current_row = 0;
        let mut last: Option<(usize, usize)> = None;
        for (r, c, v) in triplets {
            while current_row < r {
                row_ptr.push(col_idx.len());
                current_row += 1;
            }
            if last == Some((r, c)) {
                if let Some(existing) = values.last_mut() {
                    *existing = combine(*existing, v);
                }
            } else {
                col_idx.push(c);
                values.push(v);
                last = Some((r, c));
            }
        }
        while row_ptr.len() < rows + 1 {
            row_ptr.push(col_idx.len());
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored entries of `row` as `(col, value)` pairs.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Stored value at `(row, col)`, if any.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .binary_search(&col)
            .ok()
            .map(|k| self.values[range.start + k])
    }

    /// All stored entries as `(row, col, value)` in storage order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).map(move |(c, v)| (r, c, v)))
    }

    /// Largest number of entries in any row.
    #[must_use]
    pub fn max_row_len(&self) -> usize {
        self.row_ptr
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    /// Whether every stored entry satisfies `row <= col`.
    #[must_use]
    pub fn is_upper_triangular(&self) -> bool {
        self.triplets().all(|(r, c, _)| r <= c)
    }

    /// Whether each row's columns are strictly increasing.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        (0..self.rows).all(|r| {
            self.col_idx[self.row_ptr[r]..self.row_ptr[r + 1]]
                .windows(2)
                .all(|w| w[0] < w[1])
        })
    }

    /// Apply `f` to every stored value, keeping the sparsity pattern.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> CsrMatrix<U> {
        CsrMatrix {
            rows: self.rows,
            cols: self.cols,
            row_ptr: self.row_ptr.clone(),
            col_idx: self.col_idx.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Symmetric permutation `P A Pᵀ` where `new_to_old[k]` is the old index of row/col `k`.
    #[must_use]
    pub fn permuted(&self, new_to_old: &[usize]) -> Self {
        let mut old_to_new = vec![0usize; new_to_old.len()];
        for (new, &old) in new_to_old.iter().enumerate() {
            old_to_new[old] = new;
        }

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        row_ptr.push(0);
        for &old_row in new_to_old {
            let mut entries: Vec<(usize, T)> =
                self.row(old_row).map(|(c, v)| (old_to_new[c], v)).collect();
            entries.sort_by_key(|&(c, _)| c);
            for (c, v) in entries {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows: self.rows,
            cols: self.cols,
            row_ptr,
            col_idx,
            values,
        }
    }
}

impl<T: Scalar> CsrMatrix<T> {
    /// Assemble from triplets, summing duplicates and dropping exact zeros.
    pub fn from_triplets(rows: usize, cols: usize, triplets: Vec<(usize, usize, T)>) -> Self {
        let summed = Self::from_triplets_with(rows, cols, triplets, |a, b| a + b);
        if summed.values.iter().all(|v| !v.is_zero()) {
            return summed;
        }
        let kept = summed.triplets().filter(|(_, _, v)| !v.is_zero()).collect();
        Self::from_triplets_with(rows, cols, kept, |a, _| a)
    }

    /// Sparse matrix-vector product over the leading `rows` rows: y = A * x.
    ///
    /// Rows at or beyond `rows` are left untouched.
    pub fn spmv_rows(&self, rows: usize, x: &[T], y: &mut [T]) {
        for (i, yi) in y.iter_mut().enumerate().take(rows) {
            let mut sum = T::zero();
            for j in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[j] * x[self.col_idx[j]];
            }
            *yi = sum;
        }
    }

    /// Sparse matrix-vector product: y = A * x.
    pub fn spmv(&self, x: &[T], y: &mut [T]) {
        self.spmv_rows(self.rows, x, y);
    }

    /// Whether `A == A†` up to `tol` (absolute, on squared magnitude of the difference).
    #[must_use]
    pub fn is_hermitian(&self, tol: f64) -> bool {
        self.triplets().all(|(r, c, v)| {
            let mirror = self.get(c, r).unwrap_or_else(T::zero);
            (v - mirror.conj()).norm_sqr() <= tol * tol
        })
    }
}
