//! Sparse complex matrices with explicit absence.
//!
//! Every builder returns [`Built`]: either a non-empty [`PhasorMatrix`] or
//! [`Absent`] when its row or column set is empty. Absence is an expected
//! outcome (an island without current measurements, a cycle without shunt
//! meters) and is handled by the assembler, never raised as an error.
//!
//! Entries are accumulated as triplets and converted to CSR, so repeated
//! `add` calls on the same cell sum.

use lse_core::{DenseMatrix, PhaseMatrix};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use thiserror::Error;

/// Named partitions of the estimation system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// A: current-flow measurements × observed buses
    CurrentFlowIncidence,
    /// II: directly observed nodes × observed buses
    VoltageIncidence,
    /// Y: series admittance per current-flow measurement
    SeriesAdmittance,
    /// Ys: line charging / magnetizing admittance at the measuring terminal
    LineShunt,
    /// Ysh: current-injection measurements × observed buses
    ShuntSusceptance,
    /// K = Y·A + Ys
    Series,
    /// R: measurement covariance
    Covariance,
    /// B: stacked system matrix
    System,
    /// M = (BᴴR⁻¹B)⁻¹BᴴR⁻¹
    Gain,
    /// K restricted to calibration measurements
    Calibration,
}

impl Partition {
    /// Short symbol used in logs and export file names.
    pub fn symbol(&self) -> &'static str {
        match self {
            Partition::CurrentFlowIncidence => "A",
            Partition::VoltageIncidence => "II",
            Partition::SeriesAdmittance => "Y",
            Partition::LineShunt => "Ys",
            Partition::ShuntSusceptance => "Ysh",
            Partition::Series => "K",
            Partition::Covariance => "R",
            Partition::System => "B",
            Partition::Gain => "M",
            Partition::Calibration => "Kcal",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Marker for a partition with zero rows or zero columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} partition is absent")]
pub struct Absent(pub Partition);

/// Outcome of a matrix builder.
pub type Built = Result<PhasorMatrix, Absent>;

/// Non-empty sparse complex matrix in CSR format.
#[derive(Debug, Clone)]
pub struct PhasorMatrix {
    partition: Partition,
    data: CsMat<Complex64>,
}

impl PhasorMatrix {
    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn rows(&self) -> usize {
        self.data.rows()
    }

    pub fn cols(&self) -> usize {
        self.data.cols()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// Entry (r, c); unstored entries are zero.
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.data.get(row, col).copied().unwrap_or_default()
    }

    /// Stored entries as (row, col, value), row by row.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, Complex64)> + '_ {
        self.data
            .outer_iterator()
            .enumerate()
            .flat_map(|(row, vec)| {
                vec.iter()
                    .map(move |(col, &v)| (row, col, v))
                    .collect::<Vec<_>>()
            })
    }

    /// Stored entries of one row as (col, value).
    pub fn row_entries(&self, row: usize) -> Vec<(usize, Complex64)> {
        self.data
            .outer_view(row)
            .map(|vec| vec.iter().map(|(col, &v)| (col, v)).collect())
            .unwrap_or_default()
    }

    pub fn to_dense(&self) -> DenseMatrix {
        let mut dense = vec![vec![Complex64::default(); self.cols()]; self.rows()];
        for (r, c, v) in self.entries() {
            dense[r][c] = v;
        }
        dense
    }

    /// Wrap a dense matrix, dropping exact zeros.
    pub fn from_dense(partition: Partition, dense: &[Vec<Complex64>]) -> Built {
        let rows = dense.len();
        let cols = dense.first().map_or(0, Vec::len);
        let mut builder = MatrixBuilder::new(partition, rows, cols);
        for (r, row) in dense.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                if v != Complex64::default() {
                    builder.add(r, c, v);
                }
            }
        }
        builder.finish()
    }

    /// Matrix product `self · rhs`, tagged as `partition`.
    pub fn mul(&self, rhs: &PhasorMatrix, partition: Partition) -> Built {
        debug_assert_eq!(self.cols(), rhs.rows(), "inner dimensions differ");
        let rhs_rows: Vec<_> = rhs.data.outer_iterator().collect();
        let mut builder = MatrixBuilder::new(partition, self.rows(), rhs.cols());
        for (i, row) in self.data.outer_iterator().enumerate() {
            for (k, &a) in row.iter() {
                for (j, &b) in rhs_rows[k].iter() {
                    builder.add(i, j, a * b);
                }
            }
        }
        builder.finish()
    }

    /// Element-wise sum of two matrices of equal shape.
    pub fn add(&self, rhs: &PhasorMatrix, partition: Partition) -> Built {
        debug_assert_eq!(self.shape(), rhs.shape(), "shapes differ");
        let mut builder = MatrixBuilder::new(partition, self.rows(), self.cols());
        for (r, c, v) in self.entries().chain(rhs.entries()) {
            builder.add(r, c, v);
        }
        builder.finish()
    }

    pub fn mul_vector(&self, x: &[Complex64]) -> Vec<Complex64> {
        self.data
            .outer_iterator()
            .map(|row| row.iter().map(|(c, &v)| v * x[c]).sum())
            .collect()
    }

    /// Conjugate transpose (Bᴴ).
    pub fn conj_transpose(&self, partition: Partition) -> Built {
        let mut builder = MatrixBuilder::new(partition, self.cols(), self.rows());
        for (r, c, v) in self.entries() {
            builder.add(c, r, v.conj());
        }
        builder.finish()
    }

    /// Remove rows and columns by index.
    ///
    /// Indices are removed in strictly descending order so that every
    /// removal addresses the original position.
    pub fn pruned(&self, drop_rows: &[usize], drop_cols: &[usize], partition: Partition) -> Built {
        let rows = surviving(self.rows(), drop_rows);
        let cols = surviving(self.cols(), drop_cols);

        let mut row_map = vec![None; self.rows()];
        for (new, &old) in rows.iter().enumerate() {
            row_map[old] = Some(new);
        }
        let mut col_map = vec![None; self.cols()];
        for (new, &old) in cols.iter().enumerate() {
            col_map[old] = Some(new);
        }

        let mut builder = MatrixBuilder::new(partition, rows.len(), cols.len());
        for (r, c, v) in self.entries() {
            if let (Some(nr), Some(nc)) = (row_map[r], col_map[c]) {
                builder.add(nr, nc, v);
            }
        }
        builder.finish()
    }
}

fn surviving(len: usize, drop: &[usize]) -> Vec<usize> {
    let mut kept: Vec<usize> = (0..len).collect();
    let mut drop: Vec<usize> = drop.iter().copied().filter(|&i| i < len).collect();
    drop.sort_unstable_by(|a, b| b.cmp(a));
    drop.dedup();
    for index in drop {
        kept.remove(index);
    }
    kept
}

/// Triplet accumulator for a [`PhasorMatrix`].
pub struct MatrixBuilder {
    partition: Partition,
    triplets: TriMat<Complex64>,
}

impl MatrixBuilder {
    pub fn new(partition: Partition, rows: usize, cols: usize) -> Self {
        Self {
            partition,
            triplets: TriMat::new((rows, cols)),
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: Complex64) {
        self.triplets.add_triplet(row, col, value);
    }

    /// Place `value` in positive-sequence mode, or `value · I₃` when `width` is 3.
    pub fn add_scaled_identity(&mut self, row: usize, col: usize, width: usize, value: Complex64) {
        for k in 0..width {
            self.add(row + k, col + k, value);
        }
    }

    /// Place a full 3×3 block with its top-left corner at (row, col).
    pub fn add_block(&mut self, row: usize, col: usize, block: &PhaseMatrix) {
        for i in 0..3 {
            for j in 0..3 {
                let v = block.get(i, j);
                if v != Complex64::default() {
                    self.add(row + i, col + j, v);
                }
            }
        }
    }

    pub fn finish(self) -> Built {
        let (rows, cols) = (self.triplets.rows(), self.triplets.cols());
        if rows == 0 || cols == 0 {
            return Err(Absent(self.partition));
        }
        Ok(PhasorMatrix {
            partition: self.partition,
            data: self.triplets.to_csr(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn sample() -> PhasorMatrix {
        let mut b = MatrixBuilder::new(Partition::Series, 2, 3);
        b.add(0, 0, c(1.0, 0.0));
        b.add(0, 2, c(0.0, 1.0));
        b.add(1, 1, c(2.0, -1.0));
        b.finish().unwrap()
    }

    #[test]
    fn empty_dimension_is_absent() {
        let err = MatrixBuilder::new(Partition::ShuntSusceptance, 0, 4).finish().unwrap_err();
        assert_eq!(err, Absent(Partition::ShuntSusceptance));
        assert!(MatrixBuilder::new(Partition::System, 3, 0).finish().is_err());
    }

    #[test]
    fn repeated_triplets_accumulate() {
        let mut b = MatrixBuilder::new(Partition::VoltageIncidence, 1, 1);
        b.add(0, 0, c(1.0, 0.0));
        b.add(0, 0, c(0.5, 0.5));
        assert_eq!(b.finish().unwrap().get(0, 0), c(1.5, 0.5));
    }

    #[test]
    fn product_and_sum() {
        let m = sample();
        let mut d = MatrixBuilder::new(Partition::SeriesAdmittance, 2, 2);
        d.add(0, 0, c(0.0, -10.0));
        d.add(1, 1, c(2.0, 0.0));
        let d = d.finish().unwrap();
        let p = d.mul(&m, Partition::Series).unwrap();
        assert_eq!(p.shape(), (2, 3));
        assert_eq!(p.get(0, 0), c(0.0, -10.0));
        assert_eq!(p.get(0, 2), c(10.0, 0.0));
        assert_eq!(p.get(1, 1), c(4.0, -2.0));

        let s = p.add(&m, Partition::Series).unwrap();
        assert_eq!(s.get(0, 0), c(1.0, -10.0));
        assert_eq!(s.get(1, 0), c(0.0, 0.0));
    }

    #[test]
    fn conjugate_transpose_and_vector_product() {
        let m = sample();
        let h = m.conj_transpose(Partition::System).unwrap();
        assert_eq!(h.shape(), (3, 2));
        assert_eq!(h.get(2, 0), c(0.0, -1.0));
        let y = m.mul_vector(&[c(1.0, 0.0), c(1.0, 0.0), c(1.0, 0.0)]);
        assert_eq!(y, vec![c(1.0, 1.0), c(2.0, -1.0)]);
    }

    #[test]
    fn pruning_keeps_relative_order() {
        let m = sample();
        let p = m.pruned(&[0], &[2, 0, 2], Partition::Calibration).unwrap();
        assert_eq!(p.shape(), (1, 1));
        assert_eq!(p.get(0, 0), c(2.0, -1.0));
        assert_eq!(p.partition(), Partition::Calibration);
        assert!(m.pruned(&[0, 1], &[], Partition::Calibration).is_err());
    }

    #[test]
    fn dense_round_trip_drops_zeros() {
        let m = sample();
        let back = PhasorMatrix::from_dense(Partition::Gain, &m.to_dense()).unwrap();
        assert_eq!(back.nnz(), 3);
        assert_eq!(back.row_entries(1), vec![(1, c(2.0, -1.0))]);
    }
}
