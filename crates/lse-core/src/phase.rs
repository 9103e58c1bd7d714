//! Phase representation and 3×3 phase-coupled blocks.
//!
//! In [`PhaseMode::ThreePhase`] every entity occupies a 3×3 block (phases
//! A, B, C) instead of a single positive-sequence scalar. [`PhaseMatrix`]
//! is that block; it is small enough to invert in closed form.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Phase representation used for one estimation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    /// One positive-sequence value per entity
    #[default]
    PositiveSequence,
    /// One row/column per phase, 3×3 blocks per entity
    ThreePhase,
}

impl PhaseMode {
    /// Number of rows/columns each entity occupies.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            PhaseMode::PositiveSequence => 1,
            PhaseMode::ThreePhase => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseMode::PositiveSequence => "positive-sequence",
            PhaseMode::ThreePhase => "three-phase",
        }
    }
}

/// Phase label used in row/column headers.
pub const PHASE_LABELS: [&str; 3] = ["A", "B", "C"];

/// The rotation operator a = 1∠120°.
pub fn rotation_operator() -> Complex64 {
    Complex64::from_polar(1.0, 2.0 * std::f64::consts::FRAC_PI_3)
}

/// Positive-sequence component of three phase values: (Va + a·Vb + a²·Vc) / 3.
pub fn positive_sequence(phases: [Complex64; 3]) -> Complex64 {
    let a = rotation_operator();
    (phases[0] + a * phases[1] + a * a * phases[2]) / 3.0
}

/// Dense 3×3 complex block, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseMatrix(pub [[Complex64; 3]; 3]);

impl PhaseMatrix {
    pub fn zero() -> Self {
        Self::default()
    }

    /// `value` times the 3×3 identity.
    pub fn scalar(value: Complex64) -> Self {
        let mut m = Self::zero();
        for k in 0..3 {
            m.0[k][k] = value;
        }
        m
    }

    /// Balanced coupling block: `self_value` on the diagonal, `mutual` elsewhere.
    pub fn balanced(self_value: Complex64, mutual: Complex64) -> Self {
        let mut m = Self([[mutual; 3]; 3]);
        for k in 0..3 {
            m.0[k][k] = self_value;
        }
        m
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.0[row][col]
    }

    pub fn scale(&self, factor: Complex64) -> Self {
        let mut out = *self;
        for row in out.0.iter_mut() {
            for value in row.iter_mut() {
                *value *= factor;
            }
        }
        out
    }

    pub fn mul(&self, rhs: &PhaseMatrix) -> Self {
        let mut out = Self::zero();
        for i in 0..3 {
            for j in 0..3 {
                out.0[i][j] = (0..3).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        out
    }

    pub fn determinant(&self) -> Complex64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Inverse via the adjugate; `None` when the block is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.norm() < 1e-14 {
            return None;
        }
        let m = &self.0;
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        // Transposed cofactors
        let adj = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ];
        Some(Self(adj).scale(det.inv()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    #[test]
    fn test_width() {
        assert_eq!(PhaseMode::PositiveSequence.width(), 1);
        assert_eq!(PhaseMode::ThreePhase.width(), 3);
    }

    #[test]
    fn test_inverse_of_coupled_block() {
        let z = PhaseMatrix::balanced(Complex64::new(0.02, 0.3), Complex64::new(0.005, 0.1));
        let y = z.inverse().unwrap();
        let product = z.mul(&y);
        for i in 0..3 {
            for j in 0..3 {
                let expected = Complex64::new(if i == j { 1.0 } else { 0.0 }, 0.0);
                assert!(close(product.get(i, j), expected), "entry ({i},{j})");
            }
        }
    }

    #[test]
    fn test_singular_block_has_no_inverse() {
        let m = PhaseMatrix([[Complex64::new(1.0, 0.0); 3]; 3]);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_positive_sequence_of_balanced_set() {
        let a = rotation_operator();
        let va = Complex64::from_polar(1.0, 0.1);
        // Balanced ABC: Vb lags by 120°, Vc leads by 120°
        let v1 = positive_sequence([va, va * a * a, va * a]);
        assert!(close(v1, va));
    }

    #[test]
    fn test_positive_sequence_rejects_negative_sequence() {
        let a = rotation_operator();
        let va = Complex64::new(1.0, 0.0);
        let v1 = positive_sequence([va, va * a, va * a * a]);
        assert!(v1.norm() < 1e-12);
    }
}
