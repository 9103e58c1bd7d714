use faer::{complex_native::c64, prelude::*, solvers::PartialPivLu, Mat};
use num_complex::Complex64;

use crate::error::{LseError, LseResult};

/// Dense complex matrix, row-major.
pub type DenseMatrix = Vec<Vec<Complex64>>;

/// Trait for inverting the dense weighted normal matrix (BᴴR⁻¹B).
///
/// Implementations must report a singular matrix as
/// [`LseError::SingularSystem`] instead of returning NaN/Inf entries.
pub trait LinearSystemBackend: Send + Sync {
    fn invert(&self, matrix: &[Vec<Complex64>]) -> LseResult<DenseMatrix>;

    fn name(&self) -> &'static str;
}

fn check_square(matrix: &[Vec<Complex64>]) -> LseResult<usize> {
    let n = matrix.len();
    if matrix.iter().any(|row| row.len() != n) {
        return Err(LseError::Other("matrix must be square".into()));
    }
    Ok(n)
}

fn max_abs(matrix: &[Vec<Complex64>]) -> f64 {
    matrix
        .iter()
        .flatten()
        .map(|v| v.norm())
        .fold(0.0, f64::max)
}

/// Largest deviation of `matrix · inv` from the identity.
fn identity_residual(matrix: &[Vec<Complex64>], inv: &[Vec<Complex64>]) -> f64 {
    let n = matrix.len();
    let mut worst = 0.0_f64;
    for i in 0..n {
        for j in 0..n {
            let value: Complex64 = (0..n).map(|k| matrix[i][k] * inv[k][j]).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            worst = worst.max((value - Complex64::new(expected, 0.0)).norm());
        }
    }
    worst
}

/// Gauss-Jordan elimination with partial pivoting.
///
/// A pivot whose magnitude falls below `tolerance` times the largest entry
/// of the input marks the matrix as singular.
#[derive(Debug, Clone)]
pub struct GaussSolver {
    pub tolerance: f64,
}

impl Default for GaussSolver {
    fn default() -> Self {
        Self { tolerance: 1e-10 }
    }
}

impl LinearSystemBackend for GaussSolver {
    fn invert(&self, matrix: &[Vec<Complex64>]) -> LseResult<DenseMatrix> {
        let n = check_square(matrix)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let scale = max_abs(matrix);
        if scale == 0.0 || !scale.is_finite() {
            return Err(LseError::SingularSystem {
                dimension: n,
                pivot: 0,
            });
        }
        let threshold = self.tolerance * scale;

        let mut a = matrix.to_vec();
        let mut inv: DenseMatrix = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            Complex64::new(1.0, 0.0)
                        } else {
                            Complex64::new(0.0, 0.0)
                        }
                    })
                    .collect()
            })
            .collect();

        for i in 0..n {
            let mut pivot = i;
            for row in i + 1..n {
                if a[row][i].norm() > a[pivot][i].norm() {
                    pivot = row;
                }
            }
            if pivot != i {
                a.swap(i, pivot);
                inv.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag.norm() <= threshold {
                return Err(LseError::SingularSystem {
                    dimension: n,
                    pivot: i,
                });
            }

            let scale_row = diag.inv();
            for value in a[i].iter_mut() {
                *value *= scale_row;
            }
            for value in inv[i].iter_mut() {
                *value *= scale_row;
            }

            let pivot_row = a[i].clone();
            let pivot_inv = inv[i].clone();
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                if factor.norm() == 0.0 {
                    continue;
                }
                for (target, &p) in a[row].iter_mut().zip(pivot_row.iter()) {
                    *target -= factor * p;
                }
                for (target, &p) in inv[row].iter_mut().zip(pivot_inv.iter()) {
                    *target -= factor * p;
                }
            }
        }

        Ok(inv)
    }

    fn name(&self) -> &'static str {
        "gauss"
    }
}

/// LU with partial pivoting from `faer`.
///
/// LU does not expose a rank decision, so singularity is detected from the
/// result: non-finite entries, or a reciprocal condition estimate
/// `1 / (n·max|A|·max|A⁻¹|)` below `tolerance`.
#[derive(Debug, Clone)]
pub struct FaerSolver {
    pub tolerance: f64,
}

impl Default for FaerSolver {
    fn default() -> Self {
        Self { tolerance: 1e-10 }
    }
}

impl LinearSystemBackend for FaerSolver {
    fn invert(&self, matrix: &[Vec<Complex64>]) -> LseResult<DenseMatrix> {
        let n = check_square(matrix)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mat = Mat::<c64>::from_fn(n, n, |i, j| c64::new(matrix[i][j].re, matrix[i][j].im));
        let identity = Mat::<c64>::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(1.0, 0.0)
            } else {
                c64::new(0.0, 0.0)
            }
        });
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&identity);

        let inv: DenseMatrix = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let v = sol.read(i, j);
                        Complex64::new(v.re, v.im)
                    })
                    .collect()
            })
            .collect();

        let singular = LseError::SingularSystem {
            dimension: n,
            pivot: n,
        };
        if inv.iter().flatten().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
            return Err(singular);
        }
        let rcond = 1.0 / (n as f64 * max_abs(matrix) * max_abs(&inv));
        if !rcond.is_finite() || rcond < self.tolerance {
            return Err(singular);
        }
        if identity_residual(matrix, &inv) > self.tolerance.sqrt() {
            return Err(singular);
        }

        Ok(inv)
    }

    fn name(&self) -> &'static str {
        "faer"
    }
}
