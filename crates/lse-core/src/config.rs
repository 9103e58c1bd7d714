//! Estimator configuration.
//!
//! [`EstimatorConfig`] is read from TOML. Every section is optional: missing
//! values fall back to the defaults below, so a file may carry only the keys
//! that differ.
//!
//! ```
//! use lse_core::config::EstimatorConfig;
//! use lse_core::solver::SolverKind;
//!
//! let config = EstimatorConfig::from_toml_str(r#"
//!     solver = "faer"
//!
//!     [export]
//!     include_header = false
//! "#).unwrap();
//!
//! assert_eq!(config.solver, SolverKind::Faer);
//! assert!(!config.export.include_header);
//! assert_eq!(config.variance_floor, 1e-9);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LseError, LseResult};
use crate::solver::SolverKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Dense backend used to invert the weighted normal matrix.
    pub solver: SolverKind,

    /// Relative pivot threshold below which the gain system is declared singular.
    pub singular_tolerance: f64,

    /// Smallest variance admitted into the covariance matrix.
    pub variance_floor: f64,

    /// Diagnostic matrix export.
    pub export: ExportConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            singular_tolerance: 1e-10,
            variance_floor: 1e-9,
            export: ExportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for per-cycle CSV dumps; `None` disables export.
    pub matrix_dir: Option<PathBuf>,

    /// Write a header row of column labels (positive-sequence mode only).
    pub include_header: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            matrix_dir: None,
            include_header: true,
        }
    }
}

impl EstimatorConfig {
    pub fn from_toml_str(input: &str) -> LseResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> LseResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> LseResult<()> {
        if !(self.singular_tolerance > 0.0 && self.singular_tolerance < 1.0) {
            return Err(LseError::Config(format!(
                "singular_tolerance must lie in (0, 1), got {}",
                self.singular_tolerance
            )));
        }
        if !(self.variance_floor.is_finite() && self.variance_floor > 0.0) {
            return Err(LseError::Config(format!(
                "variance_floor must be positive, got {}",
                self.variance_floor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EstimatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.solver, SolverKind::Gauss);
        assert_eq!(config.singular_tolerance, 1e-10);
        assert!(config.export.matrix_dir.is_none());
        assert!(config.export.include_header);
    }

    #[test]
    fn test_partial_export_section() {
        let config = EstimatorConfig::from_toml_str(
            r#"
            variance_floor = 1e-6
            [export]
            matrix_dir = "/tmp/lse"
            "#,
        )
        .unwrap();
        assert_eq!(config.variance_floor, 1e-6);
        assert_eq!(config.export.matrix_dir, Some(PathBuf::from("/tmp/lse")));
        assert!(config.export.include_header);
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        let err = EstimatorConfig::from_toml_str("singular_tolerance = 0.0").unwrap_err();
        assert!(matches!(err, LseError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_solver() {
        let err = EstimatorConfig::from_toml_str("solver = \"cholesky\"").unwrap_err();
        assert!(matches!(err, LseError::Parse(_)));
    }
}
