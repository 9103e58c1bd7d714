use super::backend::{FaerSolver, GaussSolver, LinearSystemBackend};
use crate::error::LseError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Registry of available inversion backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Gauss,
    Faer,
}

impl FromStr for SolverKind {
    type Err = LseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "gauss" | "default" => Ok(SolverKind::Gauss),
            "faer" => Ok(SolverKind::Faer),
            other => Err(LseError::Config(format!(
                "unknown solver '{}'; supported values: {}",
                other,
                SolverKind::available().join(", ")
            ))),
        }
    }
}

impl SolverKind {
    /// Build the backend with the given relative singularity tolerance.
    pub fn build_solver(self, tolerance: f64) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::Gauss => Arc::new(GaussSolver { tolerance }),
            SolverKind::Faer => Arc::new(FaerSolver { tolerance }),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["gauss", "faer"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Gauss => "gauss",
            SolverKind::Faer => "faer",
        }
    }
}
