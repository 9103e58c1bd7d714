//! Error types shared by the estimator crates.
//!
//! [`LseError`] covers the failures that abort an estimation cycle: an
//! inconsistent network model, a singular gain system, and the configuration
//! and persistence errors around them. A matrix partition that simply has no
//! rows or columns is not an error; the builders report it as an absent
//! partition instead.
//!
//! # Example
//!
//! ```
//! use lse_core::{LseError, LseResult, NodeId};
//!
//! fn lookup(id: NodeId) -> LseResult<()> {
//!     Err(LseError::UnknownNode(id))
//! }
//!
//! let err = lookup(NodeId::new(7)).unwrap_err();
//! assert!(err.is_model_consistency());
//! ```

use thiserror::Error;

use crate::{BranchId, NodeId};

#[derive(Error, Debug)]
pub enum LseError {
    /// A node ended up outside every observed bus after topology resolution
    #[error("Model consistency error: node {0} was not assigned to an observed bus")]
    UnassignedNode(NodeId),

    /// A node is not an endpoint of any branch
    #[error("Model consistency error: node {0} is absent from the topology graph")]
    NodeNotInTopology(NodeId),

    #[error("Model consistency error: unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Model consistency error: unknown branch {0}")]
    UnknownBranch(BranchId),

    /// A measurement references a branch of the wrong kind (e.g. a current flow on a breaker)
    #[error("Model consistency error: branch {branch} is not a {expected}")]
    BranchKindMismatch {
        branch: BranchId,
        expected: &'static str,
    },

    /// A measurement's terminal nodes are not the endpoints of the branch it measures
    #[error("Model consistency error: measurement terminals {from}-{to} do not match branch {branch}")]
    TerminalMismatch {
        branch: BranchId,
        from: NodeId,
        to: NodeId,
    },

    #[error("Model consistency error: branch {0} has zero series impedance")]
    ZeroImpedance(BranchId),

    /// The weighted normal matrix could not be inverted
    #[error("Singular system: {dimension}x{dimension} gain matrix lost rank at pivot {pivot}")]
    SingularSystem { dimension: usize, pivot: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LseError {
    /// True for every failure caused by the network model itself.
    pub fn is_model_consistency(&self) -> bool {
        matches!(
            self,
            LseError::UnassignedNode(_)
                | LseError::NodeNotInTopology(_)
                | LseError::UnknownNode(_)
                | LseError::UnknownBranch(_)
                | LseError::BranchKindMismatch { .. }
                | LseError::TerminalMismatch { .. }
                | LseError::ZeroImpedance(_)
        )
    }
}

pub type LseResult<T> = Result<T, LseError>;

impl From<anyhow::Error> for LseError {
    fn from(err: anyhow::Error) -> Self {
        LseError::Other(err.to_string())
    }
}

impl From<String> for LseError {
    fn from(s: String) -> Self {
        LseError::Other(s)
    }
}

impl From<&str> for LseError {
    fn from(s: &str) -> Self {
        LseError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for LseError {
    fn from(err: toml::de::Error) -> Self {
        LseError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LseError::SingularSystem {
            dimension: 4,
            pivot: 2,
        };
        assert!(err.to_string().contains("Singular system"));
        assert!(err.to_string().contains("4x4"));
        assert!(!err.is_model_consistency());
    }

    #[test]
    fn test_model_consistency_classification() {
        assert!(LseError::UnknownBranch(BranchId::new(3)).is_model_consistency());
        assert!(LseError::NodeNotInTopology(NodeId::new(1)).is_model_consistency());
        assert!(!LseError::Config("bad".into()).is_model_consistency());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LseError = io_err.into();
        assert!(matches!(err, LseError::Io(_)));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: LseError = anyhow::anyhow!("export failed").into();
        assert_eq!(err.to_string(), "export failed");
    }
}
