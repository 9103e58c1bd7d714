//! Diagnostics collected while validating a network model.
//!
//! Validation does not stop at the first problem: every issue is recorded
//! with a severity, a category and (usually) the entity it concerns, so the
//! report collaborator can publish the whole list at once.
//!
//! # Example
//!
//! ```
//! use lse_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("physical", "Shunt compensator has zero susceptance");
//! diag.add_error_with_entity("reference", "Current flow references unknown branch", "Phasor#4");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert_eq!(diag.issues[1].severity, Severity::Error);
//! ```

use serde::Serialize;

use crate::NetworkModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The cycle can still run, possibly with degraded observability
    Warning,
    /// The cycle will fail with a model consistency error
    Error,
}

/// A single diagnostic issue
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping ("structure", "topology", "physical", "reference", "validation")
    pub category: String,
    pub message: String,
    /// Entity reference (e.g. "Node#14", "Branch#3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    /// Add a warning in the "validation" category
    pub fn add_validation_warning(&mut self, entity: &str, message: &str) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, "validation", message).with_entity(entity),
        );
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

/// Validate a network model and return every issue found.
pub fn validate_model(model: &NetworkModel) -> Diagnostics {
    let mut diag = Diagnostics::new();
    model.validate_into(&mut diag);
    diag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Branch, BranchId, CurrentFlowPhasorGroup, Kilovolts, Node, NodeId, PhaseMode, Phasor,
        PhasorGroup, PhasorGroupId, Radians, ShuntCompensator, TransmissionLine,
    };

    #[test]
    fn test_summary_and_display() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");
        diag.add_warning("physical", "w1");
        diag.add_warning("physical", "w2");
        diag.add_error_with_entity("reference", "bad ref", "Branch#2");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
        let text = diag.to_string();
        assert!(text.contains("[error:reference] bad ref (Branch#2)"));
        assert_eq!(diag.issues_by_category("physical").count(), 2);
    }

    #[test]
    fn test_serializes_without_empty_entity() {
        let mut diag = Diagnostics::new();
        diag.add_warning("structure", "note");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(!json.contains("entity"));
    }

    #[test]
    fn test_validate_model_reports_references_and_physics() {
        let mut model = NetworkModel::new(PhaseMode::PositiveSequence);
        let n1 = model.add_node(Node::new(NodeId::new(1), "N1", Kilovolts(115.0)));
        let n2 = model.add_node(Node::new(NodeId::new(2), "N2", Kilovolts(115.0)));
        model.add_branch(
            n1,
            n2,
            Branch::Line(TransmissionLine::new(BranchId::new(1), "L0", 0.0, 0.0)),
        );
        model.add_shunt(n2, ShuntCompensator::new(BranchId::new(2), "Empty", 0.0));
        model.add_current_flow(CurrentFlowPhasorGroup {
            group: PhasorGroup::balanced(
                PhasorGroupId::new(9),
                "I",
                Phasor::new(0.1, Radians::ZERO).with_variance(0.0),
            ),
            branch: BranchId::new(42),
            from_node: NodeId::new(1),
            to_node: NodeId::new(2),
        });

        let diag = validate_model(&model);
        assert!(diag.errors().any(|i| i.category == "physical"));
        assert!(diag.errors().any(|i| i.message.contains("Branch#42")));
        assert!(diag.warnings().any(|i| i.message.contains("zero susceptance")));
        assert!(diag.warnings().any(|i| i.category == "validation"));
    }
}
