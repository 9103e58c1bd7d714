//! Measurement phasors and phasor groups.
//!
//! A [`PhasorGroup`] bundles the three phase channels of one instrument with
//! an optional positive-sequence channel. Each channel carries its own
//! variance, ratio/angle correction and [`CalibrationSetting`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::phase::{positive_sequence, PhaseMode};
use crate::units::Radians;
use crate::{BranchId, NodeId, PhasorGroupId};

/// How a channel takes part in the calibration sweep and in the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSetting {
    /// Used in the estimate and corrected by the calibration solve
    #[default]
    Active,
    /// Used in the estimate, never corrected
    Passive,
    /// Excluded from the estimate
    Inactive,
    /// Treated as a reference instrument
    Perfect,
}

impl CalibrationSetting {
    /// Channel contributes rows to the system matrix.
    #[inline]
    pub fn is_included(self) -> bool {
        !matches!(self, CalibrationSetting::Inactive)
    }

    /// Channel can anchor a calibration column.
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(self, CalibrationSetting::Active | CalibrationSetting::Perfect)
    }
}

/// Ratio and angle correction factors applied to a raw reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub ratio: f64,
    pub angle: Radians,
}

impl Default for Correction {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            angle: Radians::ZERO,
        }
    }
}

/// One measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phasor {
    /// Magnitude in per-unit
    pub magnitude: f64,
    pub angle: Radians,
    /// Measurement variance (diagonal covariance entry)
    pub variance: f64,
    #[serde(default)]
    pub correction: Correction,
    #[serde(default)]
    pub calibration: CalibrationSetting,
    /// Data quality flag reported with the sample
    #[serde(default = "default_quality")]
    pub quality_good: bool,
}

fn default_quality() -> bool {
    true
}

impl Default for Phasor {
    fn default() -> Self {
        Self {
            magnitude: 0.0,
            angle: Radians::ZERO,
            variance: 1e-4,
            correction: Correction::default(),
            calibration: CalibrationSetting::Active,
            quality_good: true,
        }
    }
}

impl Phasor {
    pub fn new(magnitude: f64, angle: Radians) -> Self {
        Self {
            magnitude,
            angle,
            ..Self::default()
        }
    }

    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = variance;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationSetting) -> Self {
        self.calibration = calibration;
        self
    }

    /// Raw reading as a complex value.
    pub fn value(&self) -> Complex64 {
        Complex64::from_polar(self.magnitude, self.angle.value())
    }

    /// Reading after applying the ratio/angle correction.
    pub fn corrected(&self) -> Complex64 {
        let angle = (self.angle + self.correction.angle).wrapped();
        Complex64::from_polar(self.magnitude * self.correction.ratio, angle.value())
    }

    /// Included in the estimate and reported with good quality.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.calibration.is_included() && self.quality_good
    }
}

/// Three phase channels plus an optional positive-sequence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorGroup {
    pub id: PhasorGroupId,
    pub name: String,
    pub phases: [Phasor; 3],
    #[serde(default)]
    pub positive_sequence: Option<Phasor>,
}

impl PhasorGroup {
    pub fn new(id: PhasorGroupId, name: impl Into<String>, phases: [Phasor; 3]) -> Self {
        Self {
            id,
            name: name.into(),
            phases,
            positive_sequence: None,
        }
    }

    /// Balanced three-phase set from a single phase-A reading.
    pub fn balanced(id: PhasorGroupId, name: impl Into<String>, phase_a: Phasor) -> Self {
        let shift = Radians(2.0 * std::f64::consts::FRAC_PI_3);
        let mut phase_b = phase_a;
        phase_b.angle = (phase_a.angle - shift).wrapped();
        let mut phase_c = phase_a;
        phase_c.angle = (phase_a.angle + shift).wrapped();
        Self::new(id, name, [phase_a, phase_b, phase_c])
    }

    pub fn with_positive_sequence(mut self, phasor: Phasor) -> Self {
        self.positive_sequence = Some(phasor);
        self
    }

    /// Apply one calibration setting to every channel.
    pub fn set_calibration(&mut self, calibration: CalibrationSetting) {
        for phase in self.phases.iter_mut() {
            phase.calibration = calibration;
        }
        if let Some(seq) = self.positive_sequence.as_mut() {
            seq.calibration = calibration;
        }
    }

    /// Every channel the given mode reads is usable.
    pub fn is_usable(&self, mode: PhaseMode) -> bool {
        match (mode, &self.positive_sequence) {
            (PhaseMode::PositiveSequence, Some(seq)) => seq.is_usable(),
            _ => self.phases.iter().all(Phasor::is_usable),
        }
    }

    pub fn all_phases(&self, predicate: impl Fn(CalibrationSetting) -> bool) -> bool {
        self.phases.iter().all(|p| predicate(p.calibration))
    }

    /// Corrected values in the order the system matrix rows use: one value in
    /// positive-sequence mode, phases A, B, C otherwise.
    pub fn measured_values(&self, mode: PhaseMode) -> Vec<Complex64> {
        match mode {
            PhaseMode::PositiveSequence => vec![self.sequence_value()],
            PhaseMode::ThreePhase => self.phases.iter().map(Phasor::corrected).collect(),
        }
    }

    /// Variances matching [`PhasorGroup::measured_values`].
    pub fn variances(&self, mode: PhaseMode) -> Vec<f64> {
        match mode {
            PhaseMode::PositiveSequence => vec![self.sequence_variance()],
            PhaseMode::ThreePhase => self.phases.iter().map(|p| p.variance).collect(),
        }
    }

    /// Positive-sequence value, derived from the phases when no channel reports it.
    pub fn sequence_value(&self) -> Complex64 {
        match &self.positive_sequence {
            Some(seq) => seq.corrected(),
            None => positive_sequence([
                self.phases[0].corrected(),
                self.phases[1].corrected(),
                self.phases[2].corrected(),
            ]),
        }
    }

    fn sequence_variance(&self) -> f64 {
        match &self.positive_sequence {
            Some(seq) => seq.variance,
            // Averaging three independent channels divides the variance by three.
            None => self.phases.iter().map(|p| p.variance).sum::<f64>() / 9.0,
        }
    }
}

/// Current measured at `from_node`, flowing through `branch` toward `to_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentFlowPhasorGroup {
    pub group: PhasorGroup,
    pub branch: BranchId,
    pub from_node: NodeId,
    pub to_node: NodeId,
}

/// Sign convention of a shunt current measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionDirection {
    #[default]
    IntoShunt,
    OutOfShunt,
}

impl InjectionDirection {
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            InjectionDirection::IntoShunt => 1.0,
            InjectionDirection::OutOfShunt => -1.0,
        }
    }
}

/// Current measured between `node` and the shunt compensator `shunt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentInjectionPhasorGroup {
    pub group: PhasorGroup,
    pub shunt: BranchId,
    pub node: NodeId,
    #[serde(default)]
    pub direction: InjectionDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_applies_ratio_and_angle() {
        let mut phasor = Phasor::new(1.0, Radians(0.1));
        phasor.correction = Correction {
            ratio: 1.02,
            angle: Radians(-0.05),
        };
        let v = phasor.corrected();
        assert!((v.norm() - 1.02).abs() < 1e-12);
        assert!((v.arg() - 0.05).abs() < 1e-12);
        assert!((phasor.value().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_usability_respects_quality_and_setting() {
        let good = Phasor::new(1.0, Radians::ZERO);
        assert!(good.is_usable());
        assert!(!good.with_calibration(CalibrationSetting::Inactive).is_usable());
        let mut bad = good;
        bad.quality_good = false;
        assert!(!bad.is_usable());
        assert!(good.with_calibration(CalibrationSetting::Passive).is_usable());
    }

    #[test]
    fn test_sequence_value_derived_from_balanced_phases() {
        let group = PhasorGroup::balanced(
            PhasorGroupId::new(1),
            "V1",
            Phasor::new(1.01, Radians(0.2)).with_variance(3e-4),
        );
        let v1 = group.sequence_value();
        assert!((v1.norm() - 1.01).abs() < 1e-10);
        assert!((v1.arg() - 0.2).abs() < 1e-10);
        assert!((group.variances(PhaseMode::PositiveSequence)[0] - 1e-4).abs() < 1e-15);
        assert_eq!(group.measured_values(PhaseMode::ThreePhase).len(), 3);
    }

    #[test]
    fn test_positive_sequence_channel_governs_usability() {
        let unit = Phasor::new(1.0, Radians::ZERO);
        let mut group = PhasorGroup::balanced(PhasorGroupId::new(2), "V2", unit)
            .with_positive_sequence(unit);
        group.phases[1].quality_good = false;
        assert!(group.is_usable(PhaseMode::PositiveSequence));
        assert!(!group.is_usable(PhaseMode::ThreePhase));
    }

    #[test]
    fn test_set_calibration_touches_every_channel() {
        let half = Phasor::new(0.5, Radians::ZERO);
        let mut group = PhasorGroup::balanced(PhasorGroupId::new(3), "I", half)
            .with_positive_sequence(half);
        group.set_calibration(CalibrationSetting::Passive);
        assert!(group.all_phases(|s| s == CalibrationSetting::Passive));
        assert_eq!(
            group.positive_sequence.map(|p| p.calibration),
            Some(CalibrationSetting::Passive)
        );
    }
}
