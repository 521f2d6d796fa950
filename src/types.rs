//! Core types for the magnetometer calibration library

use nalgebra::{Matrix3, Vector3};

use crate::calibration::{calibrate_magnetic, counts_to_ut};
use crate::calibrator::{MIN_MEASUREMENTS_4_CAL, MIN_MEASUREMENTS_7_CAL, MIN_MEASUREMENTS_10_CAL};
use crate::solver::DEFAULT_UT_PER_COUNT;

/// Calibration model richness
///
/// Tiers are ordered so that a richer model compares greater than a
/// cheaper one.
///
/// - **Four**: hard iron only, soft iron matrix fixed to identity
/// - **Seven**: hard iron plus diagonal soft iron
/// - **Ten**: hard iron plus full symmetric soft iron
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// 4 element sphere fit by matrix inversion
    Four,
    /// 7 element diagonal ellipsoid fit by eigen-decomposition
    Seven,
    /// 10 element general ellipsoid fit by eigen-decomposition
    Ten,
}

impl Tier {
    /// Number of unknowns solved for by this tier
    pub fn parameters(self) -> usize {
        match self {
            Tier::Four => 4,
            Tier::Seven => 7,
            Tier::Ten => 10,
        }
    }

    /// Select the richest tier the given number of samples supports
    ///
    /// # Example
    /// ```
    /// use magcal::Tier;
    ///
    /// assert_eq!(Tier::for_sample_count(39), None);
    /// assert_eq!(Tier::for_sample_count(40), Some(Tier::Four));
    /// assert_eq!(Tier::for_sample_count(100), Some(Tier::Seven));
    /// assert_eq!(Tier::for_sample_count(650), Some(Tier::Ten));
    /// ```
    pub fn for_sample_count(count: usize) -> Option<Tier> {
        if count < MIN_MEASUREMENTS_4_CAL {
            None
        } else if count < MIN_MEASUREMENTS_7_CAL {
            Some(Tier::Four)
        } else if count < MIN_MEASUREMENTS_10_CAL {
            Some(Tier::Seven)
        } else {
            Some(Tier::Ten)
        }
    }
}

/// Scheduler settings
///
/// Only the sensor scale is configurable. Thresholds, the throttle period
/// and the aging factor are fixed constants in [`crate::calibrator`].
///
/// # Example
/// ```
/// use magcal::{CalibratorSettings, MagCalibrator};
///
/// let settings = CalibratorSettings {
///     ut_per_count: 0.15, // 0.15 uT per LSB
/// };
/// let calibrator = MagCalibrator::with_settings(settings);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratorSettings {
    /// Sensor scale in microtesla per raw count
    pub ut_per_count: f32,
}

impl Default for CalibratorSettings {
    fn default() -> Self {
        Self {
            ut_per_count: DEFAULT_UT_PER_COUNT,
        }
    }
}

/// Accepted magnetometer calibration
///
/// Starts with no tier. Only the scheduler's commit step writes it, and it
/// does so by replacing the whole value, so a reader never sees a tier next
/// to vectors from a different fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagCalibration {
    /// Model tier of the accepted fit, `None` until the first commit
    pub tier: Option<Tier>,
    /// Fit error in percent, aged while no better fit arrives
    pub fit_error: f32,
    /// Geomagnetic field magnitude in microtesla
    pub field: f32,
    /// Four times the squared field magnitude
    pub four_b_squared: f32,
    /// Hard iron offset in microtesla
    pub hard_iron: Vector3<f32>,
    /// Soft iron correction matrix
    pub soft_iron: Matrix3<f32>,
}

impl Default for MagCalibration {
    fn default() -> Self {
        Self {
            tier: None,
            fit_error: 0.0,
            field: 0.0,
            four_b_squared: 0.0,
            hard_iron: Vector3::zeros(),
            soft_iron: Matrix3::identity(),
        }
    }
}

impl MagCalibration {
    /// Whether a calibration has been accepted
    pub fn is_valid(&self) -> bool {
        self.tier.is_some()
    }

    /// Correct a reading already expressed in microtesla
    pub fn apply(&self, uncalibrated: Vector3<f32>) -> Vector3<f32> {
        calibrate_magnetic(uncalibrated, self.soft_iron, self.hard_iron)
    }

    /// Correct a raw reading in sensor counts
    pub fn apply_counts(&self, raw: Vector3<i16>, ut_per_count: f32) -> Vector3<f32> {
        self.apply(counts_to_ut(raw, ut_per_count))
    }
}

/// Result of a single solver run, not yet accepted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialCalibration {
    /// Tier of the solver that produced this result
    pub tier: Tier,
    /// Fit error in percent
    pub fit_error: f32,
    /// Geomagnetic field magnitude in microtesla
    pub field: f32,
    /// Hard iron offset in microtesla
    pub hard_iron: Vector3<f32>,
    /// Soft iron correction matrix
    pub soft_iron: Matrix3<f32>,
    /// Number of samples the solver accumulated
    pub sample_count: usize,
}

impl TrialCalibration {
    /// Build the record that replaces the accepted calibration on commit
    pub fn into_calibration(self) -> MagCalibration {
        MagCalibration {
            tier: Some(self.tier),
            fit_error: self.fit_error,
            field: self.field,
            four_b_squared: 4.0 * self.field * self.field,
            hard_iron: self.hard_iron,
            soft_iron: self.soft_iron,
        }
    }
}

/// What a scheduler cycle did
///
/// Purely informational; ignoring it loses nothing, the accepted
/// calibration is the only output that matters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Skipped by the call-count throttle
    Throttled,
    /// Fewer samples than the smallest tier needs
    InsufficientSamples {
        /// Number of set samples found
        count: usize,
    },
    /// Trial field magnitude fell outside the physical band
    FieldOutOfRange {
        /// Tier of the rejected trial
        tier: Tier,
        /// Trial field magnitude in microtesla
        field: f32,
    },
    /// Trial did not beat the accepted calibration
    Rejected {
        /// Tier of the rejected trial
        tier: Tier,
        /// Trial fit error in percent
        fit_error: f32,
    },
    /// Trial replaced the accepted calibration
    Accepted {
        /// Tier of the new calibration
        tier: Tier,
        /// Fit error of the new calibration in percent
        fit_error: f32,
        /// Field magnitude of the new calibration in microtesla
        field: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Four < Tier::Seven);
        assert!(Tier::Seven < Tier::Ten);
        assert_eq!(Tier::Ten.parameters(), 10);
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(Tier::for_sample_count(0), None);
        assert_eq!(Tier::for_sample_count(99), Some(Tier::Four));
        assert_eq!(Tier::for_sample_count(149), Some(Tier::Seven));
        assert_eq!(Tier::for_sample_count(150), Some(Tier::Ten));
    }

    #[test]
    fn test_default_calibration() {
        let calibration = MagCalibration::default();
        assert!(!calibration.is_valid());
        assert_eq!(calibration.soft_iron, Matrix3::identity());

        // An uncalibrated record passes readings through
        let raw = Vector3::new(12.0, -3.0, 40.0);
        assert_eq!(calibration.apply(raw), raw);
    }

    #[test]
    fn test_trial_commit_record() {
        let trial = TrialCalibration {
            tier: Tier::Seven,
            fit_error: 1.5,
            field: 48.0,
            hard_iron: Vector3::new(1.0, 2.0, 3.0),
            soft_iron: Matrix3::from_diagonal(&Vector3::new(1.1, 0.9, 1.0)),
            sample_count: 120,
        };
        let calibration = trial.into_calibration();

        assert_eq!(calibration.tier, Some(Tier::Seven));
        assert_eq!(calibration.fit_error, 1.5);
        assert_eq!(calibration.four_b_squared, 4.0 * 48.0 * 48.0);
        assert_eq!(calibration.hard_iron, trial.hard_iron);
        assert_eq!(calibration.soft_iron, trial.soft_iron);
    }
}
