//! Calibration scheduler for the magnetometer calibration library

use nalgebra::Vector3;

use crate::buffer::{MagSample, count_set};
use crate::types::{CalibratorSettings, CycleOutcome, MagCalibration, Tier, TrialCalibration};

/// Minimum number of samples for the 4 element calibration
pub const MIN_MEASUREMENTS_4_CAL: usize = 40;
/// Minimum number of samples for the 7 element calibration
pub const MIN_MEASUREMENTS_7_CAL: usize = 100;
/// Minimum number of samples for the 10 element calibration
pub const MIN_MEASUREMENTS_10_CAL: usize = 150;

/// Minimum geomagnetic field for a valid calibration (uT)
pub const MIN_B_FIT_UT: f32 = 22.0;
/// Maximum geomagnetic field for a valid calibration (uT)
pub const MAX_B_FIT_UT: f32 = 67.0;

/// Number of `run_cycle` calls per calibration attempt
pub const CALIBRATION_PERIOD: u32 = 20;
/// Factor applied to the accepted fit error on every attempt
pub const FIT_ERROR_AGING: f32 = 1.02;
/// Fit error (percent) below which a richer tier may replace a better fit
pub const RICHER_TIER_MAX_FIT_ERROR: f32 = 4.0;

/// Whether a field magnitude lies in the physical geomagnetic band
pub fn field_in_range(field: f32) -> bool {
    (MIN_B_FIT_UT..=MAX_B_FIT_UT).contains(&field)
}

/// Acceptance policy for a trial calibration
///
/// The trial field must be in range. It then replaces the accepted
/// calibration when any of these hold:
/// 1. no calibration has been accepted yet
/// 2. its fit error is no worse than the (aged) accepted one
/// 3. it comes from a richer tier and its fit error is at most 4%
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use magcal::{MagCalibration, Tier, TrialCalibration, calibrator::accepts};
///
/// let trial = TrialCalibration {
///     tier: Tier::Four,
///     fit_error: 2.0,
///     field: 48.0,
///     hard_iron: Vector3::zeros(),
///     soft_iron: Matrix3::identity(),
///     sample_count: 60,
/// };
///
/// assert!(accepts(&MagCalibration::default(), &trial));
/// assert!(!accepts(&MagCalibration::default(), &TrialCalibration { field: 80.0, ..trial }));
/// ```
pub fn accepts(accepted: &MagCalibration, trial: &TrialCalibration) -> bool {
    if !field_in_range(trial.field) {
        return false;
    }

    match accepted.tier {
        None => true,
        Some(tier) => {
            trial.fit_error <= accepted.fit_error
                || (trial.tier > tier && trial.fit_error <= RICHER_TIER_MAX_FIT_ERROR)
        }
    }
}

/// Online magnetometer calibration context
///
/// Holds the accepted calibration and the throttle counter. Call
/// [`MagCalibrator::run_cycle`] at a roughly fixed rate with the current
/// sample buffer; every [`CALIBRATION_PERIOD`]th call runs a solver chosen
/// by the number of set samples and may replace the accepted calibration.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use magcal::{CycleOutcome, MagBuffer, MagCalibrator};
///
/// let mut calibrator = MagCalibrator::new();
/// let mut buffer = MagBuffer::new();
/// buffer.insert(0, Vector3::new(120, -40, 300)).unwrap();
///
/// for _ in 0..19 {
///     assert_eq!(calibrator.run_cycle(buffer.samples()), CycleOutcome::Throttled);
/// }
/// assert_eq!(
///     calibrator.run_cycle(buffer.samples()),
///     CycleOutcome::InsufficientSamples { count: 1 }
/// );
/// assert!(!calibrator.calibration().is_valid());
/// ```
#[derive(Debug, Clone)]
pub struct MagCalibrator {
    settings: CalibratorSettings,
    calibration: MagCalibration,
    wait_count: u32,
}

impl MagCalibrator {
    /// Create a calibrator with default settings
    pub fn new() -> Self {
        Self::with_settings(CalibratorSettings::default())
    }

    /// Create a calibrator with custom settings
    pub fn with_settings(settings: CalibratorSettings) -> Self {
        Self {
            settings,
            calibration: MagCalibration::default(),
            wait_count: 0,
        }
    }

    /// Run one scheduler step over a snapshot of the sample buffer
    ///
    /// 1. Return early unless this is the [`CALIBRATION_PERIOD`]th call
    /// 2. Count samples whose flag is set; stop if below 40
    /// 3. Age the accepted fit error by [`FIT_ERROR_AGING`]
    /// 4. Run the 4, 7 or 10 element solver by sample count
    /// 5. Commit the trial if [`accepts`] allows it
    pub fn run_cycle(&mut self, samples: &[MagSample]) -> CycleOutcome {
        self.wait_count += 1;
        if self.wait_count < CALIBRATION_PERIOD {
            return CycleOutcome::Throttled;
        }
        self.wait_count = 0;

        let count = count_set(samples);
        let Some(tier) = Tier::for_sample_count(count) else {
            log::trace!("{count} samples, not enough to calibrate");
            return CycleOutcome::InsufficientSamples { count };
        };

        if self.calibration.is_valid() {
            // Keeps one good fit from locking out later updates
            self.calibration.fit_error *= FIT_ERROR_AGING;
        }

        let trial = tier.solve(samples, self.settings.ut_per_count);
        log::debug!(
            "{:?} trial: B={:.2} uT, fit error {:.3}%",
            trial.tier,
            trial.field,
            trial.fit_error
        );

        if !field_in_range(trial.field) {
            log::debug!("{:?} trial rejected: field {:.2} uT out of range", trial.tier, trial.field);
            return CycleOutcome::FieldOutOfRange {
                tier: trial.tier,
                field: trial.field,
            };
        }

        if !accepts(&self.calibration, &trial) {
            log::debug!(
                "{:?} trial rejected: fit error {:.3}% vs accepted {:.3}%",
                trial.tier,
                trial.fit_error,
                self.calibration.fit_error
            );
            return CycleOutcome::Rejected {
                tier: trial.tier,
                fit_error: trial.fit_error,
            };
        }

        self.commit(trial)
    }

    /// Replace the accepted calibration in a single assignment
    fn commit(&mut self, trial: TrialCalibration) -> CycleOutcome {
        self.calibration = trial.into_calibration();
        log::info!(
            "new magnetic calibration ({:?}): B={:.2} uT, fit error {:.3}%",
            trial.tier,
            trial.field,
            trial.fit_error
        );
        CycleOutcome::Accepted {
            tier: trial.tier,
            fit_error: trial.fit_error,
            field: trial.field,
        }
    }

    /// Currently accepted calibration
    pub fn calibration(&self) -> MagCalibration {
        self.calibration
    }

    /// Get current settings
    pub fn settings(&self) -> CalibratorSettings {
        self.settings
    }

    /// Calls since the last calibration attempt
    pub fn wait_count(&self) -> u32 {
        self.wait_count
    }

    /// Correct a raw reading in counts with the accepted calibration
    pub fn apply(&self, raw: Vector3<i16>) -> Vector3<f32> {
        self.calibration.apply_counts(raw, self.settings.ut_per_count)
    }

    /// Discard the accepted calibration and restart the throttle
    pub fn reset(&mut self) {
        self.calibration = MagCalibration::default();
        self.wait_count = 0;
    }
}

impl Default for MagCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
