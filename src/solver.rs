//! Hard and soft iron solvers
//!
//! Three least-squares fits of increasing richness share the same
//! conditioning step: the first usable sample (in counts) is subtracted from
//! every sample and the result is scaled so that a nominal field of
//! [`DEFAULT_B`] maps to unit length. Solutions are mapped back to
//! microtesla at the end of each fit.
//!
//! Every solver is a pure function of the sample slice. Its accumulators are
//! local to the call and start from zero, so nothing carries over between
//! runs or between tiers.

use nalgebra::{Matrix3, Vector3};

use crate::buffer::MagSample;
use crate::types::{Tier, TrialCalibration};

mod diagonal;
mod full;
mod sphere;

pub use diagonal::solve7;
pub use full::solve10;
pub use sphere::solve4;

/// Nominal geomagnetic field used for conditioning (uT)
pub const DEFAULT_B: f32 = 50.0;

/// Default sensor scale: FXOS8700 at 0.1 uT per count
pub const DEFAULT_UT_PER_COUNT: f32 = 0.1;

const ONE_THIRD: f64 = 1.0 / 3.0;
const ONE_SIXTH: f64 = 1.0 / 6.0;

impl Tier {
    /// Run this tier's solver over the sample slice
    ///
    /// # Example
    /// ```
    /// use magcal::{MagSample, Tier};
    ///
    /// let samples = [MagSample::new(500, 0, 0), MagSample::new(-500, 0, 0)];
    /// let trial = Tier::Four.solve(&samples, 0.1);
    /// assert_eq!(trial.tier, Tier::Four);
    /// assert_eq!(trial.sample_count, 2);
    /// ```
    pub fn solve(self, samples: &[MagSample], ut_per_count: f32) -> TrialCalibration {
        match self {
            Tier::Four => solve4(samples, ut_per_count),
            Tier::Seven => solve7(samples, ut_per_count),
            Tier::Ten => solve10(samples, ut_per_count),
        }
    }
}

/// Removes the first-sample offset and scales counts to conditioned units
struct Conditioner {
    offset: Option<Vector3<i32>>,
    ut_per_count: f64,
    scaling: f64,
}

impl Conditioner {
    fn new(ut_per_count: f32) -> Self {
        let ut_per_count = f64::from(ut_per_count);
        Self {
            offset: None,
            ut_per_count,
            scaling: ut_per_count / f64::from(DEFAULT_B),
        }
    }

    /// Offset-corrected, scaled sample; the first call fixes the offset
    fn condition(&mut self, raw: &Vector3<i16>) -> Vector3<f64> {
        let raw = raw.map(i32::from);
        let offset = *self.offset.get_or_insert(raw);
        (raw - offset).map(|count| f64::from(count) * self.scaling)
    }

    /// Map a conditioned hard iron estimate back to microtesla
    fn restore_hard_iron(&self, hard_iron: Vector3<f64>) -> Vector3<f64> {
        let offset = self.offset.unwrap_or_else(Vector3::zeros);
        hard_iron * f64::from(DEFAULT_B) + offset.map(|count| f64::from(count) * self.ut_per_count)
    }
}

/// Narrow a solver result to the public `f32` representation
fn trial(
    tier: Tier,
    fit_error: f64,
    field: f64,
    hard_iron: Vector3<f64>,
    soft_iron: Matrix3<f64>,
    sample_count: usize,
) -> TrialCalibration {
    TrialCalibration {
        tier,
        fit_error: fit_error as f32,
        field: field as f32,
        hard_iron: hard_iron.map(|v| v as f32),
        soft_iron: soft_iron.map(|v| v as f32),
        sample_count,
    }
}
