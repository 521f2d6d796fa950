//! 10 element calibration using direct eigen-decomposition

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use super::{Conditioner, DEFAULT_B, ONE_SIXTH, ONE_THIRD, trial};
use crate::buffer::MagSample;
use crate::math::{
    abs, eigen_decompose, powf, smallest_index, sqrt, symmetric_inverse, symmetric_sqrt,
    symmetrize_upper,
};
use crate::types::{Tier, TrialCalibration};

/// Fit a general ellipsoid `x^T A x + b . x + c = 0` with symmetric `A`
///
/// The measurement vector holds the six independent quadratic monomials
/// (off-diagonal ones doubled), the three linear terms and a constant. The
/// ten coefficients are the eigenvector of the smallest eigenvalue of the
/// 10x10 measurement matrix. The soft iron matrix is the principal square
/// root of `A` normalised to unit determinant.
///
/// Samples are skipped only when their flag holds the `-1` sentinel, so
/// empty slots are accumulated too.
pub fn solve10(samples: &[MagSample], ut_per_count: f32) -> TrialCalibration {
    let mut conditioner = Conditioner::new(ut_per_count);
    let mut measurement = SMatrix::<f64, 10, 10>::zeros();
    let mut count = 0usize;

    for sample in samples.iter().filter(|sample| sample.flag.is_not_sentinel()) {
        let bp = conditioner.condition(&sample.raw);
        let row = SVector::<f64, 10>::from([
            bp.x * bp.x,
            2.0 * bp.x * bp.y,
            2.0 * bp.x * bp.z,
            bp.y * bp.y,
            2.0 * bp.y * bp.z,
            bp.z * bp.z,
            bp.x,
            bp.y,
            bp.z,
            1.0,
        ]);

        // On and above diagonal, except [9][9] which is the sample count
        for m in 0..9 {
            for n in m..10 {
                measurement[(m, n)] += row[m] * row[n];
            }
        }

        count += 1;
    }

    measurement[(9, 9)] = count as f64;
    symmetrize_upper(&mut measurement);

    let (eigenvalues, eigenvectors) = eigen_decompose(measurement);
    let j = smallest_index(&eigenvalues);
    let mut solution: SVector<f64, 10> = eigenvectors.column(j).into_owned();

    #[rustfmt::skip]
    let mut ellipsoid = Matrix3::new(
        solution[0], solution[1], solution[2],
        solution[1], solution[3], solution[4],
        solution[2], solution[4], solution[5],
    );

    // The eigenvector sign is arbitrary; negate the whole solution if needed
    let mut det = ellipsoid.determinant();
    if det < 0.0 {
        ellipsoid = -ellipsoid;
        for k in 6..10 {
            solution[k] = -solution[k];
        }
        det = -det;
    }

    let linear = Vector3::new(solution[6], solution[7], solution[8]);
    let hard_iron = symmetric_inverse(&ellipsoid) * linear * -0.5;

    // Field strength in conditioned units
    let field = sqrt(abs(hard_iron.dot(&(ellipsoid * hard_iron)) - solution[9]));

    let fit_error = 50.0 * sqrt(abs(eigenvalues[j]) / count as f64) / (field * field);

    let hard_iron = conditioner.restore_hard_iron(hard_iron);

    // Normalise A to unit determinant and scale the field to match
    let ellipsoid = ellipsoid * powf(det, -ONE_THIRD);
    let field = field * f64::from(DEFAULT_B) * powf(det, -ONE_SIXTH);

    let soft_iron = symmetric_sqrt(&ellipsoid);

    log::trace!(
        "10 element fit over {count} samples: eigenvalue {:e}",
        eigenvalues[j]
    );

    trial(Tier::Ten, fit_error, field, hard_iron, soft_iron, count)
}
