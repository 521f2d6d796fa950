//! 7 element calibration using direct eigen-decomposition

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use super::{Conditioner, DEFAULT_B, ONE_SIXTH, ONE_THIRD, trial};
use crate::buffer::MagSample;
use crate::math::{abs, eigen_decompose, powf, smallest_index, sqrt, symmetrize_upper};
use crate::types::{Tier, TrialCalibration};

/// Fit an axis-aligned ellipsoid `sum(A_k x_k^2) + sum(b_k x_k) + c = 0`
///
/// The seven coefficients are the eigenvector of the smallest eigenvalue of
/// the 7x7 measurement matrix `sum(m m^T)`, `m = [x^2, y^2, z^2, x, y, z, 1]`.
/// The soft iron matrix is diagonal.
///
/// Only samples whose flag is set (non-zero) are used.
pub fn solve7(samples: &[MagSample], ut_per_count: f32) -> TrialCalibration {
    let mut conditioner = Conditioner::new(ut_per_count);
    let mut measurement = SMatrix::<f64, 7, 7>::zeros();
    let mut count = 0usize;

    for sample in samples.iter().filter(|sample| sample.flag.is_set()) {
        let bp = conditioner.condition(&sample.raw);
        let row = SVector::<f64, 7>::from([
            bp.x * bp.x,
            bp.y * bp.y,
            bp.z * bp.z,
            bp.x,
            bp.y,
            bp.z,
            1.0,
        ]);

        // On and above diagonal, except [6][6] which is the sample count
        for m in 0..6 {
            for n in m..7 {
                measurement[(m, n)] += row[m] * row[n];
            }
        }

        count += 1;
    }

    measurement[(6, 6)] = count as f64;
    symmetrize_upper(&mut measurement);

    let (eigenvalues, eigenvectors) = eigen_decompose(measurement);
    let j = smallest_index(&eigenvalues);
    let mut solution: SVector<f64, 7> = eigenvectors.column(j).into_owned();

    let mut diagonal = Vector3::new(solution[0], solution[1], solution[2]);
    let mut det = diagonal.product();
    let hard_iron = Vector3::from_fn(|k, _| -0.5 * solution[k + 3] / diagonal[k]);

    // The eigenvector sign is arbitrary; an ellipsoid needs a positive determinant
    if det < 0.0 {
        diagonal = -diagonal;
        solution[6] = -solution[6];
        det = -det;
    }

    // Squared field strength in conditioned units
    let field_squared = -solution[6] + diagonal.dot(&hard_iron.component_mul(&hard_iron));

    let fit_error = 50.0 * sqrt(abs(eigenvalues[j]) / count as f64) / abs(field_squared);

    // Normalise A to unit determinant and scale the field to match
    let diagonal = diagonal * powf(det, -ONE_THIRD);
    let field = sqrt(abs(field_squared)) * f64::from(DEFAULT_B) * powf(det, -ONE_SIXTH);

    let soft_iron = Matrix3::from_diagonal(&diagonal.map(|a| sqrt(abs(a))));
    let hard_iron = conditioner.restore_hard_iron(hard_iron);

    log::trace!(
        "7 element fit over {count} samples: eigenvalue {:e}",
        eigenvalues[j]
    );

    trial(Tier::Seven, fit_error, field, hard_iron, soft_iron, count)
}
