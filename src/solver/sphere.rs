//! 4 element hard iron calibration using a 4x4 matrix inverse

use nalgebra::{Matrix3, Matrix4, Vector4};

use super::{Conditioner, DEFAULT_B, trial};
use crate::buffer::MagSample;
use crate::math::{invert_or_nan, sqrt, symmetrize_upper};
use crate::types::{Tier, TrialCalibration};

/// Fit a sphere `|Bp - V|^2 = B^2` by linear least squares
///
/// The model is linearised as `Bp^2 = 2 V . Bp + (B^2 - |V|^2)`, giving the
/// normal equations `(X^T X) beta = X^T Y` with rows `X = [Bp, 1]` and
/// `Y = |Bp|^2`. The soft iron matrix is always the identity.
///
/// Only samples whose flag is set (non-zero) are used. A singular normal
/// matrix, for instance from coplanar samples, yields a NaN field.
pub fn solve4(samples: &[MagSample], ut_per_count: f32) -> TrialCalibration {
    let mut conditioner = Conditioner::new(ut_per_count);

    // X^T X (upper triangle), X^T Y and Y^T Y
    let mut normal = Matrix4::<f64>::zeros();
    let mut rhs = Vector4::<f64>::zeros();
    let mut sum_bp4 = 0.0;
    let mut count = 0usize;

    for sample in samples.iter().filter(|sample| sample.flag.is_set()) {
        let bp = conditioner.condition(&sample.raw);
        let bp2 = bp.norm_squared();
        let row = Vector4::new(bp.x, bp.y, bp.z, 1.0);

        sum_bp4 += bp2 * bp2;
        rhs += row * bp2;

        // The [3][3] term is the sample count, set after the loop
        for i in 0..3 {
            for j in i..4 {
                normal[(i, j)] += row[i] * row[j];
            }
        }

        count += 1;
    }

    normal[(3, 3)] = count as f64;
    symmetrize_upper(&mut normal);

    let beta = invert_or_nan(normal) * rhs;

    // r^T r = Y^T Y - 2 beta^T (X^T Y) + beta^T (X^T X) beta
    let mut residual = sum_bp4 - 2.0 * beta.dot(&rhs) + beta.dot(&(normal * beta));
    if residual < 0.0 {
        // Rounding on an exact fit; clamped so the fit error reads 0 rather than NaN
        residual = 0.0;
    }

    let hard_iron = beta.xyz() * 0.5;
    let field = sqrt(beta[3] + hard_iron.norm_squared());
    let fit_error = sqrt(residual / count as f64) * 100.0 / (2.0 * field * field);

    let hard_iron = conditioner.restore_hard_iron(hard_iron);
    let field = field * f64::from(DEFAULT_B);

    log::trace!("4 element fit over {count} samples: residual {residual:e}");

    trial(
        Tier::Four,
        fit_error,
        field,
        hard_iron,
        Matrix3::identity(),
        count,
    )
}
