//! Applying a magnetometer calibration to sensor readings

use nalgebra::{Matrix3, Vector3};

/// Convert a raw reading in sensor counts to microtesla
pub fn counts_to_ut(raw: Vector3<i16>, ut_per_count: f32) -> Vector3<f32> {
    raw.map(|count| count as f32 * ut_per_count)
}

/// Applies magnetometer calibration (hard and soft iron correction)
///
/// Computes `soft_iron_matrix * (uncalibrated - hard_iron_offset)`.
///
/// # Arguments
/// * `uncalibrated` - Magnetometer reading in microtesla
/// * `soft_iron_matrix` - 3x3 soft iron correction matrix
/// * `hard_iron_offset` - Hard iron offset vector in microtesla
///
/// # Returns
/// Calibrated magnetometer reading
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use magcal::calibration::calibrate_magnetic;
///
/// let raw = Vector3::new(100.0, 200.0, 300.0);
/// let soft_iron = Matrix3::identity();
/// let hard_iron = Vector3::new(10.0, 20.0, 30.0);
///
/// let calibrated = calibrate_magnetic(raw, soft_iron, hard_iron);
/// assert_eq!(calibrated, Vector3::new(90.0, 180.0, 270.0));
/// ```
pub fn calibrate_magnetic(
    uncalibrated: Vector3<f32>,
    soft_iron_matrix: Matrix3<f32>,
    hard_iron_offset: Vector3<f32>,
) -> Vector3<f32> {
    soft_iron_matrix * (uncalibrated - hard_iron_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_to_ut() {
        let raw = Vector3::new(500i16, -250, 0);
        let ut = counts_to_ut(raw, 0.1);
        assert!((ut - Vector3::new(50.0, -25.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_magnetic_calibration() {
        let raw = Vector3::new(100.0, 200.0, 300.0);
        let soft_iron = Matrix3::identity();
        let hard_iron = Vector3::new(10.0, 20.0, 30.0);

        let calibrated = calibrate_magnetic(raw, soft_iron, hard_iron);
        let expected = Vector3::new(90.0, 180.0, 270.0); // raw - hard_iron

        assert!((calibrated - expected).magnitude() < 1e-6);
    }

    #[test]
    fn test_soft_iron_scales_after_offset() {
        let raw = Vector3::new(30.0, 10.0, -10.0);
        let soft_iron = Matrix3::from_diagonal(&Vector3::new(2.0, 0.5, 1.0));
        let hard_iron = Vector3::new(10.0, 10.0, 10.0);

        let calibrated = calibrate_magnetic(raw, soft_iron, hard_iron);
        let expected = Vector3::new(40.0, 0.0, -20.0);

        assert!((calibrated - expected).magnitude() < 1e-6);
    }
}
