use approx::assert_relative_eq;
use magcal::calibrator::{CALIBRATION_PERIOD, FIT_ERROR_AGING};
use magcal::{CycleOutcome, MagCalibrator, MagSample, SampleBuffer, SlotFlag, Tier};
use nalgebra::{Matrix3, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const UT_PER_COUNT: f64 = 0.1;
const CAPACITY: usize = 200;

/// Raw readings (counts) on the ellipsoid `|W (x - V)| = B`, optionally with
/// uniform noise of up to `noise` counts per axis
fn readings(
    count: usize,
    seed: u64,
    hard_iron: Vector3<f64>,
    field: f64,
    soft_iron: Matrix3<f64>,
    noise: i16,
) -> Vec<Vector3<i16>> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let distortion = soft_iron.try_inverse().unwrap();
    (0..count)
        .map(|_| {
            let z: f64 = rng.random_range(-1.0..1.0);
            let phi: f64 = rng.random_range(0.0..core::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            let u = Vector3::new(r * phi.cos(), r * phi.sin(), z);

            let ut = hard_iron + distortion * u * field;
            let jitter = Vector3::from_fn(|_, _| rng.random_range(-noise..=noise));
            ut.map(|v| (v / UT_PER_COUNT).round() as i16) + jitter
        })
        .collect()
}

/// Fill the first slots of a fresh buffer, leaving the rest empty
fn buffer_with(readings: &[Vector3<i16>]) -> SampleBuffer<CAPACITY> {
    let mut buffer = SampleBuffer::new();
    for (index, raw) in readings.iter().enumerate() {
        buffer.insert(index, *raw).unwrap();
    }
    buffer
}

/// Call the scheduler until it attempts a calibration
fn attempt(calibrator: &mut MagCalibrator, samples: &[MagSample]) -> CycleOutcome {
    for _ in 1..CALIBRATION_PERIOD {
        assert_eq!(calibrator.run_cycle(samples), CycleOutcome::Throttled);
    }
    calibrator.run_cycle(samples)
}

fn diagonal_soft_iron() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.1, 0.95, 1.0 / (1.1 * 0.95)))
}

/// Test that tiers are chosen by sample count and richer tiers take over
#[test]
fn test_tier_progression() {
    let hard_iron = Vector3::new(20.0, -15.0, 35.0);
    let all = readings(CAPACITY, 11, hard_iron, 50.0, diagonal_soft_iron(), 0);
    let mut calibrator = MagCalibrator::new();

    // Too few samples: nothing happens
    let buffer = buffer_with(&all[..39]);
    assert_eq!(
        attempt(&mut calibrator, buffer.samples()),
        CycleOutcome::InsufficientSamples { count: 39 }
    );
    assert!(!calibrator.calibration().is_valid());

    // 4 element fit accepted as the first calibration despite the soft iron
    let buffer = buffer_with(&all[..60]);
    let outcome = attempt(&mut calibrator, buffer.samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Four, .. }), "{outcome:?}");
    let four = calibrator.calibration();
    assert_eq!(four.tier, Some(Tier::Four));
    assert_eq!(four.soft_iron, Matrix3::identity());
    assert!(four.fit_error > 1.0);

    // 7 element fit models the diagonal soft iron and fits better
    let buffer = buffer_with(&all[..120]);
    let outcome = attempt(&mut calibrator, buffer.samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Seven, .. }), "{outcome:?}");
    let seven = calibrator.calibration();
    assert!(seven.fit_error < four.fit_error);
    assert_relative_eq!(seven.field, 50.0, epsilon = 0.1);
    assert_relative_eq!(seven.four_b_squared, 4.0 * seven.field * seven.field);

    // Every slot filled: 10 element fit as a richer tier under 4%
    let buffer = buffer_with(&all);
    let outcome = attempt(&mut calibrator, buffer.samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Ten, .. }), "{outcome:?}");
    let ten = calibrator.calibration();
    assert_relative_eq!(ten.hard_iron, hard_iron.map(|v| v as f32), epsilon = 0.1);
    assert_relative_eq!(ten.soft_iron, diagonal_soft_iron().map(|v| v as f32), epsilon = 5e-3);
}

/// Test that a same-tier trial with a worse fit is rejected and the accepted
/// fit error ages once per attempt
#[test]
fn test_rejection_and_aging() {
    let hard_iron = Vector3::new(-10.0, 5.0, 12.0);
    let clean = buffer_with(&readings(CAPACITY, 21, hard_iron, 48.0, Matrix3::identity(), 0));
    let noisy = buffer_with(&readings(CAPACITY, 22, hard_iron, 48.0, Matrix3::identity(), 25));
    let mut calibrator = MagCalibrator::new();

    let outcome = attempt(&mut calibrator, clean.samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Ten, .. }));
    let accepted = calibrator.calibration();

    let mut expected_fit_error = accepted.fit_error;
    for _ in 0..5 {
        let outcome = attempt(&mut calibrator, noisy.samples());
        assert!(
            matches!(outcome, CycleOutcome::Rejected { tier: Tier::Ten, .. }),
            "{outcome:?}"
        );
        expected_fit_error *= FIT_ERROR_AGING;

        let current = calibrator.calibration();
        assert_eq!(current.fit_error, expected_fit_error);
        // Everything except the aged fit error is untouched
        assert_eq!(current.tier, accepted.tier);
        assert_eq!(current.field, accepted.field);
        assert_eq!(current.hard_iron, accepted.hard_iron);
        assert_eq!(current.soft_iron, accepted.soft_iron);
    }

    // Throttled calls do not age the fit error
    assert_eq!(calibrator.run_cycle(noisy.samples()), CycleOutcome::Throttled);
    assert_eq!(calibrator.calibration().fit_error, expected_fit_error);
}

/// Test that an attempt with too few samples leaves the accepted fit error
/// unaged
#[test]
fn test_insufficient_samples_skip_aging() {
    let all = readings(60, 71, Vector3::new(4.0, -6.0, 2.0), 50.0, Matrix3::identity(), 0);
    let mut calibrator = MagCalibrator::new();

    let outcome = attempt(&mut calibrator, buffer_with(&all).samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Four, .. }), "{outcome:?}");
    let accepted = calibrator.calibration();

    let sparse = buffer_with(&all[..39]);
    for _ in 0..3 {
        assert_eq!(
            attempt(&mut calibrator, sparse.samples()),
            CycleOutcome::InsufficientSamples { count: 39 }
        );
        assert_eq!(calibrator.calibration(), accepted);
    }
}

/// Test that a field outside 22-67 uT is never committed
#[test]
fn test_field_out_of_range_never_committed() {
    for field in [10.0, 80.0] {
        let buffer = buffer_with(&readings(60, 31, Vector3::zeros(), field, Matrix3::identity(), 0));
        let mut calibrator = MagCalibrator::new();

        let outcome = attempt(&mut calibrator, buffer.samples());
        match outcome {
            CycleOutcome::FieldOutOfRange { tier, field: trial_field } => {
                assert_eq!(tier, Tier::Four);
                assert_relative_eq!(trial_field, field as f32, epsilon = 0.5);
            }
            other => panic!("expected a range rejection, got {other:?}"),
        }
        assert!(!calibrator.calibration().is_valid());
    }
}

/// Test that a range rejection leaves an accepted calibration in place
#[test]
fn test_out_of_range_keeps_accepted() {
    let good = buffer_with(&readings(60, 41, Vector3::zeros(), 50.0, Matrix3::identity(), 0));
    let weak = buffer_with(&readings(60, 42, Vector3::zeros(), 15.0, Matrix3::identity(), 0));
    let mut calibrator = MagCalibrator::new();

    attempt(&mut calibrator, good.samples());
    let accepted = calibrator.calibration();
    assert!(accepted.is_valid());

    let outcome = attempt(&mut calibrator, weak.samples());
    assert!(matches!(outcome, CycleOutcome::FieldOutOfRange { .. }));
    assert_eq!(calibrator.calibration().field, accepted.field);
    assert_eq!(calibrator.calibration().hard_iron, accepted.hard_iron);
}

/// Test that sentinel slots count towards the tier but the 10 element fit
/// skips them
#[test]
fn test_sentinel_slots_select_tier_ten() {
    let hard_iron = Vector3::new(8.0, 8.0, -8.0);
    let data = readings(160, 51, hard_iron, 45.0, Matrix3::identity(), 0);
    let mut buffer = buffer_with(&data);
    for index in data.len()..CAPACITY {
        buffer.set_flag(index, SlotFlag::Invalidated).unwrap();
    }
    assert_eq!(buffer.count_set(), CAPACITY);

    let mut calibrator = MagCalibrator::new();
    let outcome = attempt(&mut calibrator, buffer.samples());
    assert!(matches!(outcome, CycleOutcome::Accepted { tier: Tier::Ten, .. }), "{outcome:?}");

    let calibration = calibrator.calibration();
    assert_relative_eq!(calibration.field, 45.0, epsilon = 0.1);
    assert_relative_eq!(calibration.hard_iron, hard_iron.map(|v| v as f32), epsilon = 0.1);
}

/// Test that the accepted calibration corrects raw readings onto a sphere
#[test]
fn test_apply_accepted_calibration() {
    let hard_iron = Vector3::new(30.0, -20.0, 10.0);
    let data = readings(CAPACITY, 61, hard_iron, 50.0, diagonal_soft_iron(), 0);
    let mut calibrator = MagCalibrator::new();
    attempt(&mut calibrator, buffer_with(&data).samples());

    let field = calibrator.calibration().field;
    for raw in &data {
        assert_relative_eq!(calibrator.apply(*raw).norm(), field, epsilon = 0.2);
    }
}
