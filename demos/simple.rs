use magcal::{CycleOutcome, MAG_BUFFER_SIZE, MagBuffer, MagCalibrator};
use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;

const UT_PER_COUNT: f64 = 0.1; // sensor scale, matches the default settings

fn main() {
    let mut calibrator = MagCalibrator::new();
    let mut buffer = MagBuffer::new();
    let mut rng = Pcg64::seed_from_u64(2024);

    // Simulated sensor: 49 uT field, hard iron offset and mild soft iron
    let hard_iron = Vector3::new(18.0, -27.0, 41.0);
    #[rustfmt::skip]
    let distortion = Matrix3::new(
        1.08, 0.03, -0.02,
        0.03, 0.94, 0.01,
        -0.02, 0.01, 0.99,
    );

    for step in 0..(MAG_BUFFER_SIZE * 4) {
        // this loop should repeat each time new magnetometer data is available
        let z: f64 = rng.random_range(-1.0..1.0);
        let phi: f64 = rng.random_range(0.0..std::f64::consts::TAU);
        let r = (1.0 - z * z).sqrt();
        let ut = hard_iron + distortion * Vector3::new(r * phi.cos(), r * phi.sin(), z) * 49.0;
        let raw = ut.map(|v| (v / UT_PER_COUNT).round() as i16); // replace with actual readings in counts

        // Fill slots one after another, wrapping once the buffer is full
        buffer
            .insert(step % MAG_BUFFER_SIZE, raw)
            .expect("slot index within the buffer");

        if let CycleOutcome::Accepted { tier, fit_error, field } = calibrator.run_cycle(buffer.samples()) {
            println!("step {step}: accepted {tier:?} fit, B = {field:.2} uT, fit error {fit_error:.3}%");
        }
    }

    let calibration = calibrator.calibration();
    println!("Hard iron (uT): {:?}", calibration.hard_iron.as_slice());
    println!("Soft iron: {}", calibration.soft_iron);

    let corrected = calibrator.apply(Vector3::new(500, 200, -300));
    println!("Corrected reading (uT): {:?}, |B| = {:.2}", corrected.as_slice(), corrected.norm());
}
