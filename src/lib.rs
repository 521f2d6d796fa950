#![no_std]

//! Magcal - online magnetometer calibration
//!
//! Estimates the hard iron offset and soft iron correction matrix of a
//! 3-axis magnetometer from a rolling buffer of raw samples, together with
//! the geomagnetic field strength and a fit error percentage.
//!
//! Three ellipsoid fits of increasing richness are available, and a
//! scheduler picks one by the number of samples collected:
//!
//! - **4 element**: hard iron only, sphere fit by 4x4 matrix inversion
//!   (40 samples or more)
//! - **7 element**: hard iron and diagonal soft iron, eigen-decomposition
//!   of a 7x7 measurement matrix (100 samples or more)
//! - **10 element**: hard iron and full symmetric soft iron,
//!   eigen-decomposition of a 10x10 measurement matrix (150 samples or more)
//!
//! A new fit only replaces the accepted one when its field strength is
//! within 22-67 uT and its fit error improves on the accepted (slowly aging)
//! fit error, or it comes from a richer model with a fit error of 4% or less.
//!
//! `#![no_std]` compatible; the numeric core never allocates.
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use magcal::{MagBuffer, MagCalibrator};
//!
//! let mut calibrator = MagCalibrator::new();
//! let mut buffer = MagBuffer::new();
//!
//! // Acquisition code fills the buffer with raw readings (counts)
//! buffer.insert(0, Vector3::new(512, -130, 220)).unwrap();
//!
//! // Call at a roughly fixed rate; every 20th call attempts a calibration
//! calibrator.run_cycle(buffer.samples());
//!
//! // Correct a raw reading with whatever calibration is accepted
//! let field = calibrator.apply(Vector3::new(512, -130, 220));
//! ```

mod buffer;
pub mod calibration;
pub mod calibrator;
mod math;
pub mod solver;
mod types;

// Re-export all public types and functions
pub use buffer::{BufferError, MAG_BUFFER_SIZE, MagBuffer, MagSample, SampleBuffer, SlotFlag};
pub use calibration::calibrate_magnetic;
pub use calibrator::{MagCalibrator, accepts};
pub use solver::{solve4, solve7, solve10};
pub use types::*;
