//! Fixed-capacity raw magnetometer sample buffer

use nalgebra::Vector3;
use thiserror::Error;

/// Number of slots in the default magnetometer buffer
pub const MAG_BUFFER_SIZE: usize = 650;

/// Sample buffer sized for typical online calibration
pub type MagBuffer = SampleBuffer<MAG_BUFFER_SIZE>;

/// Errors raised when addressing buffer slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The requested slot does not exist
    #[error("slot {index} is out of range for a buffer of capacity {capacity}")]
    SlotOutOfRange {
        /// Requested slot index
        index: usize,
        /// Capacity of the buffer
        capacity: usize,
    },
}

/// Per-slot validity indicator
///
/// The raw encoding is a signed byte: `0` for a slot that was never written,
/// `-1` for a slot that was explicitly invalidated and any other value for a
/// slot holding a usable reading.
///
/// The two readings of "valid" are kept apart on purpose: the 4 and 7
/// element fits (and the sample count) only look at whether the flag is
/// non-zero, while the 10 element fit only skips the `-1` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotFlag {
    /// Never written (raw `0`)
    #[default]
    Empty,
    /// Holds a reading (raw `1`, or any value other than `0` and `-1`)
    Valid,
    /// Explicitly invalidated (raw `-1`)
    Invalidated,
}

impl SlotFlag {
    /// Decode a raw flag byte
    pub fn from_raw(raw: i8) -> Self {
        match raw {
            0 => SlotFlag::Empty,
            -1 => SlotFlag::Invalidated,
            _ => SlotFlag::Valid,
        }
    }

    /// Encode as a raw flag byte
    pub fn as_raw(self) -> i8 {
        match self {
            SlotFlag::Empty => 0,
            SlotFlag::Valid => 1,
            SlotFlag::Invalidated => -1,
        }
    }

    /// Boolean truthiness of the raw flag (non-zero)
    pub fn is_set(self) -> bool {
        self.as_raw() != 0
    }

    /// True unless the flag holds the `-1` sentinel
    pub fn is_not_sentinel(self) -> bool {
        self != SlotFlag::Invalidated
    }
}

/// One buffer slot: a raw 3-axis reading in sensor counts plus its flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MagSample {
    /// Raw reading in sensor counts
    pub raw: Vector3<i16>,
    /// Validity indicator
    pub flag: SlotFlag,
}

impl MagSample {
    /// Create a valid sample from raw counts
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self {
            raw: Vector3::new(x, y, z),
            flag: SlotFlag::Valid,
        }
    }
}

/// Fixed-capacity buffer of raw magnetometer samples
///
/// The calibration core only reads the buffer. Deciding which slot a new
/// reading should replace is left to the acquisition code that owns it.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use magcal::{SampleBuffer, SlotFlag};
///
/// let mut buffer = SampleBuffer::<8>::new();
/// buffer.insert(0, Vector3::new(120, -40, 300)).unwrap();
/// buffer.set_flag(1, SlotFlag::Invalidated).unwrap();
///
/// assert_eq!(buffer.count_set(), 2);
/// assert!(buffer.insert(8, Vector3::zeros()).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct SampleBuffer<const N: usize> {
    slots: [MagSample; N],
}

impl<const N: usize> SampleBuffer<N> {
    /// Create an empty buffer with every slot flagged [`SlotFlag::Empty`]
    pub fn new() -> Self {
        Self {
            slots: [MagSample::default(); N],
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        N
    }

    /// Write a raw reading into a slot and mark it valid
    pub fn insert(&mut self, index: usize, raw: Vector3<i16>) -> Result<(), BufferError> {
        let slot = self.slot_mut(index)?;
        slot.raw = raw;
        slot.flag = SlotFlag::Valid;
        Ok(())
    }

    /// Overwrite the flag of a slot, keeping its reading
    pub fn set_flag(&mut self, index: usize, flag: SlotFlag) -> Result<(), BufferError> {
        self.slot_mut(index)?.flag = flag;
        Ok(())
    }

    /// Mark a slot with the invalidation sentinel
    pub fn invalidate(&mut self, index: usize) -> Result<(), BufferError> {
        self.set_flag(index, SlotFlag::Invalidated)
    }

    /// Reset every slot to empty
    pub fn clear(&mut self) {
        self.slots = [MagSample::default(); N];
    }

    /// Get a slot by index
    pub fn get(&self, index: usize) -> Option<&MagSample> {
        self.slots.get(index)
    }

    /// All slots in index order
    pub fn samples(&self) -> &[MagSample] {
        &self.slots
    }

    /// Number of slots whose flag is set (non-zero)
    pub fn count_set(&self) -> usize {
        count_set(&self.slots)
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut MagSample, BufferError> {
        self.slots
            .get_mut(index)
            .ok_or(BufferError::SlotOutOfRange { index, capacity: N })
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AsRef<[MagSample]> for SampleBuffer<N> {
    fn as_ref(&self) -> &[MagSample] {
        &self.slots
    }
}

/// Count samples whose flag is set (non-zero)
pub(crate) fn count_set(samples: &[MagSample]) -> usize {
    samples.iter().filter(|sample| sample.flag.is_set()).count()
}
