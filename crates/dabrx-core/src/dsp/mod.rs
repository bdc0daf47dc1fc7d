//! DSP building blocks for the input path.

pub mod halfband;
pub mod level;

pub use halfband::{FilterError, HalfBandDecimator, DECIMATOR_TAPS};
pub use level::{level_channel, GainController, LevelTracker, NEUTRAL_LEVEL};
