//! Audio streaming core: pull-model renderer behind a cpal output stream.

pub mod control;
pub mod cpal_backend;
pub mod error;
pub mod output;
pub mod renderer;

pub use control::OutputControl;
pub use error::{AudioError, AudioResult};
pub use output::AudioOutput;
pub use renderer::{AudioRenderer, PullOutcome};

/// PCM format of one audio service (changes between services, hence the
/// restart path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * std::mem::size_of::<i16>()
    }

    pub fn frames_per_ms(&self) -> usize {
        (self.sample_rate / 1000) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_arithmetic() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.frames_per_ms(), 48);
    }
}
