//! Real-time sample-streaming core of a DAB SDR receiver.
//!
//! Two halves connected by byte FIFOs:
//!
//! - **Input**: an RF front end ([`input::RfSource`]) feeds interleaved I/Q
//!   floats into a [`input::SamplePump`] on its driver thread; the pump
//!   decimates 2:1 ([`dsp::HalfBandDecimator`]), tracks the signal level
//!   for software AGC and writes into a [`SampleFifo`] the demodulator
//!   reads. [`input::InputSession`] sequences tune/stop and runs the
//!   watchdog from the control thread.
//! - **Output**: the decoder writes PCM into a second [`SampleFifo`];
//!   a cpal stream pulls it through [`audio::AudioRenderer`], which fades
//!   in and out instead of clicking whenever the buffer runs dry or the
//!   service changes.
//!
//! The demodulator/decoder between the FIFOs is a separate crate; this one
//! only promises that samples flow in real time on both ends.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod event;
pub mod fifo;
pub mod input;
pub mod types;

pub use audio::{AudioFormat, AudioOutput};
pub use config::{AgcConfig, InputConfig, OutputConfig};
pub use event::{event_channel, ReceiverEvent, StreamFault};
pub use fifo::SampleFifo;
pub use input::{InputSession, RawFileSource, RfSource};
