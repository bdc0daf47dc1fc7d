//! Control-side handle over the audio output stream.
//!
//! Stop and restart are asynchronous by design: the request bit makes the
//! callback fade to silence first, the callback latches `finished`, and the
//! next `poll()` here tears the stream down (and rebuilds it with the new
//! format on restart). Tearing a stream down mid-note is the one thing this
//! module exists to avoid.

use std::sync::Arc;

use cpal::traits::StreamTrait;
use crossbeam::channel::Sender;

use crate::audio::control::OutputControl;
use crate::audio::cpal_backend;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::renderer::AudioRenderer;
use crate::audio::AudioFormat;
use crate::config::OutputConfig;
use crate::event::ReceiverEvent;
use crate::fifo::SampleFifo;

pub struct AudioOutput {
    fifo: Arc<SampleFifo>,
    control: Arc<OutputControl>,
    config: OutputConfig,
    events: Sender<ReceiverEvent>,
    stream: Option<cpal::Stream>,
    format: Option<AudioFormat>,
    pending_format: Option<AudioFormat>,
}

impl AudioOutput {
    pub fn new(config: OutputConfig, events: Sender<ReceiverEvent>) -> Self {
        let fifo_bytes = {
            // Sized for the worst supported format (48 kHz stereo).
            let worst = AudioFormat {
                sample_rate: 48_000,
                channels: 2,
            };
            worst.frames_per_ms() * worst.bytes_per_frame() * config.fifo_ms as usize
        };
        Self {
            fifo: Arc::new(SampleFifo::new(fifo_bytes)),
            control: Arc::new(OutputControl::new()),
            config,
            events,
            stream: None,
            format: None,
            pending_format: None,
        }
    }

    /// Handle to the FIFO the decoder writes PCM into.
    pub fn fifo(&self) -> Arc<SampleFifo> {
        Arc::clone(&self.fifo)
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Opens the output stream for `format`, replacing any running stream
    /// immediately (callers wanting a clean fade use `restart`).
    pub fn start(&mut self, format: AudioFormat) -> AudioResult<()> {
        self.stream = None;
        self.control.reset();
        let device = cpal_backend::find_output_device(self.config.device.as_deref())?;
        let renderer = AudioRenderer::new(
            Arc::clone(&self.fifo),
            Arc::clone(&self.control),
            format,
            &self.config,
        );
        let stream =
            cpal_backend::build_output_stream(&device, renderer, format, self.events.clone())?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        self.stream = Some(stream);
        self.format = Some(format);
        Ok(())
    }

    /// Fade out, then tear the stream down on a later `poll()`.
    pub fn stop(&mut self) {
        if self.stream.is_some() {
            self.control.request_stop();
        }
    }

    /// Fade out, then rebuild with `format` (service change). Starts
    /// directly when nothing is playing yet.
    pub fn restart(&mut self, format: AudioFormat) -> AudioResult<()> {
        if self.stream.is_none() {
            return self.start(format);
        }
        self.pending_format = Some(format);
        self.control.request_restart();
        Ok(())
    }

    pub fn set_mute(&self, mute: bool) {
        self.control.set_mute(mute);
    }

    pub fn set_volume(&self, volume: f32) {
        self.control.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.control.volume()
    }

    /// Periodic service call: finishes stop/restart sequences whose fades
    /// have completed.
    pub fn poll(&mut self) -> AudioResult<()> {
        if !self.control.take_finished() {
            return Ok(());
        }
        let restart = self.pending_format.take();
        self.stream = None;
        self.format = None;
        self.control.reset();
        match restart {
            Some(format) => {
                log::info!(
                    "restarting audio output at {} Hz, {} ch",
                    format.sample_rate,
                    format.channels
                );
                self.fifo.reset();
                self.start(format)?;
                let _ = self.events.try_send(ReceiverEvent::AudioOutputRestarted);
                Ok(())
            }
            None => {
                log::info!("audio output stopped");
                self.fifo.reset();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;

    // Stream construction needs real hardware; these tests cover the
    // control-side sequencing that runs before any device is opened.

    #[test]
    fn test_stop_without_stream_is_a_noop() {
        let (events_tx, _events_rx) = event_channel();
        let mut out = AudioOutput::new(OutputConfig::default(), events_tx);
        out.stop();
        assert_eq!(out.control.requests(), 0);
        assert!(!out.is_running());
    }

    #[test]
    fn test_poll_without_finish_does_nothing() {
        let (events_tx, events_rx) = event_channel();
        let mut out = AudioOutput::new(OutputConfig::default(), events_tx);
        out.fifo().write(&[1u8; 64]).unwrap();
        out.poll().unwrap();
        assert_eq!(out.fifo().available(), 64);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn test_volume_reaches_control_word() {
        let (events_tx, _events_rx) = event_channel();
        let out = AudioOutput::new(OutputConfig::default(), events_tx);
        out.set_volume(0.4);
        assert_eq!(out.volume(), 0.4);
    }
}
