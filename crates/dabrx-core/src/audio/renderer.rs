//! Pull-model PCM renderer driven by the output stream callback.
//!
//! The renderer is a two-state machine. `Muted` emits silence until the
//! FIFO holds comfortably more than one callback of audio, then fades in;
//! `Playing` copies at volume and fades out whenever the buffer runs dry or
//! the control thread asks for it. Fades are geometric so they sound linear
//! in dB, and the stream callback is sized to exactly one fade, so a ramp
//! always fits in a single callback.

use std::sync::Arc;

use crate::audio::control::{request, OutputControl};
use crate::audio::AudioFormat;
use crate::config::OutputConfig;
use crate::fifo::SampleFifo;

/// What the stream should do after this callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Continue,
    /// Drained to silence with a stop or restart pending; the control
    /// thread may tear the stream down.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Muted,
    Playing,
}

pub struct AudioRenderer {
    fifo: Arc<SampleFifo>,
    control: Arc<OutputControl>,
    channels: usize,
    state: PlaybackState,
    /// Frames in one full fade (== one callback).
    fade_frames: usize,
    /// Per-frame gain factor of a full-length mute ramp.
    mute_factor: f32,
    /// Per-frame gain factor of a full-length unmute ramp.
    unmute_factor: f32,
    floor_db: f32,
    floor_lin: f32,
    unmute_mark_periods: usize,
    hard_mute_bytes: usize,
}

impl AudioRenderer {
    pub fn new(
        fifo: Arc<SampleFifo>,
        control: Arc<OutputControl>,
        format: AudioFormat,
        config: &OutputConfig,
    ) -> Self {
        let fade_frames = (format.frames_per_ms() * config.fade_ms as usize).max(1);
        let floor_db = config.fade_floor_db;
        let mute_factor = 10.0f32.powf(floor_db / (20.0 * fade_frames as f32));
        let hard_mute_bytes = (format.frames_per_ms() * config.hard_mute_ms as usize)
            .max(1)
            * format.bytes_per_frame();
        Self {
            fifo,
            control,
            channels: format.channels as usize,
            state: PlaybackState::Muted,
            fade_frames,
            mute_factor,
            unmute_factor: 2.0 - mute_factor,
            floor_db,
            floor_lin: config.fade_floor_lin(),
            unmute_mark_periods: config.unmute_mark_periods as usize,
            hard_mute_bytes,
        }
    }

    /// Frames the stream callback should request per period.
    pub fn frames_per_callback(&self) -> usize {
        self.fade_frames
    }

    /// Fills one callback worth of interleaved i16 frames.
    pub fn render(&mut self, out: &mut [i16]) -> PullOutcome {
        let bytes_needed = out.len() * 2;
        let request = self.control.requests();
        let available = self.fifo.available();

        match self.state {
            PlaybackState::Muted => {
                if available > self.unmute_mark_periods * bytes_needed {
                    if request != 0 {
                        // Stay silent but keep draining so a stop request
                        // cannot be starved by a full buffer.
                        out.fill(0);
                        self.fifo.discard(bytes_needed);
                        return self.complete_if_stopping(request);
                    }
                    if !self.fifo.pop(bytemuck::cast_slice_mut(out)) {
                        out.fill(0);
                        return PullOutcome::Continue;
                    }
                    self.apply_volume(out);
                    self.unmute_ramp(out);
                    log::info!("unmuting audio");
                    self.state = PlaybackState::Playing;
                    PullOutcome::Continue
                } else {
                    out.fill(0);
                    self.complete_if_stopping(request)
                }
            }
            PlaybackState::Playing => {
                if available < bytes_needed {
                    return self.underrun(out, available, request);
                }
                if !self.fifo.pop(bytemuck::cast_slice_mut(out)) {
                    return self.underrun(out, 0, request);
                }
                self.apply_volume(out);
                if request == 0 {
                    return PullOutcome::Continue;
                }
                let frames = out.len() / self.channels;
                self.mute_ramp(out, frames);
                log::info!("muting audio");
                self.state = PlaybackState::Muted;
                self.complete_if_stopping(request)
            }
        }
    }

    /// Playing with less than one callback buffered: play out what exists
    /// under a shortened fade, or cut straight to silence when it would be
    /// too short to matter.
    fn underrun(&mut self, out: &mut [i16], available: usize, request: u32) -> PullOutcome {
        self.state = PlaybackState::Muted;
        if available < self.hard_mute_bytes {
            log::info!("hard mute, audio buffer empty");
            out.fill(0);
            return self.complete_if_stopping(request);
        }
        let frame_bytes = self.channels * 2;
        let frames = available / frame_bytes;
        let samples = frames * self.channels;
        self.fifo.pop(bytemuck::cast_slice_mut(&mut out[..samples]));
        out[samples..].fill(0);
        self.apply_volume(&mut out[..samples]);
        self.mute_ramp(out, frames);
        log::info!("muting audio, {frames} frames left");
        self.complete_if_stopping(request)
    }

    fn complete_if_stopping(&mut self, request: u32) -> PullOutcome {
        if request & (request::STOP | request::RESTART) != 0 {
            self.control.mark_finished();
            PullOutcome::Complete
        } else {
            PullOutcome::Continue
        }
    }

    fn apply_volume(&self, out: &mut [i16]) {
        let volume = self.control.volume();
        // Close enough to unity that scaling would only add rounding noise.
        if volume > 0.9 {
            return;
        }
        for s in out.iter_mut() {
            *s = (f32::from(*s) * volume).round() as i16;
        }
    }

    /// Geometric rise from the fade floor toward unity over at most one
    /// fade. When fewer frames are on hand the factor is recomputed so the
    /// ramp still spans the full floor-to-unity range.
    fn unmute_ramp(&self, out: &mut [i16]) {
        let frames = out.len() / self.channels;
        let ramp = frames.min(self.fade_frames);
        if ramp == 0 {
            return;
        }
        let factor = if frames < self.fade_frames {
            2.0 - 10.0f32.powf(self.floor_db / (20.0 * frames as f32))
        } else {
            self.unmute_factor
        };
        let mut gain = self.floor_lin;
        for frame in out.chunks_mut(self.channels).take(ramp) {
            for s in frame.iter_mut() {
                *s = (f32::from(*s) * gain).round() as i16;
            }
            gain *= factor;
        }
    }

    /// Geometric fall from unity to the fade floor over `frames` frames,
    /// zeroing anything past the ramp.
    fn mute_ramp(&self, out: &mut [i16], frames: usize) {
        let ramp = frames.min(self.fade_frames);
        if ramp == 0 {
            out.fill(0);
            return;
        }
        let factor = if frames < self.fade_frames {
            10.0f32.powf(self.floor_db / (20.0 * frames as f32))
        } else {
            self.mute_factor
        };
        let mut gain = 1.0f32;
        for frame in out.chunks_mut(self.channels).take(ramp) {
            gain *= factor;
            for s in frame.iter_mut() {
                *s = (f32::from(*s) * gain).round() as i16;
            }
        }
        out[ramp * self.channels..].fill(0);
    }
}
