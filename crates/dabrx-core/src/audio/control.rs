//! Shared control word between the control thread and the audio callback.
//!
//! The callback only ever reads atomics; the control thread only ever
//! writes them. The `finished` latch flows the other way: the callback sets
//! it once a stop or restart request has been drained to silence, and the
//! control thread tears the stream down on its next poll.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub mod request {
    pub const MUTE: u32 = 1 << 0;
    pub const STOP: u32 = 1 << 1;
    pub const RESTART: u32 = 1 << 2;
}

pub struct OutputControl {
    requests: AtomicU32,
    volume_bits: AtomicU32,
    finished: AtomicBool,
}

impl OutputControl {
    pub fn new() -> Self {
        Self {
            requests: AtomicU32::new(0),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Acquire)
    }

    pub fn set_mute(&self, mute: bool) {
        if mute {
            self.requests.fetch_or(request::MUTE, Ordering::AcqRel);
        } else {
            self.requests.fetch_and(!request::MUTE, Ordering::AcqRel);
        }
    }

    pub fn request_stop(&self) {
        self.requests.fetch_or(request::STOP, Ordering::AcqRel);
    }

    pub fn request_restart(&self) {
        self.requests.fetch_or(request::RESTART, Ordering::AcqRel);
    }

    /// Clears everything for a freshly built stream.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    /// Linear volume in `[0.0, 1.0]`.
    pub fn set_volume(&self, volume: f32) {
        let v = volume.clamp(0.0, 1.0);
        self.volume_bits.store(v.to_bits(), Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Acquire))
    }

    /// Callback side: the stream has drained and may be torn down.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn take_finished(&self) -> bool {
        self.finished.swap(false, Ordering::AcqRel)
    }
}

impl Default for OutputControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bits_compose() {
        let ctl = OutputControl::new();
        assert_eq!(ctl.requests(), 0);
        ctl.set_mute(true);
        ctl.request_stop();
        assert_eq!(ctl.requests(), request::MUTE | request::STOP);
        ctl.set_mute(false);
        assert_eq!(ctl.requests(), request::STOP);
        ctl.reset();
        assert_eq!(ctl.requests(), 0);
    }

    #[test]
    fn test_volume_clamps_and_round_trips() {
        let ctl = OutputControl::new();
        assert_eq!(ctl.volume(), 1.0);
        ctl.set_volume(0.35);
        assert_eq!(ctl.volume(), 0.35);
        ctl.set_volume(2.0);
        assert_eq!(ctl.volume(), 1.0);
        ctl.set_volume(-1.0);
        assert_eq!(ctl.volume(), 0.0);
    }

    #[test]
    fn test_finished_latch_clears_on_take() {
        let ctl = OutputControl::new();
        assert!(!ctl.take_finished());
        ctl.mark_finished();
        assert!(ctl.take_finished());
        assert!(!ctl.take_finished());
    }
}
