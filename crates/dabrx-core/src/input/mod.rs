//! Input streaming core: RF source seam, driver-thread sample pump and the
//! control-thread session state machine.

pub mod dump;
pub mod error;
pub mod pump;
pub mod rawfile;
pub mod session;

pub use dump::{RawRecorder, RecorderHandle};
pub use error::{InputError, InputResult};
pub use pump::SamplePump;
pub use rawfile::RawFileSource;
pub use session::{InputSession, RfSource};

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle of a sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Idle = 0,
    Tuning = 1,
    Streaming = 2,
    Stopping = 3,
    Disconnected = 4,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StreamState::Tuning,
            2 => StreamState::Streaming,
            3 => StreamState::Stopping,
            4 => StreamState::Disconnected,
            _ => StreamState::Idle,
        }
    }
}

/// State visible to both the control thread and the driver thread.
pub struct SessionShared {
    state: AtomicU8,
    alive: AtomicBool,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Idle as u8),
            alive: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Driver thread: note that samples arrived.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Watchdog: read and clear the liveness flag.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}
