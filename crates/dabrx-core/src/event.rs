//! Receiver events surfaced from the streaming threads to the application.
//!
//! The channel is bounded and real-time contexts only ever `try_send`, so a
//! slow UI can never stall the RF callback or the audio callback.

use crossbeam::channel::{bounded, Receiver, Sender};

pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Why a stream stopped producing samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFault {
    /// Device vanished mid-stream (unplugged, driver died).
    DeviceDisconnected,
    /// Device is present but delivered nothing within the watchdog window.
    NoDataAvailable,
    /// A file-backed source ran out of samples.
    EndOfFile,
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamFault::DeviceDisconnected => write!(f, "device disconnected"),
            StreamFault::NoDataAvailable => write!(f, "no data from device"),
            StreamFault::EndOfFile => write!(f, "end of file"),
        }
    }
}

/// Notifications from the input and output cores.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// Input device opened and ready to tune.
    DeviceReady,
    /// Retune finished; 0 kHz means the stream was parked idle.
    Tuned { frequency_khz: u32 },
    /// A whole block was dropped because the sample FIFO was full.
    SamplesDropped { samples: usize },
    /// Smoothed signal level (every 8th block by default).
    AgcLevel { level: f32 },
    /// Software AGC moved the device gain.
    AgcGain { index: i32 },
    /// Raw dump toggled on or off.
    DumpingToFile { running: bool },
    /// Cumulative bytes written by the raw dump sink.
    DumpedBytes { bytes: u64 },
    /// Input stream stopped or stalled.
    StreamError { fault: StreamFault },
    /// Audio output was torn down and rebuilt (format change).
    AudioOutputRestarted,
    /// The audio stream reported a backend error.
    AudioOutputError,
}

/// Builds the bounded event channel shared by both streaming cores.
pub fn event_channel() -> (Sender<ReceiverEvent>, Receiver<ReceiverEvent>) {
    bounded(EVENT_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_send_drops_when_full() {
        let (tx, rx) = event_channel();
        for _ in 0..EVENT_QUEUE_CAPACITY {
            tx.try_send(ReceiverEvent::DeviceReady).unwrap();
        }
        assert!(tx.try_send(ReceiverEvent::DeviceReady).is_err());
        assert_eq!(rx.try_recv(), Ok(ReceiverEvent::DeviceReady));
    }
}
