//! File-backed RF source for offline work: replays interleaved I/Q `f32`
//! recordings at the live sample rate so the rest of the pipeline behaves
//! exactly as it does against hardware.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::event::StreamFault;
use crate::input::error::{InputError, InputResult};
use crate::input::pump::SamplePump;
use crate::input::session::RfSource;
use crate::types::{iq_bytes, RF_SAMPLE_RATE};

/// Complex samples per replay chunk (8 ms at the RF rate).
const CHUNK_SAMPLES: usize = 32_768;

pub struct RawFileSource {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RawFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stop: Arc::new(AtomicBool::new(false)),
            streaming: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl RfSource for RawFileSource {
    fn open(&mut self) -> InputResult<()> {
        let meta = std::fs::metadata(&self.path)
            .map_err(|e| InputError::DeviceOpen(format!("{}: {e}", self.path.display())))?;
        if meta.len() < iq_bytes(1) as u64 {
            return Err(InputError::DeviceOpen(format!(
                "{}: file holds no samples",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn set_frequency(&mut self, frequency_khz: u32) -> InputResult<()> {
        // A recording has whatever channel it was taken on.
        log::debug!("raw file source ignoring retune to {frequency_khz} kHz");
        Ok(())
    }

    fn start(&mut self, mut pump: SamplePump) -> InputResult<()> {
        let mut file = File::open(&self.path)
            .map_err(|e| InputError::StartFailed(format!("{}: {e}", self.path.display())))?;

        self.stop.store(false, Ordering::SeqCst);
        self.streaming.store(true, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let streaming = Arc::clone(&self.streaming);

        let handle = thread::Builder::new()
            .name("rawfile-input".into())
            .spawn(move || {
                let chunk_period =
                    Duration::from_secs_f64(CHUNK_SAMPLES as f64 / RF_SAMPLE_RATE as f64);
                let mut chunk = vec![0.0f32; 2 * CHUNK_SAMPLES];
                let mut next_deadline = Instant::now();
                loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut chunk);
                    if file.read_exact(bytes).is_err() {
                        pump.stream_ended(StreamFault::EndOfFile);
                        break;
                    }
                    pump.on_samples(&chunk);
                    // Real-time pacing against an absolute schedule so read
                    // latency does not accumulate.
                    next_deadline += chunk_period;
                    let now = Instant::now();
                    if next_deadline > now {
                        thread::sleep(next_deadline - now);
                    }
                }
                streaming.store(false, Ordering::SeqCst);
            })
            .map_err(|e| InputError::StartFailed(e.to_string()))?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl Drop for RawFileSource {
    fn drop(&mut self) {
        self.stop();
    }
}
