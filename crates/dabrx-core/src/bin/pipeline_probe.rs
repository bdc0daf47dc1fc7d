//! End-to-end smoke probe: streams a synthetic carrier through the input
//! core and a test tone through the audio output for a few seconds while
//! printing every receiver event.
//!
//! With a file argument the input side replays a raw I/Q recording instead:
//!
//! ```text
//! pipeline-probe [recording.raw]
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use dabrx_core::input::{InputResult, SamplePump};
use dabrx_core::{
    event_channel, AudioFormat, AudioOutput, InputConfig, InputSession, OutputConfig,
    RawFileSource, ReceiverEvent, RfSource, SampleFifo,
};

const RUN_SECONDS: u64 = 5;
const TONE_HZ: f32 = 440.0;

/// Synthetic front end producing a constant-envelope carrier.
struct ToneSource {
    stop: Arc<AtomicBool>,
    streaming: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ToneSource {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            streaming: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl RfSource for ToneSource {
    fn open(&mut self) -> InputResult<()> {
        Ok(())
    }

    fn set_frequency(&mut self, _frequency_khz: u32) -> InputResult<()> {
        Ok(())
    }

    fn start(&mut self, mut pump: SamplePump) -> InputResult<()> {
        self.stop.store(false, Ordering::SeqCst);
        self.streaming.store(true, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let streaming = Arc::clone(&self.streaming);
        let handle = thread::spawn(move || {
            const CHUNK: usize = 32_768; // complex samples, 8 ms at 4096 kHz
            let period = Duration::from_secs_f64(CHUNK as f64 / 4_096_000.0);
            let mut phase = 0.0f32;
            let mut chunk = vec![0.0f32; 2 * CHUNK];
            let mut deadline = Instant::now();
            while !stop.load(Ordering::SeqCst) {
                for sample in chunk.chunks_mut(2) {
                    sample[0] = 0.5 * phase.cos();
                    sample[1] = 0.5 * phase.sin();
                    phase += 0.01;
                }
                pump.on_samples(&chunk);
                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
            streaming.store(false, Ordering::SeqCst);
        });
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

    fn gain_range(&self) -> (i32, i32) {
        (0, 21)
    }
}

/// Feeds a sine tone into the audio FIFO at the decoder's pace.
fn spawn_tone_writer(
    fifo: Arc<SampleFifo>,
    format: AudioFormat,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let frames_per_chunk = format.frames_per_ms() * 10;
        let period = Duration::from_millis(10);
        let mut phase = 0.0f32;
        let step = TONE_HZ * std::f32::consts::TAU / format.sample_rate as f32;
        let mut pcm = vec![0i16; frames_per_chunk * format.channels as usize];
        let mut deadline = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            for frame in pcm.chunks_mut(format.channels as usize) {
                let v = (phase.sin() * 8_000.0) as i16;
                frame.fill(v);
                phase += step;
            }
            if let Err(e) = fifo.write(bytemuck::cast_slice(&pcm)) {
                log::debug!("audio fifo full, skipping a chunk: {e}");
            }
            deadline += period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let source: Box<dyn RfSource> = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("replaying {path}");
            Box::new(RawFileSource::new(path))
        }
        None => {
            log::info!("no recording given, using a synthetic carrier");
            Box::new(ToneSource::new())
        }
    };

    let (events_tx, events_rx) = event_channel();

    let mut session = InputSession::new(source, InputConfig::default(), events_tx.clone());
    session.open().context("opening input source")?;
    session.tune(227_360).context("tuning")?;
    let input_fifo = session.fifo();

    let format = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
    };
    let mut output = AudioOutput::new(OutputConfig::default(), events_tx);
    output.start(format).context("starting audio output")?;

    let tone_stop = Arc::new(AtomicBool::new(false));
    let tone = spawn_tone_writer(output.fifo(), format, Arc::clone(&tone_stop));

    let deadline = Instant::now() + Duration::from_secs(RUN_SECONDS);
    let mut drained = 0u64;
    let mut sink = vec![0u8; 65_536];
    while Instant::now() < deadline {
        session.poll();
        output.poll().context("audio output poll")?;
        // Stand in for the demodulator: drain whatever the input produced.
        while input_fifo.available() >= sink.len() {
            if input_fifo.read(&mut sink, Duration::from_millis(1)) {
                drained += sink.len() as u64;
            }
        }
        while let Ok(event) = events_rx.try_recv() {
            match event {
                ReceiverEvent::AgcLevel { level } => log::debug!("agc level {level:.4}"),
                other => log::info!("{other:?}"),
            }
        }
        thread::sleep(Duration::from_millis(20));
    }

    log::info!("drained {drained} bytes of decimated I/Q");
    tone_stop.store(true, Ordering::SeqCst);
    let _ = tone.join();
    output.stop();
    // Let the fade finish, then complete the teardown.
    thread::sleep(Duration::from_millis(200));
    output.poll().ok();
    session.stop();
    Ok(())
}
