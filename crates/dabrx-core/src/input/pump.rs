//! Driver-thread half of the input core.
//!
//! `SamplePump::on_samples` is the hot path: the RF driver calls it from its
//! own thread with a block of interleaved I/Q floats, and it must return
//! quickly. Everything here is allocation-free except the optional dump
//! copy, and nothing ever blocks on the consumer.

use std::sync::Arc;

use crossbeam::channel::Sender;
use rtrb::Producer;

use crate::config::InputConfig;
use crate::dsp::{HalfBandDecimator, LevelTracker};
use crate::event::{ReceiverEvent, StreamFault};
use crate::fifo::SampleFifo;
use crate::input::dump::RecorderHandle;
use crate::input::{SessionShared, StreamState};
use crate::types::FILTER_SCRATCH_FLOATS;

pub struct SamplePump {
    fifo: Arc<SampleFifo>,
    filter: HalfBandDecimator,
    level: LevelTracker,
    scratch: Vec<f32>,
    shared: Arc<SessionShared>,
    events: Sender<ReceiverEvent>,
    level_tx: Producer<f32>,
    recorder: RecorderHandle,
    notify_blocks: u32,
    blocks: u32,
}

impl SamplePump {
    pub fn new(
        fifo: Arc<SampleFifo>,
        config: &InputConfig,
        shared: Arc<SessionShared>,
        events: Sender<ReceiverEvent>,
        level_tx: Producer<f32>,
        recorder: RecorderHandle,
    ) -> Self {
        Self {
            fifo,
            filter: HalfBandDecimator::new(),
            level: LevelTracker::new(config.agc.attack, config.agc.release),
            scratch: vec![0.0; FILTER_SCRATCH_FLOATS],
            shared,
            events,
            level_tx,
            recorder,
            notify_blocks: config.agc.level_notify_blocks.max(1),
            blocks: 0,
        }
    }

    /// Entry point for the driver thread: one block of interleaved I/Q
    /// floats at the RF rate. The float count must be a multiple of 4
    /// (an even number of complex samples).
    pub fn on_samples(&mut self, iq: &[f32]) {
        self.shared.mark_alive();
        if iq.is_empty() {
            return;
        }
        if iq.len() % 4 != 0 {
            log::warn!("driver delivered {} floats, not a filterable block", iq.len());
            return;
        }

        // The decimated block is half the input: one f32 out per input f32
        // pair, so the byte count equals 4 * (input floats / 2).
        let out_bytes = iq.len() / 2 * std::mem::size_of::<f32>();
        if self.fifo.free() < out_bytes {
            let dropped = iq.len() / 2;
            log::warn!("sample fifo full, dropping {dropped} samples");
            let _ = self
                .events
                .try_send(ReceiverEvent::SamplesDropped { samples: dropped });
            return;
        }

        for chunk in iq.chunks(2 * FILTER_SCRATCH_FLOATS) {
            let out = &mut self.scratch[..chunk.len() / 2];
            let peak = match self.filter.process(chunk, out) {
                Ok(peak) => peak,
                Err(e) => {
                    log::error!("decimator rejected block: {e}");
                    return;
                }
            };

            let level = self.level.update(peak);
            self.blocks = self.blocks.wrapping_add(1);
            if self.blocks % self.notify_blocks == 0 {
                let _ = self.events.try_send(ReceiverEvent::AgcLevel { level });
                let _ = self.level_tx.push(level);
            }

            let bytes: &[u8] = bytemuck::cast_slice(out);
            if self.recorder.is_active() {
                self.recorder.write(bytes);
            }
            // Free space was checked up front and only the consumer frees
            // space, so this cannot fail while we are the sole producer.
            if let Err(e) = self.fifo.write(bytes) {
                log::error!("sample fifo write failed: {e}");
                let _ = self.events.try_send(ReceiverEvent::SamplesDropped {
                    samples: chunk.len() / 2,
                });
            }
        }
    }

    /// Driver thread: the stream stopped on its own (device unplugged,
    /// file exhausted). A deliberate `stop()` puts the session into
    /// `Stopping` first, so this only fires for genuine failures.
    pub fn stream_ended(&self, fault: StreamFault) {
        if self.shared.state() == StreamState::Streaming {
            log::warn!("input stream ended unexpectedly: {fault}");
            self.shared.set_state(StreamState::Disconnected);
            self.fifo.fill_with_silence();
            let _ = self.events.try_send(ReceiverEvent::StreamError { fault });
        }
    }
}
