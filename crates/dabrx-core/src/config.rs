//! Tunable parameters for both streaming cores.
//!
//! Defaults match the values the receiver has shipped with for years; they
//! are fields rather than constants so a deployment can trade latency for
//! robustness without a rebuild.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{iq_bytes, DECIMATED_SAMPLE_RATE};

/// Input-side configuration: FIFO sizing, watchdog and AGC behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Duration of one FIFO chunk in milliseconds of decimated signal.
    pub chunk_ms: u32,
    /// FIFO capacity in chunks.
    pub fifo_chunks: usize,
    /// Watchdog period; a stream that delivers nothing for this long is
    /// declared stalled.
    pub watchdog_timeout_ms: u64,
    pub agc: AgcConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 400,
            fifo_chunks: 8,
            watchdog_timeout_ms: 2_000,
            agc: AgcConfig::default(),
        }
    }
}

impl InputConfig {
    /// Decimated complex samples per chunk.
    pub fn chunk_samples(&self) -> usize {
        (DECIMATED_SAMPLE_RATE / 1000) as usize * self.chunk_ms as usize
    }

    /// FIFO capacity in bytes (before power-of-two rounding).
    pub fn fifo_capacity(&self) -> usize {
        iq_bytes(self.chunk_samples()) * self.fifo_chunks
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn with_watchdog_timeout_ms(mut self, ms: u64) -> Self {
        self.watchdog_timeout_ms = ms;
        self
    }
}

/// Software AGC tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    /// Envelope coefficient while the level is rising.
    pub attack: f32,
    /// Envelope coefficient while the level is falling.
    pub release: f32,
    /// Level above which the gain index steps down.
    pub upper_threshold: f32,
    /// Level below which the gain index steps up.
    pub lower_threshold: f32,
    /// Emit an `AgcLevel` event every n-th filtered block.
    pub level_notify_blocks: u32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            attack: 0.1,
            release: 0.01,
            upper_threshold: 0.1,
            lower_threshold: 0.005,
            level_notify_blocks: 8,
        }
    }
}

/// Output-side configuration: device selection, fades and mute thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output device name; `None` picks the system default.
    pub device: Option<String>,
    /// Mute/unmute fade length. The stream callback is sized to exactly one
    /// fade so a ramp always fits in a single callback.
    pub fade_ms: u32,
    /// Fade floor in dB (the quiet end of both ramps).
    pub fade_floor_db: f32,
    /// Unmute only once the FIFO holds more than this many callback periods.
    pub unmute_mark_periods: u32,
    /// Below this much buffered audio the renderer mutes hard, no ramp.
    pub hard_mute_ms: u32,
    /// Audio FIFO capacity in milliseconds of PCM.
    pub fifo_ms: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            fade_ms: 60,
            fade_floor_db: -60.0,
            unmute_mark_periods: 6,
            hard_mute_ms: 1,
            fifo_ms: 2_000,
        }
    }
}

impl OutputConfig {
    /// Linear gain at the fade floor.
    pub fn fade_floor_lin(&self) -> f32 {
        10.0f32.powf(self.fade_floor_db / 20.0)
    }

    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fifo_sizing() {
        let cfg = InputConfig::default();
        // 400 ms at 2048 kHz, 8 bytes per sample, 8 chunks.
        assert_eq!(cfg.chunk_samples(), 2048 * 400);
        assert_eq!(cfg.fifo_capacity(), 2048 * 400 * 8 * 8);
    }

    #[test]
    fn test_fade_floor_is_minus_60_db() {
        let cfg = OutputConfig::default();
        assert!((cfg.fade_floor_lin() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_builder_setters() {
        let cfg = InputConfig::default().with_watchdog_timeout_ms(500);
        assert_eq!(cfg.watchdog_timeout(), Duration::from_millis(500));
        let out = OutputConfig::default().with_device("pipewire");
        assert_eq!(out.device.as_deref(), Some("pipewire"));
    }
}
