//! Signal-level envelope follower and software AGC stepping.

use rtrb::{Consumer, Producer, RingBuffer};

/// Neutral level the follower returns to after a retune. Small but nonzero
/// so the AGC does not slam the gain up during the first blocks.
pub const NEUTRAL_LEVEL: f32 = 0.05;

const LEVEL_QUEUE_CAPACITY: usize = 64;

/// Lock-free channel carrying level readings from the driver thread to the
/// control thread.
pub fn level_channel() -> (Producer<f32>, Consumer<f32>) {
    RingBuffer::new(LEVEL_QUEUE_CAPACITY)
}

/// Single-pole envelope follower over block peak powers. Attacks faster
/// than it releases so short bursts register immediately while the level
/// decays smoothly between them.
pub struct LevelTracker {
    level: f32,
    attack: f32,
    release: f32,
}

impl LevelTracker {
    pub fn new(attack: f32, release: f32) -> Self {
        Self {
            level: NEUTRAL_LEVEL,
            attack,
            release,
        }
    }

    pub fn reset(&mut self) {
        self.level = NEUTRAL_LEVEL;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Folds one block peak power into the running level and returns it.
    pub fn update(&mut self, peak: f32) -> f32 {
        let c = if peak > self.level {
            self.attack
        } else {
            self.release
        };
        self.level += c * (peak - self.level);
        self.level
    }
}

/// Steps a device gain index from smoothed level readings. The upper and
/// lower thresholds sit more than an order of magnitude apart so the
/// controller does not oscillate around a single set point.
pub struct GainController {
    index: i32,
    min: i32,
    max: i32,
    upper: f32,
    lower: f32,
}

impl GainController {
    pub fn new(range: (i32, i32), upper: f32, lower: f32) -> Self {
        let (min, max) = range;
        Self {
            index: midpoint(min, max),
            min,
            max,
            upper,
            lower,
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    /// Re-centres the index (start of a new stream) and returns it.
    pub fn reset(&mut self) -> i32 {
        self.index = midpoint(self.min, self.max);
        self.index
    }

    /// Returns the new index when the level warrants a step, `None` when
    /// the level is inside the window or the index is already clamped.
    pub fn update(&mut self, level: f32) -> Option<i32> {
        let want = if level > self.upper {
            self.index - 1
        } else if level < self.lower {
            self.index + 1
        } else {
            return None;
        };
        let clamped = want.clamp(self.min, self.max);
        if clamped == self.index {
            return None;
        }
        self.index = clamped;
        Some(clamped)
    }
}

fn midpoint(min: i32, max: i32) -> i32 {
    min + (max - min + 1) / 2
}
