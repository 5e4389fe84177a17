//! Playback clock.
//!
//! Maps an externally advancing time onto the source's sample range:
//! `t' = scale * (t - offset) - extra`, where `extra = start * (scale - 1)`
//! when the start time is preserved, then applies the cycle policy.

use serde::{Deserialize, Serialize};

use crate::config::PlaybackSettings;
use crate::util::Chrono;

/// Tolerance used for range tests and the update gate.
pub const TIME_EPSILON: Chrono = 0.001;

/// What happens outside of `[start, end]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleMode {
    /// Clamp to the range.
    #[default]
    Hold,
    /// Wrap around to the start.
    Loop,
    /// Play backwards from the end, clamping outside the range.
    Reverse,
    /// Alternate forward and backward passes.
    Bounce,
    /// Like `Hold`, but nodes outside their own range are excluded.
    Clip,
}

/// Pure time mapping; holds no state that advances between calls.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackClock {
    pub start: Chrono,
    pub end: Chrono,
    pub offset: Chrono,
    pub scale: Chrono,
    pub preserve_start_time: bool,
    pub cycle: CycleMode,
    pub epsilon: Chrono,
}

impl PlaybackClock {
    pub fn new(start: Chrono, end: Chrono, cycle: CycleMode) -> Self {
        Self {
            start,
            end,
            offset: 0.0,
            scale: 1.0,
            preserve_start_time: true,
            cycle,
            epsilon: TIME_EPSILON,
        }
    }

    pub fn from_settings(playback: &PlaybackSettings) -> Self {
        Self {
            start: playback.start_time,
            end: playback.end_time,
            offset: playback.time_offset,
            scale: playback.time_scale,
            preserve_start_time: playback.preserve_start_time,
            cycle: playback.cycle,
            epsilon: TIME_EPSILON,
        }
    }

    /// Offset and scale only, before any cycle policy.
    pub fn scaled_time(&self, time: Chrono) -> Chrono {
        let extra = if self.preserve_start_time {
            self.start * (self.scale - 1.0)
        } else {
            0.0
        };
        self.scale * (time - self.offset) - extra
    }

    /// Internal sample time for an external time.
    pub fn sample_time(&self, time: Chrono) -> Chrono {
        let out = self.scaled_time(time);
        let play = self.end - self.start;

        // A collapsed range has a single static sample.
        if play <= 0.0 {
            return self.start;
        }

        match self.cycle {
            CycleMode::Hold | CycleMode::Clip => out.clamp(self.start, self.end),
            CycleMode::Loop => {
                let (_, fraction) = self.repeat(out, play);
                self.start + fraction * play
            }
            CycleMode::Bounce => {
                let (repeat, fraction) = self.repeat(out, play);
                if repeat.rem_euclid(2) == 0 {
                    self.start + fraction * play
                } else {
                    self.end - fraction * play
                }
            }
            CycleMode::Reverse => {
                if out > self.start + self.epsilon && out < self.end - self.epsilon {
                    let (_, fraction) = self.repeat(out, play);
                    self.end - fraction * play
                } else if out < self.start + self.epsilon {
                    self.end
                } else {
                    self.start
                }
            }
        }
    }

    /// True when the whole stream is outside its range under `Clip`.
    pub fn is_clipped(&self, time: Chrono) -> bool {
        if self.cycle != CycleMode::Clip {
            return false;
        }
        let out = self.scaled_time(time);
        out < self.start - self.epsilon || self.end + self.epsilon < out
    }

    /// True when a node with its own `[start, end]` range is clipped at `time`.
    pub fn is_range_clipped(&self, time: Chrono, range: (Chrono, Chrono)) -> bool {
        if self.cycle != CycleMode::Clip {
            return false;
        }
        if self.is_clipped(time) {
            return true;
        }
        let t = self.sample_time(time);
        t < range.0 - self.epsilon || range.1 + self.epsilon < t
    }

    /// Integer repeat count and the fractional position within the repeat.
    fn repeat(&self, out: Chrono, play: Chrono) -> (i64, Chrono) {
        let normalized = (out - self.start) / play;
        let repeat = normalized.floor();
        ((repeat as i64), (normalized - repeat).abs())
    }
}
