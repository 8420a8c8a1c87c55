//! Converting MIDI ticks into milliseconds.

use crate::prelude::*;

/// The tempo assumed until a tempo event says otherwise: 120 beats per minute.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// A tick to millisecond converter following the tempo changes of a file.
///
/// The mapping is piecewise linear: every tempo event starts a new segment at the tick where it
/// happens, with the milliseconds of that tick fixed under the previous tempo.
/// This means ticks must be fed in non-decreasing order, in a single forward sweep.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DynamicTiming {
    micros_per_quarter: u64,
    /// Ticks per quarter note, in thousandths, so that dividing gives milliseconds.
    kilo_ticks_per_quarter: u64,
    reference_tick: u32,
    reference_ms: u32,
}
impl DynamicTiming {
    /// Start at tick 0 and millisecond 0 under the default tempo.
    pub fn new(ticks_per_quarter: u32) -> DynamicTiming {
        DynamicTiming {
            micros_per_quarter: DEFAULT_TEMPO as u64,
            kilo_ticks_per_quarter: ticks_per_quarter.max(1) as u64 * 1000,
            reference_tick: 0,
            reference_ms: 0,
        }
    }

    /// Milliseconds at absolute tick `abs_tick`.
    ///
    /// `abs_tick` should not be before the last tempo change.
    pub fn convert(&self, abs_tick: u32) -> u32 {
        let add = self.ticks_to_ms(abs_tick.saturating_sub(self.reference_tick));
        match self.reference_ms.checked_add(add) {
            Some(ms) => ms,
            None => {
                tracing::warn!(abs_tick, "tick to millisecond overflow, clamping");
                u32::MAX
            }
        }
    }

    /// Length in milliseconds of a span of ticks under the current tempo.
    pub fn ticks_to_ms(&self, ticks: u32) -> u32 {
        round_div(
            ticks as u64 * self.micros_per_quarter,
            self.kilo_ticks_per_quarter,
        )
    }

    /// Switch to a new tempo starting at `abs_tick`.
    pub fn observe_tempo(&mut self, abs_tick: u32, micros_per_quarter: u32) {
        self.reference_ms = self.convert(abs_tick);
        self.reference_tick = abs_tick;
        self.micros_per_quarter = micros_per_quarter as u64;
    }

    #[inline]
    pub fn micros_per_quarter(&self) -> u32 {
        self.micros_per_quarter as u32
    }

    /// The tick and millisecond where the current tempo segment starts.
    #[inline]
    pub fn reference(&self) -> (u32, u32) {
        (self.reference_tick, self.reference_ms)
    }
}

/// Integer division rounding halves up.
fn round_div(n: u64, d: u64) -> u32 {
    let q = (n + d / 2) / d;
    u32::try_from(q).unwrap_or_else(|_| {
        tracing::warn!(n, d, "overflow dividing milliseconds, clamping");
        u32::MAX
    })
}

/// Multiply a millisecond amount by a floating point factor, rounding to nearest.
///
/// On overflow a warning is logged and `ms` is returned unscaled.
pub fn scale_ms(factor: f64, ms: u32) -> u32 {
    let scaled = factor * ms as f64 + 0.5;
    if scaled > u32::MAX as f64 {
        tracing::warn!(factor, ms, "overflow scaling milliseconds");
        ms
    } else {
        scaled as u32
    }
}

/// Render milliseconds as `mmm:ss.fff`, with minutes right-aligned.
pub fn format_ms(ms: u32) -> String {
    let secs = ms / 1000;
    format!("{:3}:{:02}.{:03}", secs / 60, secs % 60, ms % 1000)
}
