//! Playback parameters.

use crate::{prelude::*, timing::format_ms};

/// A bit-mask selecting which diagnostics are logged at `debug` level.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct DebugFlags(pub u32);
impl DebugFlags {
    /// General progress, like the time origin picked for playback.
    pub const GENERAL: DebugFlags = DebugFlags(0x1);
    /// Locking and completion signaling between the player and its callbacks.
    pub const SYNC: DebugFlags = DebugFlags(0x2);
    /// The whole command list once built.
    pub const COMMANDS: DebugFlags = DebugFlags(0x4);
    /// Every timeline entry visited while building commands.
    pub const INDEX: DebugFlags = DebugFlags(0x80);
    /// Every raw event while laying out the timeline.
    pub const RAW_EVENTS: DebugFlags = DebugFlags(0x100);

    #[inline]
    pub const fn empty() -> DebugFlags {
        DebugFlags(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: DebugFlags) -> bool {
        self.0 & other.0 == other.0
    }
}
impl ops::BitOr for DebugFlags {
    type Output = DebugFlags;
    fn bitor(self, rhs: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | rhs.0)
    }
}
impl fmt::Debug for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DebugFlags({:#x})", self.0)
    }
}

/// How a file should be played.
///
/// Values are expected to be validated by whoever builds them, except `speed`, which is
/// clamped.
#[derive(Clone, PartialEq, Debug)]
pub struct PlayParams {
    /// Nothing before this point of the song (in unscaled milliseconds) is played.
    pub begin_ms: u32,
    /// Nothing after this point of the song is played.
    pub end_ms: u32,
    speed: f64,
    /// Delay between the first dispatch and the first command sounding.
    pub initial_delay_ms: u32,
    /// How far ahead of the next command each dispatch batch reaches.
    pub batch_duration_ms: u32,
    /// Print a progress line while playing.
    pub progress: bool,
    pub debug: DebugFlags,
}
impl PlayParams {
    /// An end time that is never reached: the largest whole number of minutes in a `u32` of
    /// milliseconds.
    pub const INFINITE: u32 = 60_000 * (u32::MAX / 60_000);
    pub const MIN_SPEED: f64 = 0.125;
    pub const MAX_SPEED: f64 = 8.0;

    /// The speed multiplier, 2.0 plays twice as fast.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the speed multiplier, clamping it to `[MIN_SPEED, MAX_SPEED]`.
    pub fn set_speed(&mut self, speed: f64) {
        let clamped = if speed.is_nan() {
            1.0
        } else {
            speed.max(Self::MIN_SPEED).min(Self::MAX_SPEED)
        };
        if clamped != speed {
            tracing::warn!(speed, clamped, "speed out of range, coerced");
        }
        self.speed = clamped;
    }

    /// The factor applied to song times to get scheduled times.
    #[inline]
    pub fn time_factor(&self) -> f64 {
        1.0 / self.speed
    }

    pub fn with_begin(mut self, begin_ms: u32) -> PlayParams {
        self.begin_ms = begin_ms;
        self
    }

    pub fn with_end(mut self, end_ms: u32) -> PlayParams {
        self.end_ms = end_ms;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> PlayParams {
        self.set_speed(speed);
        self
    }

    pub fn with_initial_delay(mut self, initial_delay_ms: u32) -> PlayParams {
        self.initial_delay_ms = initial_delay_ms;
        self
    }

    pub fn with_batch_duration(mut self, batch_duration_ms: u32) -> PlayParams {
        self.batch_duration_ms = batch_duration_ms;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> PlayParams {
        self.progress = progress;
        self
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> PlayParams {
        self.debug = debug;
        self
    }
}
impl Default for PlayParams {
    fn default() -> PlayParams {
        PlayParams {
            begin_ms: 0,
            end_ms: Self::INFINITE,
            speed: 1.0,
            initial_delay_ms: 200,
            batch_duration_ms: 10_000,
            progress: false,
            debug: DebugFlags::empty(),
        }
    }
}
impl fmt::Display for PlayParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "begin={} end=", format_ms(self.begin_ms).trim_start())?;
        if self.end_ms == Self::INFINITE {
            write!(f, "inf")?;
        } else {
            write!(f, "{}", format_ms(self.end_ms).trim_start())?;
        }
        write!(
            f,
            " speed={} delay={}ms batch={}ms",
            self.speed, self.initial_delay_ms, self.batch_duration_ms
        )
    }
}
