//! Where commands go to be played.
//!
//! The [`Player`](../struct.Player.html) never produces sound itself: it talks to a
//! [`Sequencer`], a clock-driven queue that calls back into the player at requested device
//! times and forwards timestamped messages to whatever makes the sound.

use crate::{error::SendError, event::PitchBend, prelude::*};
use std::sync::Arc;

mod clock;
#[cfg(feature = "midir-io")]
mod midir;

pub use self::clock::{ClockSequencer, LogSynth, Synth};
#[cfg(feature = "midir-io")]
pub use self::midir::MidiOutSynth;

/// Invoked by the sequencer with the current device time.
pub type Callback = Arc<dyn Fn(u32) + Send + Sync>;

/// What a registered callback is for.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Purpose {
    /// Dispatching the next batch of commands.
    Periodic,
    /// The end of playback.
    Final,
    /// Reporting progress.
    Progress,
}

/// Identifies a callback registered on a sequencer.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ClientId(pub u32);

/// A clock-driven queue of timers and MIDI messages.
///
/// Times are absolute device times in milliseconds, as returned by `now`.
/// All sends are fire-and-forget: they return as soon as the message is queued.
pub trait Sequencer: Send + Sync {
    /// Register a callback, which is only invoked once scheduled with `schedule_at`.
    fn register_callback(&self, purpose: Purpose, callback: Callback) -> ClientId;

    /// Invoke the callback of `client` once the device clock reaches `at`.
    fn schedule_at(&self, client: ClientId, at: u32) -> StdResult<(), SendError>;

    /// Drop a callback along with any pending invocations.
    fn unregister(&self, client: ClientId);

    /// Drop every queued message that has not been played yet, except note-offs.
    ///
    /// Notes already sounding are still released on time. Timers are left alone.
    fn remove_pending(&self);

    /// Current device time.
    fn now(&self) -> u32;

    /// Queue a note-on at `at` and its note-off `duration_ms` later.
    fn send_note(
        &self,
        channel: u4,
        key: u7,
        velocity: u7,
        duration_ms: u32,
        at: u32,
    ) -> StdResult<(), SendError>;

    fn send_program_change(&self, channel: u4, program: u7, at: u32)
        -> StdResult<(), SendError>;

    fn send_pitch_bend(&self, channel: u4, bend: PitchBend, at: u32)
        -> StdResult<(), SendError>;
}
