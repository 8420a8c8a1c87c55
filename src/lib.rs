//! # Overview
//!
//! `modimidi` plays Standard Midi Files (.mid files).
//! It parses the raw file bytes into tracks of events, lays all tracks out on one timeline,
//! resolves tempo changes and note durations into absolute milliseconds, and hands the resulting
//! commands to a clock-driven sequencer backend in batches, right on time.
//!
//! Playing a file is a matter of a few steps:
//!
//! ```no_run
//! use modimidi::{backend::{ClockSequencer, LogSynth}, PlayParams, Player, Schedule, Smf, Timeline};
//! use std::sync::Arc;
//!
//! let smf = Smf::load("song.mid").unwrap();
//! let params = PlayParams::default().with_speed(1.5);
//! let timeline = Timeline::build(&smf);
//! let schedule = Schedule::build(&timeline, &params);
//!
//! let sequencer = Arc::new(ClockSequencer::new(LogSynth));
//! let outcome = Player::new(sequencer, schedule, params).play();
//! println!("{:?}", outcome);
//! ```
//!
//! # Stages
//!
//! - [`Smf::parse`](struct.Smf.html#method.parse) turns bytes into a [`Header`] and
//!   [`Track`]s of [`Event`]s.
//!   Corrupted data is recovered from as far as possible: every problem is logged through
//!   `tracing` and collected into `Smf::warnings`.
//! - [`Timeline::build`](struct.Timeline.html#method.build) orders every event of every track
//!   by absolute tick.
//! - [`Schedule::build`](struct.Schedule.html#method.build) sweeps the timeline once under a
//!   [`DynamicTiming`] tempo map, producing absolute-millisecond [`AbsCommand`]s.
//! - [`Player`] dispatches the commands to a [`backend::Sequencer`] and waits for the final one.
//!
//! # About features
//!
//! - The `strict` feature
//!
//!   By default `modimidi` will attempt to plow through non-standard and even obviously
//!   corrupted files, keeping whatever events could be decoded.
//!   By enabling the `strict` feature the parser rejects uncompliant files instead, throwing
//!   errors of the kind `ErrorKind::Malformed`.
//!
//! - The `parallel` feature
//!
//!   Enabled by default. Track summaries (`Smf::channels`, `Smf::programs`, ...) are computed
//!   on multiple threads through `rayon`.
//!
//! - The `midir-io` feature
//!
//!   Provides `backend::MidiOutSynth`, sending the played notes to a hardware or virtual MIDI
//!   port through `midir`.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Diagnostics, ErrorKind, Result, ResultExt, StdResult},
        primitive::{u14, u15, u24, u28, u4, u7},
    };
    pub(crate) use std::{convert::TryFrom, fmt, mem, ops};

    pub(crate) fn bit_range<T>(val: T, range: ops::Range<u32>) -> T
    where
        T: From<u8>
            + ops::Shr<u32, Output = T>
            + ops::Shl<u32, Output = T>
            + ops::Not<Output = T>
            + ops::BitAnd<Output = T>,
    {
        let mask = !((!T::from(0)) << (range.end - range.start));
        (val >> range.start) & mask
    }
}

pub mod backend;
mod config;
mod cursor;
mod event;
mod player;
mod primitive;
mod riff;
mod schedule;
mod smf;
mod timeline;
mod timing;

pub use crate::{
    config::{DebugFlags, PlayParams},
    cursor::Cursor,
    error::{Error, ErrorKind, LoadError, Result, SendError, Warning},
    event::{
        Event, EventKind, MetaMessage, MidiMessage, PitchBend, SmpteOffset, TextKind,
        TimeSignature,
    },
    player::{CancelHandle, Outcome, PlayState, Player},
    primitive::{Format, Timing},
    schedule::{AbsCommand, CommandKind, Schedule},
    smf::{Header, Smf, Track, MIN_FILE_SIZE},
    timeline::{IndexEntry, Timeline},
    timing::{format_ms, scale_ms, DynamicTiming, DEFAULT_TEMPO},
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u24, u28, u4, u7};
}
