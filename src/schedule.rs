//! Resolving the timeline into absolute, ready to send commands.

use crate::{
    config::{DebugFlags, PlayParams},
    event::{EventKind, MetaMessage, MidiMessage, PitchBend},
    prelude::*,
    timeline::{IndexEntry, Timeline},
    timing::{format_ms, scale_ms, DynamicTiming},
};

/// A command with its time resolved.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct AbsCommand {
    /// When to send the command, in milliseconds since playback start, after applying the
    /// playback window and speed.
    pub at_ms: u32,
    /// Position in the song in milliseconds, unaffected by begin time or speed.
    pub original_ms: u32,
    pub kind: CommandKind,
}
impl fmt::Display for AbsCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            format_ms(self.at_ms),
            format_ms(self.original_ms),
            self.kind
        )
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum CommandKind {
    /// Play a note, the backend is in charge of releasing it.
    Note {
        channel: u4,
        key: u7,
        velocity: u7,
        duration_ms: u32,
        /// Duration before speed scaling.
        original_duration_ms: u32,
    },
    ProgramChange {
        channel: u4,
        program: u7,
    },
    PitchBend {
        channel: u4,
        bend: PitchBend,
    },
    /// Marks the end of playback, once every note has been released.
    Final,
}
impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandKind::Note {
                channel,
                key,
                velocity,
                duration_ms,
                original_duration_ms,
            } => write!(
                f,
                "Note(ch={}, key={}, vel={}, dur={}ms [{}ms])",
                channel, key, velocity, duration_ms, original_duration_ms
            ),
            CommandKind::ProgramChange { channel, program } => {
                write!(f, "ProgramChange(ch={}, program={})", channel, program)
            }
            CommandKind::PitchBend { channel, bend } => {
                write!(f, "PitchBend(ch={}, bend={})", channel, bend.as_int())
            }
            CommandKind::Final => write!(f, "Final"),
        }
    }
}

/// The ordered commands of a playback session, always ending with a `Final` command.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Schedule {
    commands: Vec<AbsCommand>,
}
impl Schedule {
    /// Sweep the timeline once, resolving tempo, note durations and the playback window.
    ///
    /// Song time starts at the first sounding note-on.
    /// Everything after `params.end_ms` is dropped, as are notes before `params.begin_ms`.
    /// Program changes and pitch bends before `params.begin_ms` are sent right away instead.
    pub fn build(timeline: &Timeline, params: &PlayParams) -> Schedule {
        let factor = params.time_factor();
        let entries = timeline.entries();
        let mut timing = DynamicTiming::new(timeline.smf().header.ticks_per_quarter());
        let zero_tick = first_note_tick(timeline);
        let mut commands = Vec::new();
        let mut watermark = 0;
        for (idx, &entry) in entries.iter().enumerate() {
            let shifted = entry.tick.saturating_sub(zero_tick);
            let date_ms = timing.convert(shifted);
            if date_ms > params.end_ms {
                tracing::debug!(idx, date_ms, end_ms = params.end_ms, "reached end time");
                break;
            }
            let ev = timeline.event(entry);
            if params.debug.contains(DebugFlags::INDEX) {
                tracing::debug!(idx, tick = entry.tick, shifted, date_ms, "{}", ev);
            }
            if let EventKind::Meta(MetaMessage::Tempo(tempo)) = ev.kind {
                timing.observe_tempo(shifted, tempo.as_int());
                continue;
            }
            if date_ms < params.begin_ms {
                //Channel setup still applies when starting mid-song
                let kind = match ev.kind {
                    EventKind::Midi {
                        channel,
                        message: MidiMessage::ProgramChange { program },
                    } => CommandKind::ProgramChange { channel, program },
                    EventKind::Midi {
                        channel,
                        message: MidiMessage::PitchWheel { bend },
                    } => CommandKind::PitchBend { channel, bend },
                    _ => continue,
                };
                commands.push(AbsCommand {
                    at_ms: 0,
                    original_ms: date_ms,
                    kind,
                });
                continue;
            }
            let at_ms = scale_ms(factor, date_ms - params.begin_ms);
            let kind = match ev.kind {
                EventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                } if vel > 0 => {
                    let ticks = note_length(timeline, idx, channel, key);
                    let original_duration_ms = timing.ticks_to_ms(ticks);
                    let duration_ms = scale_ms(factor, original_duration_ms);
                    watermark = watermark.max(at_ms.saturating_add(duration_ms));
                    CommandKind::Note {
                        channel,
                        key,
                        velocity: vel,
                        duration_ms,
                        original_duration_ms,
                    }
                }
                EventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange { program },
                } => {
                    watermark = watermark.max(at_ms);
                    CommandKind::ProgramChange { channel, program }
                }
                EventKind::Midi {
                    channel,
                    message: MidiMessage::PitchWheel { bend },
                } => {
                    watermark = watermark.max(at_ms);
                    CommandKind::PitchBend { channel, bend }
                }
                _ => continue,
            };
            commands.push(AbsCommand {
                at_ms,
                original_ms: date_ms,
                kind,
            });
        }
        let final_original = commands
            .last()
            .map(|cmd| cmd.original_ms.saturating_add(1))
            .unwrap_or(0);
        commands.push(AbsCommand {
            at_ms: watermark.saturating_add(1),
            original_ms: final_original,
            kind: CommandKind::Final,
        });
        if params.debug.contains(DebugFlags::COMMANDS) {
            for (idx, cmd) in commands.iter().enumerate() {
                tracing::debug!(idx, "{}", cmd);
            }
        }
        Schedule { commands }
    }

    #[inline]
    pub fn commands(&self) -> &[AbsCommand] {
        &self.commands
    }

    /// Amount of commands, including the final marker.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether there is nothing but the final marker.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.len() <= 1
    }

    /// Scheduled time of the final marker.
    pub fn final_ms(&self) -> u32 {
        self.commands.last().map(|cmd| cmd.at_ms).unwrap_or(0)
    }

    /// Song position of the final marker.
    pub fn last_original_ms(&self) -> u32 {
        self.commands.last().map(|cmd| cmd.original_ms).unwrap_or(0)
    }
}

/// Tick of the first note-on with a nonzero velocity, or 0 if there is none.
fn first_note_tick(timeline: &Timeline) -> u32 {
    timeline
        .iter()
        .find(|(_, ev)| match ev.kind {
            EventKind::Midi {
                message: MidiMessage::NoteOn { vel, .. },
                ..
            } => vel > 0,
            _ => false,
        })
        .map(|(entry, _)| entry.tick)
        .unwrap_or(0)
}

/// Ticks between the note-on at `idx` and its release.
///
/// The release is the first later note-off or zero velocity note-on for the same channel and
/// key.
/// Notes never released last until the final event of the timeline.
fn note_length(timeline: &Timeline, idx: usize, channel: u4, key: u7) -> u32 {
    let entries = timeline.entries();
    let start = entries[idx].tick;
    let is_release = |entry: &&IndexEntry| match timeline.event(**entry).kind {
        EventKind::Midi {
            channel: ch,
            message: MidiMessage::NoteOff { key: k, .. },
        } => ch == channel && k == key,
        EventKind::Midi {
            channel: ch,
            message: MidiMessage::NoteOn { key: k, vel },
        } => ch == channel && k == key && vel == 0,
        _ => false,
    };
    match entries[idx + 1..].iter().find(is_release) {
        Some(release) => release.tick - start,
        None => {
            tracing::warn!(%channel, %key, tick = start, "note never released");
            timeline.last_tick().unwrap_or(start) - start
        }
    }
}
