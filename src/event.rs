//! All sort of events and their parsers.

use crate::{cursor::Cursor, prelude::*};

/// Represents a parsed SMF track event.
///
/// Consists of a delta time (in MIDI ticks relative to the previous event in the same track) and
/// the actual track event.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Event {
    /// How many MIDI ticks after the previous event in this track should this event fire.
    pub delta: u28,
    /// The type of event along with event-specific data.
    pub kind: EventKind,
}
impl Event {
    pub fn new(delta: u32, kind: EventKind) -> Event {
        Event {
            delta: u28::from(delta),
            kind,
        }
    }

    /// Advances the cursor and updates `running_status`.
    ///
    /// Returns the delta time along with the event kind, which is `None` for events that are
    /// read but not kept, like sysex messages or unknown meta messages.
    /// In case of failure the cursor might be left in the middle of an event!
    pub(crate) fn read(
        raw: &mut Cursor,
        running_status: &mut Option<u8>,
        diag: &mut Diagnostics,
    ) -> Result<(u28, Option<EventKind>)> {
        let delta = raw
            .read_varlen()
            .context(err_invalid!("failed to read event deltatime"))?;
        let kind = EventKind::read(raw, running_status, diag)
            .context(err_invalid!("failed to parse event"))?;
        Ok((delta, kind))
    }

    #[inline]
    pub fn is_end_of_track(&self) -> bool {
        self.kind == EventKind::Meta(MetaMessage::EndOfTrack)
    }
}
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "dt={} {}", self.delta, self.kind)
    }
}

/// Represents the different kinds of SMF events and their associated data.
///
/// It notably does *not* include the timing of the event; the `Event` struct is responsible
/// for this.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum EventKind {
    /// A message associated to a MIDI channel carrying musical data.
    ///
    /// The channel is always explicit, even if the file relied on running status to omit it.
    Midi {
        /// The MIDI channel that this event is associated with.
        channel: u4,
        /// The MIDI message type and associated data.
        message: MidiMessage,
    },
    /// A meta-message, giving extra information for correct playback, like tempo, song name,
    /// lyrics, etc...
    Meta(MetaMessage),
}
impl EventKind {
    fn read(
        raw: &mut Cursor,
        running_status: &mut Option<u8>,
        diag: &mut Diagnostics,
    ) -> Result<Option<EventKind>> {
        let status_offset = raw.offset();
        let mut status = raw
            .read_u8()
            .context(err_invalid!("failed to read status"))?;
        if status < 0x80 {
            //Running status! The byte is data, put it back
            raw.rewind(1);
            status = running_status.ok_or(err_invalid!(
                "event missing status with no running status active"
            ))?;
        }
        let kind = match status {
            0x80..=0xEF => {
                *running_status = Some(status);
                let (channel, message) = MidiMessage::read(status, raw)?;
                Some(EventKind::Midi { channel, message })
            }
            0xFF => MetaMessage::read(raw, diag)
                .context(err_invalid!("failed to read meta event"))?
                .map(EventKind::Meta),
            0xF0 | 0xF7 => {
                let payload = raw
                    .read_varlen_slice()
                    .context(err_invalid!("failed to read sysex event"))?;
                tracing::debug!(len = payload.len(), "skipping sysex payload");
                diag.tolerate(status_offset, err_malformed!("sysex event discarded"));
                None
            }
            _ => bail!(err_invalid!(
                "standard midi files cannot contain system common or realtime events"
            )),
        };
        Ok(kind)
    }
}
impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventKind::Midi { channel, message } => write!(f, "ch={} {}", channel, message),
            EventKind::Meta(meta) => write!(f, "Meta {}", meta),
        }
    }
}

/// Represents a MIDI message, always associated to a MIDI channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MidiMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u7,
        /// The velocity with which to stop playing it.
        vel: u7,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u7,
        /// The velocity (strength) with which to press it.
        ///
        /// Note that by convention a `NoteOn` message with a velocity of 0 is equivalent to a
        /// `NoteOff`.
        vel: u7,
    },
    /// Modify the velocity of a note after it has been played.
    KeyPressure { key: u7, value: u7 },
    /// Modify the value of a MIDI controller.
    ControlChange { controller: u7, value: u7 },
    /// Change the program (also known as instrument) for a channel.
    ProgramChange { program: u7 },
    /// Change the pressure of a whole channel at once, without starting new notes.
    ChannelPressure { value: u7 },
    /// Set the pitch bend value for the entire channel.
    PitchWheel { bend: PitchBend },
}
impl MidiMessage {
    /// Midi messages have a known length.
    pub(crate) fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    /// Read the data bytes of a channel message whose status has already been consumed.
    ///
    /// `status` must be a channel message status (0x80..=0xEF).
    pub(crate) fn read(status: u8, raw: &mut Cursor) -> Result<(u4, MidiMessage)> {
        let len = Self::msg_length(status);
        let bytes = raw
            .read_bytes(len)
            .context(err_invalid!("truncated midi message"))?;
        let mut data = [u7::new(0); 2];
        for (slot, byte) in data.iter_mut().zip(bytes) {
            *slot = u7::check_int(*byte).context(err_invalid!("midi data byte out of range"))?;
        }
        let channel = u4::from(status);
        let msg = match status >> 4 {
            0x8 => MidiMessage::NoteOff {
                key: data[0],
                vel: data[1],
            },
            0x9 => MidiMessage::NoteOn {
                key: data[0],
                vel: data[1],
            },
            0xA => MidiMessage::KeyPressure {
                key: data[0],
                value: data[1],
            },
            0xB => MidiMessage::ControlChange {
                controller: data[0],
                value: data[1],
            },
            0xC => MidiMessage::ProgramChange { program: data[0] },
            0xD => MidiMessage::ChannelPressure { value: data[0] },
            0xE => {
                //Note the little-endian order, contrasting with the default big-endian order of
                //Standard Midi Files
                let lsb = data[0].as_int() as u16;
                let msb = data[1].as_int() as u16;
                MidiMessage::PitchWheel {
                    bend: PitchBend(u14::from(msb << 7 | lsb)),
                }
            }
            _ => bail!(err_invalid!("not a channel message status")),
        };
        Ok((channel, msg))
    }
}
impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MidiMessage::NoteOff { key, vel } => write!(f, "NoteOff(key={}, vel={})", key, vel),
            MidiMessage::NoteOn { key, vel } => write!(f, "NoteOn(key={}, vel={})", key, vel),
            MidiMessage::KeyPressure { key, value } => {
                write!(f, "KeyPressure(key={}, value={})", key, value)
            }
            MidiMessage::ControlChange { controller, value } => {
                write!(f, "ControlChange(controller={}, value={})", controller, value)
            }
            MidiMessage::ProgramChange { program } => write!(f, "ProgramChange({})", program),
            MidiMessage::ChannelPressure { value } => write!(f, "ChannelPressure({})", value),
            MidiMessage::PitchWheel { bend } => write!(f, "PitchWheel({})", bend.as_int()),
        }
    }
}

/// The value of a pitch bend, represented as 14 bits.
///
/// A value of `0x0000` indicates full bend downwards.
/// A value of `0x2000` indicates no bend.
/// A value of `0x3FFF` indicates full bend upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PitchBend(pub u14);
impl PitchBend {
    /// The middle value of `0x2000`, indicating no bend.
    #[inline]
    pub const fn mid_raw_value() -> PitchBend {
        PitchBend(u14::new(0x2000))
    }

    /// Create a `PitchBend` value from an int in the range `[-0x2000, 0x1FFF]`.
    ///
    /// Integers outside this range will be clamped.
    #[inline]
    pub fn from_int(int: i16) -> PitchBend {
        PitchBend(u14::new((int.max(-0x2000).min(0x1FFF) + 0x2000) as u16))
    }

    /// Returns an int in the range `[-0x2000, 0x1FFF]`.
    #[inline]
    pub fn as_int(self) -> i16 {
        self.0.as_int() as i16 - 0x2000
    }

    /// The raw 14-bit value, as sent over the wire.
    #[inline]
    pub fn raw(self) -> u16 {
        self.0.as_int()
    }
}

/// Which text meta message a `MetaMessage::Text` came from.
///
/// All of them carry the same payload, a piece of text.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TextKind {
    /// Arbitrary text associated to an instant.
    Text,
    /// A copyright notice.
    Copyright,
    /// The name of the track (or of the sequence, in the first track).
    TrackName,
    /// The name of the current instrument.
    InstrumentName,
    /// Lyric information associated to an instant.
    Lyric,
    /// Marker text associated to an instant.
    Marker,
    /// Name of the device that this track was intended to be played with.
    Device,
}
impl TextKind {
    fn from_type_byte(type_byte: u8) -> Option<TextKind> {
        Some(match type_byte {
            0x01 => TextKind::Text,
            0x02 => TextKind::Copyright,
            0x03 => TextKind::TrackName,
            0x04 => TextKind::InstrumentName,
            0x05 => TextKind::Lyric,
            0x06 => TextKind::Marker,
            0x09 => TextKind::Device,
            _ => return None,
        })
    }
}

/// An SMPTE time at which a track should start.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SmpteOffset {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame: u8,
    /// Hundredths of a frame.
    pub subframe: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct TimeSignature {
    pub numerator: u8,
    /// The denominator is `2^denominator_pow2`.
    pub denominator_pow2: u8,
    /// MIDI clocks per metronome click.
    pub clocks_per_click: u8,
    /// Notated 32nd notes per MIDI quarter note.
    pub notes_32nd_per_quarter: u8,
}

/// A "meta message", as defined by the SMF standard.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage {
    SequenceNumber(u16),
    /// Any of the text-carrying meta messages.
    Text(TextKind, String),
    /// Number of the MIDI channel that the following meta messages refer to.
    ChannelPrefix(u8),
    /// Number of the MIDI port that this track was intended to be played with.
    Port(u8),
    /// Obligatory at track end.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note).
    ///
    /// Usually appears at the beginning of a track, before any midi events are sent, but there
    /// are no guarantees.
    Tempo(u24),
    SmpteOffset(SmpteOffset),
    TimeSignature(TimeSignature),
    /// Negative numbers indicate number of flats and positive numbers indicate number of
    /// sharps.
    KeySignature { sharps: i16, minor: bool },
    /// Arbitrary data intended for the sequencer.
    Sequencer(Vec<u8>),
}
impl MetaMessage {
    /// Payload length of the meta messages that have one fixed by the standard.
    fn fixed_length(type_byte: u8) -> Option<usize> {
        Some(match type_byte {
            0x00 => 2,
            0x20 => 1,
            0x21 => 1,
            0x2F => 0,
            0x51 => 3,
            0x54 => 5,
            0x58 => 4,
            0x59 => 2,
            _ => return None,
        })
    }

    fn read(raw: &mut Cursor, diag: &mut Diagnostics) -> Result<Option<MetaMessage>> {
        let type_offset = raw.offset();
        let type_byte = raw
            .read_u8()
            .context(err_invalid!("failed to read meta message type"))?;
        let len = raw
            .read_varlen()
            .context(err_invalid!("failed to read meta message length"))?;
        let mut data = raw
            .split(len.as_int() as usize)
            .ok_or(err_invalid!("meta message runs past the end of the track"))?;
        if let Some(expected) = Self::fixed_length(type_byte) {
            if data.remaining() < expected {
                diag.report(type_offset, err_malformed!("meta message too short, dropped"))?;
                return Ok(None);
            } else if data.remaining() > expected {
                diag.report(
                    type_offset,
                    err_malformed!("meta message longer than its fixed length"),
                )?;
            }
        }
        if let Some(kind) = TextKind::from_type_byte(type_byte) {
            let text = data.read_ascii(data.remaining())?;
            return Ok(Some(MetaMessage::Text(kind, text)));
        }
        let meta = match type_byte {
            0x00 => MetaMessage::SequenceNumber(data.read_u16be()?),
            0x20 => MetaMessage::ChannelPrefix(data.read_u8()?),
            0x21 => MetaMessage::Port(data.read_u8()?),
            0x2F => MetaMessage::EndOfTrack,
            0x51 => MetaMessage::Tempo(data.read_u24be()?),
            0x54 => MetaMessage::SmpteOffset(SmpteOffset {
                hour: data.read_u8()?,
                minute: data.read_u8()?,
                second: data.read_u8()?,
                frame: data.read_u8()?,
                subframe: data.read_u8()?,
            }),
            0x58 => MetaMessage::TimeSignature(TimeSignature {
                numerator: data.read_u8()?,
                denominator_pow2: data.read_u8()?,
                clocks_per_click: data.read_u8()?,
                notes_32nd_per_quarter: data.read_u8()?,
            }),
            0x59 => MetaMessage::KeySignature {
                sharps: data.read_u8()? as i8 as i16,
                minor: data.read_u8()? != 0,
            },
            0x7F => MetaMessage::Sequencer(data.read_bytes(data.remaining())?.to_vec()),
            _ => {
                tracing::debug!(type_byte, "unknown meta message type");
                diag.report(type_offset, err_malformed!("unknown meta message type"))?;
                return Ok(None);
            }
        };
        Ok(Some(meta))
    }
}
impl fmt::Display for MetaMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetaMessage::SequenceNumber(num) => write!(f, "SequenceNumber({})", num),
            MetaMessage::Text(kind, text) => write!(f, "{:?}({:?})", kind, text),
            MetaMessage::ChannelPrefix(chan) => write!(f, "ChannelPrefix({})", chan),
            MetaMessage::Port(port) => write!(f, "Port({})", port),
            MetaMessage::EndOfTrack => write!(f, "EndOfTrack"),
            MetaMessage::Tempo(tempo) => write!(f, "Tempo({}us/quarter)", tempo),
            MetaMessage::SmpteOffset(smpte) => write!(
                f,
                "SmpteOffset({:02}:{:02}:{:02}:{:02}.{:02})",
                smpte.hour, smpte.minute, smpte.second, smpte.frame, smpte.subframe
            ),
            MetaMessage::TimeSignature(sig) => write!(
                f,
                "TimeSignature({}/{}, clocks/click={}, 32nds/quarter={})",
                sig.numerator,
                1u32.checked_shl(sig.denominator_pow2 as u32).unwrap_or(0),
                sig.clocks_per_click,
                sig.notes_32nd_per_quarter
            ),
            MetaMessage::KeySignature { sharps, minor } => write!(
                f,
                "KeySignature({} {}, {})",
                sharps.abs(),
                if *sharps < 0 { "flats" } else { "sharps" },
                if *minor { "minor" } else { "major" }
            ),
            MetaMessage::Sequencer(data) => write!(f, "Sequencer({} bytes)", data.len()),
        }
    }
}
