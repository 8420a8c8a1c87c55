//! Specific to the SMF packaging of MIDI streams.

use crate::{
    cursor::Cursor,
    error::{LoadError, Warning},
    event::{Event, EventKind, MidiMessage},
    prelude::*,
    primitive::{Format, Timing},
    riff,
};
use std::{collections::BTreeSet, fs, io, path::Path};

/// Files smaller than this cannot hold a header and a single track, and are rejected up front.
pub const MIN_FILE_SIZE: usize = 32;

/// A parsed Standard Midi File.
///
/// Holds the header, every track that could be read and the recoverable problems found on the
/// way.
#[derive(Clone, Debug)]
pub struct Smf {
    pub header: Header,
    pub tracks: Vec<Track>,
    /// Everything that was wrong with the file but could be worked around.
    pub warnings: Vec<Warning>,
}
impl Smf {
    /// Parse a raw SMF (or RMID) file.
    ///
    /// Fails only on fatal problems: a missing signature, a truncated header or a format that
    /// cannot be played.
    /// Anything else is logged, recorded in `warnings` and parsing goes on.
    pub fn parse(raw: &[u8]) -> Result<Smf> {
        ensure!(
            raw.len() >= MIN_FILE_SIZE,
            err_invalid!("file too small to be a midi file")
        );
        let raw = riff::unwrap(raw).unwrap_or(raw);
        Parser::new(raw).run()
    }

    /// Read and parse a file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> StdResult<Smf, LoadError> {
        fn load_impl(path: &Path) -> StdResult<Smf, LoadError> {
            let raw = fs::read(path).map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
                _ => LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                },
            })?;
            if raw.len() < MIN_FILE_SIZE {
                return Err(LoadError::TooSmall {
                    len: raw.len(),
                    min: MIN_FILE_SIZE,
                });
            }
            tracing::debug!(path = %path.display(), len = raw.len(), "read midi file");
            Ok(Smf::parse(&raw)?)
        }
        load_impl(path.as_ref())
    }

    /// Every channel used by a channel message anywhere in the file.
    pub fn channels(&self) -> BTreeSet<u4> {
        self.fold_tracks(|track| Some(track.channels()), union)
            .unwrap_or_default()
    }

    /// Every program selected anywhere in the file.
    pub fn programs(&self) -> BTreeSet<u7> {
        self.fold_tracks(|track| Some(track.programs()), union)
            .unwrap_or_default()
    }

    /// Lowest and highest key played anywhere in the file.
    pub fn key_range(&self) -> Option<(u7, u7)> {
        self.fold_tracks(Track::key_range, widen)
    }

    /// Lowest and highest note-on velocity anywhere in the file.
    pub fn velocity_range(&self) -> Option<(u7, u7)> {
        self.fold_tracks(Track::velocity_range, widen)
    }

    #[cfg(feature = "parallel")]
    fn fold_tracks<T, F, M>(&self, per_track: F, merge: M) -> Option<T>
    where
        T: Send,
        F: Fn(&Track) -> Option<T> + Sync + Send,
        M: Fn(T, T) -> T + Sync + Send,
    {
        use rayon::prelude::*;

        self.tracks
            .par_iter()
            .filter_map(|track| per_track(track))
            .reduce_with(|a, b| merge(a, b))
    }

    #[cfg(not(feature = "parallel"))]
    fn fold_tracks<T, F, M>(&self, per_track: F, merge: M) -> Option<T>
    where
        F: Fn(&Track) -> Option<T>,
        M: Fn(T, T) -> T,
    {
        self.tracks
            .iter()
            .filter_map(|track| per_track(track))
            .fold(None, |acc, x| {
                Some(match acc {
                    Some(acc) => merge(acc, x),
                    None => x,
                })
            })
    }
}

fn union<T: Ord>(mut a: BTreeSet<T>, b: BTreeSet<T>) -> BTreeSet<T> {
    a.extend(b);
    a
}

fn widen(a: (u7, u7), b: (u7, u7)) -> (u7, u7) {
    (a.0.min(b.0), a.1.max(b.1))
}

/// A MIDI file header.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Header {
    pub format: Format,
    /// The amount of tracks declared by the header, which may not match the amount of tracks
    /// actually read.
    pub track_count: u16,
    /// The raw `division` field.
    pub division: u16,
    pub timing: Timing,
}
impl Header {
    #[inline]
    pub fn ticks_per_quarter(&self) -> u32 {
        self.timing.ticks_per_quarter()
    }
}

/// A single track: a sequence of events with delta times relative to each other.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Track {
    pub events: Vec<Event>,
}
impl Track {
    pub fn new(events: Vec<Event>) -> Track {
        Track { events }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn midi_messages(&self) -> impl Iterator<Item = (u4, MidiMessage)> + '_ {
        self.events.iter().filter_map(|ev| match ev.kind {
            EventKind::Midi { channel, message } => Some((channel, message)),
            EventKind::Meta(_) => None,
        })
    }

    /// Sounding note-ons, as `(key, velocity)`.
    fn note_ons(&self) -> impl Iterator<Item = (u7, u7)> + '_ {
        self.midi_messages().filter_map(|(_, msg)| match msg {
            MidiMessage::NoteOn { key, vel } if vel > 0 => Some((key, vel)),
            _ => None,
        })
    }

    pub fn channels(&self) -> BTreeSet<u4> {
        self.midi_messages().map(|(channel, _)| channel).collect()
    }

    pub fn programs(&self) -> BTreeSet<u7> {
        self.midi_messages()
            .filter_map(|(_, msg)| match msg {
                MidiMessage::ProgramChange { program } => Some(program),
                _ => None,
            })
            .collect()
    }

    pub fn key_range(&self) -> Option<(u7, u7)> {
        self.note_ons().map(|(key, _)| (key, key)).reduce(widen)
    }

    pub fn velocity_range(&self) -> Option<(u7, u7)> {
        self.note_ons().map(|(_, vel)| (vel, vel)).reduce(widen)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum ParseState {
    ExpectHeader,
    ParsingTracks { remaining: u16 },
    Done,
    Error,
}

/// Walks the file chunk by chunk.
struct Parser<'a> {
    raw: Cursor<'a>,
    state: ParseState,
    header: Option<Header>,
    tracks: Vec<Track>,
    diag: Diagnostics,
}
impl<'a> Parser<'a> {
    fn new(raw: &'a [u8]) -> Parser<'a> {
        Parser {
            raw: Cursor::new(raw),
            state: ParseState::ExpectHeader,
            header: None,
            tracks: Vec::new(),
            diag: Diagnostics::default(),
        }
    }

    fn run(mut self) -> Result<Smf> {
        loop {
            match self.state {
                ParseState::Done => break,
                ParseState::Error => bail!(err_invalid!("parser stopped after a fatal error")),
                _ => {
                    if let Err(err) = self.step() {
                        self.state = ParseState::Error;
                        return Err(err);
                    }
                }
            }
        }
        let header = self
            .header
            .ok_or(err_invalid!("no header chunk"))?;
        Ok(Smf {
            header,
            tracks: self.tracks,
            warnings: self.diag.into_warnings(),
        })
    }

    fn step(&mut self) -> Result<()> {
        self.state = match self.state {
            ParseState::ExpectHeader => {
                let header = self.read_header()?;
                let remaining = match header.format {
                    Format::SingleTrack => {
                        if header.track_count != 1 {
                            self.diag.report(
                                self.raw.offset(),
                                err_malformed!("singletrack file declares several tracks"),
                            )?;
                        }
                        1
                    }
                    Format::Parallel => header.track_count,
                };
                tracing::debug!(?header, "read midi header");
                self.header = Some(header);
                ParseState::ParsingTracks { remaining }
            }
            ParseState::ParsingTracks { remaining: 0 } => ParseState::Done,
            ParseState::ParsingTracks { remaining } => match self.next_track_chunk()? {
                Some(chunk) => {
                    let idx = self.tracks.len();
                    self.diag.track = Some(idx);
                    let track = read_track(chunk, &mut self.diag)?;
                    self.diag.track = None;
                    tracing::debug!(track = idx, events = track.len(), "read track");
                    self.tracks.push(track);
                    ParseState::ParsingTracks {
                        remaining: remaining - 1,
                    }
                }
                None => {
                    self.diag.report(
                        self.raw.offset(),
                        err_malformed!("file ended before all declared tracks were read"),
                    )?;
                    ParseState::Done
                }
            },
            state @ ParseState::Done | state @ ParseState::Error => state,
        };
        Ok(())
    }

    fn read_header(&mut self) -> Result<Header> {
        let id = self
            .raw
            .read_bytes(4)
            .context(err_invalid!("failed to read header chunk id"))?;
        ensure!(id == b"MThd", err_invalid!("missing MThd signature"));
        let len_offset = self.raw.offset();
        let len = self
            .raw
            .read_u32be_fixed4()
            .context(err_invalid!("failed to read header chunk length"))?;
        if len != 6 {
            self.diag
                .report(len_offset, err_malformed!("header chunk length is not 6"))?;
        }
        let format = self
            .raw
            .read_u16be()
            .context(err_invalid!("failed to read smf format"))?;
        let format = Format::from_code(format)?;
        let track_count = self
            .raw
            .read_u16be()
            .context(err_invalid!("failed to read track count"))?;
        let division = self
            .raw
            .read_u16be()
            .context(err_invalid!("failed to read division"))?;
        let timing = Timing::from_division(division);
        ensure!(
            timing.ticks_per_quarter() != 0,
            err_unsupported!("zero ticks per quarter note")
        );
        //Skip any extra header bytes
        self.raw.split_lossy((len as usize).saturating_sub(6));
        Ok(Header {
            format,
            track_count,
            division,
            timing,
        })
    }

    /// Get the contents of the next `MTrk` chunk, skipping any unknown chunks.
    fn next_track_chunk(&mut self) -> Result<Option<Cursor<'a>>> {
        loop {
            if self.raw.is_empty() {
                return Ok(None);
            }
            let chunk_offset = self.raw.offset();
            let (id, len) = match (self.raw.read_bytes(4), self.raw.read_u32be_fixed4()) {
                (Ok(id), Ok(len)) => (id, len),
                _ => {
                    self.diag.report(
                        chunk_offset,
                        err_malformed!("trailing bytes too short for a chunk header"),
                    )?;
                    self.raw.skip_to_end();
                    return Ok(None);
                }
            };
            let chunk = match self.raw.split(len as usize) {
                Some(chunk) => chunk,
                None => {
                    self.diag.report(
                        chunk_offset,
                        err_malformed!("reached eof before chunk ended"),
                    )?;
                    //Just use the remainder of the file
                    self.raw.split_lossy(len as usize)
                }
            };
            if id == b"MTrk" {
                return Ok(Some(chunk));
            }
            self.diag
                .tolerate(chunk_offset, err_malformed!("skipped unknown chunk"));
        }
    }
}

/// Decode the events of a track chunk.
///
/// A decode error truncates the track, keeping the events decoded so far.
fn read_track(mut raw: Cursor, diag: &mut Diagnostics) -> Result<Track> {
    let mut events = Vec::with_capacity(raw.remaining() / 3);
    let mut running_status = None;
    let mut ended = false;
    //Delta time of dropped events, added to the next kept event
    let mut carry: u32 = 0;
    while !raw.is_empty() {
        let event_offset = raw.offset();
        match Event::read(&mut raw, &mut running_status, diag) {
            Ok((delta, Some(kind))) => {
                let delta = carry
                    .saturating_add(delta.as_int())
                    .min(u28::max_value().as_int());
                carry = 0;
                let ev = Event::new(delta, kind);
                ended = ev.is_end_of_track();
                events.push(ev);
                if ended {
                    break;
                }
            }
            Ok((delta, None)) => carry = carry.saturating_add(delta.as_int()),
            Err(err) => {
                tracing::debug!(offset = event_offset, "event decode failed: {:?}", err);
                diag.report(
                    event_offset,
                    err.chain(err_malformed!("track truncated by an undecodable event")),
                )?;
                return Ok(Track { events });
            }
        }
    }
    if !ended {
        diag.report(
            raw.offset(),
            err_malformed!("track ended without an end of track event"),
        )?;
    } else if !raw.is_empty() {
        diag.report(
            raw.offset(),
            err_malformed!("end of track event before the end of the chunk"),
        )?;
    }
    Ok(Track { events })
}
