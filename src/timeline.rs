//! Laying every track out on a single time axis.

use crate::{config::DebugFlags, event::Event, smf::Smf};

/// Locates an event by its absolute tick.
///
/// Entries order by tick, then by track, then by position in the track, so simultaneous events
/// replay deterministically.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct IndexEntry {
    /// Absolute tick, the sum of all delta times up to and including this event.
    pub tick: u32,
    /// Index of the track in `Smf::tracks`.
    pub track: usize,
    /// Index of the event within its track.
    pub event: usize,
}

/// All events of a file in global time order.
///
/// Borrows the file, entries only point into it.
#[derive(Clone, Debug)]
pub struct Timeline<'a> {
    smf: &'a Smf,
    entries: Vec<IndexEntry>,
}
impl<'a> Timeline<'a> {
    pub fn build(smf: &'a Smf) -> Timeline<'a> {
        Self::with_debug(smf, DebugFlags::default())
    }

    /// Like `build`, logging every raw event if `DebugFlags::RAW_EVENTS` is set.
    pub fn with_debug(smf: &'a Smf, debug: DebugFlags) -> Timeline<'a> {
        let len = smf.tracks.iter().map(|track| track.len()).sum();
        let mut entries = Vec::with_capacity(len);
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick: u32 = 0;
            let mut saturated = false;
            for (event_idx, ev) in track.events.iter().enumerate() {
                tick = match tick.checked_add(ev.delta.as_int()) {
                    Some(tick) => tick,
                    None => {
                        if !saturated {
                            tracing::warn!(
                                track = track_idx,
                                event = event_idx,
                                "absolute tick overflow, clamping"
                            );
                            saturated = true;
                        }
                        u32::MAX
                    }
                };
                if debug.contains(DebugFlags::RAW_EVENTS) {
                    tracing::debug!(track = track_idx, tick, "{}", ev);
                }
                entries.push(IndexEntry {
                    tick,
                    track: track_idx,
                    event: event_idx,
                });
            }
        }
        entries.sort();
        Timeline { smf, entries }
    }

    #[inline]
    pub fn smf(&self) -> &'a Smf {
        self.smf
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The event an entry points at.
    #[inline]
    pub fn event(&self, entry: IndexEntry) -> &'a Event {
        &self.smf.tracks[entry.track].events[entry.event]
    }

    pub fn iter(&self) -> impl Iterator<Item = (IndexEntry, &'a Event)> + '_ {
        self.entries.iter().map(move |&entry| (entry, self.event(entry)))
    }

    /// Tick of the very last event, if any.
    pub fn last_tick(&self) -> Option<u32> {
        self.entries.last().map(|entry| entry.tick)
    }
}
