use super::{Callback, ClientId, Purpose, Sequencer};
use crate::{error::SendError, event::PitchBend, prelude::*};
use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Something that makes sound out of MIDI channel messages, right when they are received.
pub trait Synth: Send + 'static {
    fn note_on(&mut self, channel: u4, key: u7, velocity: u7) -> StdResult<(), SendError>;
    fn note_off(&mut self, channel: u4, key: u7) -> StdResult<(), SendError>;
    fn program_change(&mut self, channel: u4, program: u7) -> StdResult<(), SendError>;
    fn pitch_bend(&mut self, channel: u4, bend: PitchBend) -> StdResult<(), SendError>;
}

/// A silent synth that logs every message, for dry runs.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogSynth;
impl Synth for LogSynth {
    fn note_on(&mut self, channel: u4, key: u7, velocity: u7) -> StdResult<(), SendError> {
        tracing::debug!(%channel, %key, %velocity, "note on");
        Ok(())
    }
    fn note_off(&mut self, channel: u4, key: u7) -> StdResult<(), SendError> {
        tracing::debug!(%channel, %key, "note off");
        Ok(())
    }
    fn program_change(&mut self, channel: u4, program: u7) -> StdResult<(), SendError> {
        tracing::debug!(%channel, %program, "program change");
        Ok(())
    }
    fn pitch_bend(&mut self, channel: u4, bend: PitchBend) -> StdResult<(), SendError> {
        tracing::debug!(%channel, bend = bend.as_int(), "pitch bend");
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
enum Payload {
    Timer(ClientId),
    NoteOn { channel: u4, key: u7, velocity: u7 },
    NoteOff { channel: u4, key: u7 },
    Program { channel: u4, program: u7 },
    Bend { channel: u4, bend: PitchBend },
}

/// A queued item. Items due at the same time run in the order they were queued.
#[derive(Copy, Clone, Debug)]
struct Scheduled {
    at: u32,
    seq: u64,
    payload: Payload,
}
impl PartialEq for Scheduled {
    fn eq(&self, other: &Scheduled) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Scheduled) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Scheduled) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

#[derive(Default)]
struct Queue {
    items: BinaryHeap<Reverse<Scheduled>>,
    clients: HashMap<ClientId, (Purpose, Callback)>,
    next_client: u32,
    next_seq: u64,
    shutdown: bool,
}
impl Queue {
    fn push(&mut self, at: u32, payload: Payload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push(Reverse(Scheduled { at, seq, payload }));
    }
}

struct Inner<S> {
    epoch: Instant,
    queue: Mutex<Queue>,
    synth: Mutex<S>,
    wake: Sender<()>,
}
impl<S: Synth> Inner<S> {
    fn now(&self) -> u32 {
        u32::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u32::MAX)
    }

    fn enqueue(&self, items: &[(u32, Payload)]) -> StdResult<(), SendError> {
        {
            let mut queue = self.queue.lock();
            if queue.shutdown {
                return Err(SendError::Disconnected);
            }
            for &(at, payload) in items {
                queue.push(at, payload);
            }
        }
        //A full channel already holds a pending wakeup
        let _ = self.wake.try_send(());
        Ok(())
    }

    /// Run a due item, without holding the queue lock.
    fn run_item(&self, item: Scheduled) {
        let mut synth = self.synth.lock();
        let result = match item.payload {
            Payload::Timer(_) => Ok(()),
            Payload::NoteOn {
                channel,
                key,
                velocity,
            } => synth.note_on(channel, key, velocity),
            Payload::NoteOff { channel, key } => synth.note_off(channel, key),
            Payload::Program { channel, program } => synth.program_change(channel, program),
            Payload::Bend { channel, bend } => synth.pitch_bend(channel, bend),
        };
        if let Err(err) = result {
            tracing::warn!(at = item.at, %err, "synth rejected message");
        }
    }

    /// The timing thread.
    fn run(&self, wake: Receiver<()>) {
        loop {
            let mut queue = self.queue.lock();
            if queue.shutdown {
                break;
            }
            let now = self.now();
            let next_at = queue.items.peek().map(|Reverse(item)| item.at);
            match next_at {
                Some(at) if at <= now => {
                    let item = match queue.items.pop() {
                        Some(Reverse(item)) => item,
                        None => continue,
                    };
                    match item.payload {
                        Payload::Timer(client) => {
                            let callback = queue.clients.get(&client).map(|(_, cb)| cb.clone());
                            drop(queue);
                            if let Some(callback) = callback {
                                callback(now);
                            }
                        }
                        _ => {
                            drop(queue);
                            self.run_item(item);
                        }
                    }
                }
                Some(at) => {
                    drop(queue);
                    let timeout = Duration::from_millis((at - now) as u64);
                    if let Err(RecvTimeoutError::Disconnected) = wake.recv_timeout(timeout) {
                        break;
                    }
                }
                None => {
                    drop(queue);
                    if wake.recv().is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("sequencer thread stopped");
    }
}

/// A software sequencer driving a [`Synth`] from its own timing thread.
///
/// Device time is milliseconds since the sequencer was created.
/// Callbacks run on the timing thread and may freely call back into the sequencer.
pub struct ClockSequencer<S: Synth> {
    inner: Arc<Inner<S>>,
    thread: Option<JoinHandle<()>>,
}
impl<S: Synth> ClockSequencer<S> {
    pub fn new(synth: S) -> ClockSequencer<S> {
        let (wake, wake_recv) = channel::bounded(1);
        let inner = Arc::new(Inner {
            epoch: Instant::now(),
            queue: Mutex::new(Queue::default()),
            synth: Mutex::new(synth),
            wake,
        });
        let thread_inner = inner.clone();
        let thread = thread::Builder::new()
            .name("modimidi-sequencer".to_string())
            .spawn(move || thread_inner.run(wake_recv));
        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(err) => {
                tracing::warn!(%err, "failed to spawn sequencer thread");
                inner.queue.lock().shutdown = true;
                None
            }
        };
        ClockSequencer { inner, thread }
    }

    /// Run `f` with exclusive access to the synth.
    pub fn with_synth<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.synth.lock())
    }
}
impl<S: Synth> Sequencer for ClockSequencer<S> {
    fn register_callback(&self, purpose: Purpose, callback: Callback) -> ClientId {
        let mut queue = self.inner.queue.lock();
        let id = ClientId(queue.next_client);
        queue.next_client += 1;
        queue.clients.insert(id, (purpose, callback));
        tracing::trace!(?id, ?purpose, "registered client");
        id
    }

    fn schedule_at(&self, client: ClientId, at: u32) -> StdResult<(), SendError> {
        if !self.inner.queue.lock().clients.contains_key(&client) {
            return Err(SendError::UnknownClient(client));
        }
        self.inner.enqueue(&[(at, Payload::Timer(client))])
    }

    fn unregister(&self, client: ClientId) {
        let mut queue = self.inner.queue.lock();
        if queue.clients.remove(&client).is_some() {
            let items = mem::take(&mut queue.items);
            queue.items = items
                .into_iter()
                .filter(|Reverse(item)| match item.payload {
                    Payload::Timer(id) => id != client,
                    _ => true,
                })
                .collect();
            tracing::trace!(?client, "unregistered client");
        }
    }

    fn remove_pending(&self) {
        let mut queue = self.inner.queue.lock();
        let before = queue.items.len();
        let items = mem::take(&mut queue.items);
        queue.items = items
            .into_iter()
            .filter(|Reverse(item)| match item.payload {
                Payload::Timer(_) | Payload::NoteOff { .. } => true,
                Payload::NoteOn { .. } | Payload::Program { .. } | Payload::Bend { .. } => false,
            })
            .collect();
        tracing::trace!(removed = before - queue.items.len(), "removed pending messages");
    }

    fn now(&self) -> u32 {
        self.inner.now()
    }

    fn send_note(
        &self,
        channel: u4,
        key: u7,
        velocity: u7,
        duration_ms: u32,
        at: u32,
    ) -> StdResult<(), SendError> {
        self.inner.enqueue(&[
            (
                at,
                Payload::NoteOn {
                    channel,
                    key,
                    velocity,
                },
            ),
            (
                at.saturating_add(duration_ms),
                Payload::NoteOff { channel, key },
            ),
        ])
    }

    fn send_program_change(
        &self,
        channel: u4,
        program: u7,
        at: u32,
    ) -> StdResult<(), SendError> {
        self.inner
            .enqueue(&[(at, Payload::Program { channel, program })])
    }

    fn send_pitch_bend(&self, channel: u4, bend: PitchBend, at: u32) -> StdResult<(), SendError> {
        self.inner.enqueue(&[(at, Payload::Bend { channel, bend })])
    }
}
impl<S: Synth> Drop for ClockSequencer<S> {
    fn drop(&mut self) {
        self.inner.queue.lock().shutdown = true;
        let _ = self.inner.wake.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                //Dropped from one of its own callbacks, the thread exits on its own
                return;
            }
            if thread.join().is_err() {
                tracing::warn!("sequencer thread panicked");
            }
        }
    }
}
