//! Dispatching a schedule to a sequencer, in batches, right on time.

use crate::{
    backend::{Callback, ClientId, Purpose, Sequencer},
    config::{DebugFlags, PlayParams},
    error::SendError,
    prelude::*,
    schedule::{AbsCommand, CommandKind, Schedule},
    timing::{format_ms, scale_ms},
};
use parking_lot::{Condvar, Mutex};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

/// Where a player is in its lifecycle.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum PlayState {
    /// Created, nothing registered on the sequencer yet.
    Idle,
    /// Commands are still being dispatched.
    Running,
    /// Every command has been dispatched, waiting for the final marker.
    Draining,
    /// Finished or cancelled, all callbacks unregistered.
    Done,
}

/// How playback ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Outcome {
    /// The final marker was reached.
    Finished,
    /// Playback was cancelled before the final marker.
    Cancelled,
}

/// Dispatch progress, shared between the periodic and progress callbacks.
#[derive(Debug, Default)]
struct Dispatch {
    /// Index of the first command not sent yet.
    next: usize,
    /// Device time of song time zero, fixed by the first batch.
    origin: Option<u32>,
}

#[derive(Debug)]
struct Phase {
    state: PlayState,
    outcome: Option<Outcome>,
    clients: Vec<(Purpose, ClientId)>,
}
impl Phase {
    fn client(&self, purpose: Purpose) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(p, _)| *p == purpose)
            .map(|(_, id)| *id)
    }

    fn is_live(&self) -> bool {
        match self.state {
            PlayState::Running | PlayState::Draining => true,
            PlayState::Idle | PlayState::Done => false,
        }
    }
}

struct Shared<S: ?Sized> {
    schedule: Schedule,
    params: PlayParams,
    dispatch: Mutex<Dispatch>,
    //Always locked after `dispatch` when both are needed
    phase: Mutex<Phase>,
    done: Condvar,
    //Raised before playback is torn down, checked before every send
    stop: AtomicBool,
    sequencer: Arc<S>,
}
impl<S: Sequencer + ?Sized> Shared<S> {
    fn sync_debug(&self, msg: &str) {
        if self.params.debug.contains(DebugFlags::SYNC) {
            tracing::debug!("{}", msg);
        }
    }

    fn send(
        &self,
        cmd: &AbsCommand,
        at: u32,
        final_client: Option<ClientId>,
    ) -> StdResult<(), SendError> {
        let seq = &self.sequencer;
        match cmd.kind {
            CommandKind::Note {
                channel,
                key,
                velocity,
                duration_ms,
                ..
            } => seq.send_note(channel, key, velocity, duration_ms, at),
            CommandKind::ProgramChange { channel, program } => {
                seq.send_program_change(channel, program, at)
            }
            CommandKind::PitchBend { channel, bend } => seq.send_pitch_bend(channel, bend, at),
            CommandKind::Final => match final_client {
                Some(client) => seq.schedule_at(client, at),
                None => Err(SendError::Disconnected),
            },
        }
    }

    /// Send the next batch of commands.
    fn on_periodic(&self, now: u32) {
        let mut dispatch = self.dispatch.lock();
        let final_client = {
            let phase = self.phase.lock();
            if phase.state != PlayState::Running {
                return;
            }
            phase.client(Purpose::Final)
        };
        let commands = self.schedule.commands();
        if dispatch.next >= commands.len() {
            return;
        }
        let debug = self.params.debug;
        let origin = *dispatch.origin.get_or_insert_with(|| {
            let origin = now.saturating_add(self.params.initial_delay_ms);
            if debug.contains(DebugFlags::GENERAL) {
                tracing::debug!(origin, "playback time origin");
            }
            origin
        });
        let limit = commands[dispatch.next]
            .at_ms
            .saturating_add(self.params.batch_duration_ms);
        let first = dispatch.next;
        while let Some(cmd) = commands.get(dispatch.next) {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            dispatch.next += 1;
            let at = origin.saturating_add(cmd.at_ms);
            if let Err(err) = self.send(cmd, at, final_client) {
                tracing::warn!(%err, command = %cmd, "failed to send command");
            }
            if cmd.at_ms >= limit {
                break;
            }
        }
        if self.stop.load(Ordering::SeqCst) {
            self.sync_debug("stopped mid-batch");
            //A cancel may have purged the backend before the last send went through
            if self.phase.lock().outcome == Some(Outcome::Cancelled) {
                self.sequencer.remove_pending();
            }
            return;
        }
        if debug.contains(DebugFlags::GENERAL) {
            tracing::debug!(now, sent = dispatch.next - first, "dispatched batch");
        }
        if dispatch.next < commands.len() {
            let next_batch = now.saturating_add(self.params.batch_duration_ms / 2);
            let periodic = self.phase.lock().client(Purpose::Periodic);
            if let Some(client) = periodic {
                if let Err(err) = self.sequencer.schedule_at(client, next_batch) {
                    tracing::warn!(%err, "failed to schedule next batch");
                }
            }
        } else {
            let mut phase = self.phase.lock();
            if phase.state == PlayState::Running {
                phase.state = PlayState::Draining;
            }
        }
    }

    fn on_final(&self, _now: u32) {
        self.sync_debug("final callback");
        self.finish(Outcome::Finished);
    }

    /// Print how far into the song playback is, and come back in about 100ms.
    fn on_progress(&self, now: u32) {
        let origin = self.dispatch.lock().origin;
        if let Some(origin) = origin.filter(|origin| now >= *origin) {
            let begin = self.params.begin_ms;
            let elapsed = scale_ms(self.params.speed(), now - origin).saturating_add(begin);
            let last = self.schedule.last_original_ms();
            if begin <= elapsed && elapsed <= last {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                let _ = write!(out, "\rProgress: {} / {}", format_ms(elapsed), format_ms(last));
                let _ = out.flush();
            }
        }
        let tmod100 = now % 100;
        let step = if tmod100 > 50 { 200 } else { 100 };
        let next = now.saturating_add(step - tmod100);
        let phase = self.phase.lock();
        if !phase.is_live() {
            return;
        }
        if let Some(client) = phase.client(Purpose::Progress) {
            if let Err(err) = self.sequencer.schedule_at(client, next) {
                tracing::warn!(%err, "failed to schedule progress report");
            }
        }
    }

    /// Unregister everything and wake up waiters.
    ///
    /// Returns `false` if playback was already over.
    /// A cancelled playback also drops every message still queued on the sequencer, letting
    /// sounding notes be released.
    fn finish(&self, outcome: Outcome) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        let mut phase = self.phase.lock();
        if phase.state == PlayState::Done {
            return false;
        }
        phase.state = PlayState::Done;
        phase.outcome = Some(outcome);
        for (_, client) in mem::take(&mut phase.clients) {
            self.sequencer.unregister(client);
        }
        if outcome == Outcome::Cancelled {
            self.sequencer.remove_pending();
        }
        self.sync_debug("playback done, notifying");
        self.done.notify_all();
        true
    }
}

trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}
impl<S: Sequencer + ?Sized> Cancel for Shared<S> {
    fn cancel(&self) -> bool {
        self.finish(Outcome::Cancelled)
    }
}

/// Stops a player from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Weak<dyn Cancel>,
}
impl CancelHandle {
    /// Stop playback and wake up whoever is waiting on it.
    ///
    /// Returns `false` if playback was already over, in which case this does nothing.
    pub fn cancel(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.cancel(),
            None => false,
        }
    }
}
impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CancelHandle").finish()
    }
}

/// Plays a schedule through a sequencer.
///
/// Commands are sent in batches reaching `batch_duration_ms` ahead, each batch scheduling the
/// next one halfway through.
/// Completion is signaled by the final marker command, or by cancelling.
///
/// Dropping a player that is still running cancels it.
pub struct Player<S: Sequencer + ?Sized + 'static> {
    shared: Arc<Shared<S>>,
}
impl<S: Sequencer + ?Sized + 'static> Player<S> {
    pub fn new(sequencer: Arc<S>, schedule: Schedule, params: PlayParams) -> Player<S> {
        Player {
            shared: Arc::new(Shared {
                schedule,
                params,
                dispatch: Mutex::new(Dispatch::default()),
                phase: Mutex::new(Phase {
                    state: PlayState::Idle,
                    outcome: None,
                    clients: Vec::new(),
                }),
                done: Condvar::new(),
                stop: AtomicBool::new(false),
                sequencer,
            }),
        }
    }

    fn callback(&self, handler: fn(&Shared<S>, u32)) -> Callback {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move |now| {
            if let Some(shared) = weak.upgrade() {
                handler(&shared, now);
            }
        })
    }

    /// Register on the sequencer and schedule the first batch right away.
    ///
    /// Does nothing unless the player is idle.
    pub fn start(&self) {
        let shared = &self.shared;
        let seq = &shared.sequencer;
        let (periodic, progress) = {
            let mut phase = shared.phase.lock();
            if phase.state != PlayState::Idle {
                return;
            }
            let periodic =
                seq.register_callback(Purpose::Periodic, self.callback(Shared::on_periodic));
            let last = seq.register_callback(Purpose::Final, self.callback(Shared::on_final));
            phase.clients.push((Purpose::Periodic, periodic));
            phase.clients.push((Purpose::Final, last));
            let progress = if shared.params.progress {
                let progress =
                    seq.register_callback(Purpose::Progress, self.callback(Shared::on_progress));
                phase.clients.push((Purpose::Progress, progress));
                Some(progress)
            } else {
                None
            };
            phase.state = PlayState::Running;
            (periodic, progress)
        };
        shared.sync_debug("callbacks registered");
        let now = seq.now();
        if let Err(err) = seq.schedule_at(periodic, now) {
            tracing::warn!(%err, "failed to schedule first batch");
        }
        if let Some(progress) = progress {
            if let Err(err) = seq.schedule_at(progress, now.saturating_add(100)) {
                tracing::warn!(%err, "failed to schedule progress report");
            }
        }
    }

    /// Block until playback is over.
    ///
    /// Starts the player if it was idle.
    pub fn wait(&self) -> Outcome {
        if self.state() == PlayState::Idle {
            self.start();
        }
        let shared = &self.shared;
        let mut phase = shared.phase.lock();
        shared.sync_debug("waiting for playback to end");
        while phase.state != PlayState::Done {
            shared.done.wait(&mut phase);
        }
        shared.sync_debug("woken up");
        if shared.params.progress {
            println!();
        }
        phase.outcome.unwrap_or(Outcome::Finished)
    }

    /// Start and wait until playback is over.
    pub fn play(&self) -> Outcome {
        self.start();
        self.wait()
    }

    /// Stop playback, waking up any waiter.
    ///
    /// Returns `false` if playback was already over.
    pub fn cancel(&self) -> bool {
        self.shared.finish(Outcome::Cancelled)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        let shared: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        CancelHandle { shared }
    }

    pub fn state(&self) -> PlayState {
        self.shared.phase.lock().state
    }

    /// How playback ended, `None` while not done.
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.phase.lock().outcome
    }

    pub fn schedule(&self) -> &Schedule {
        &self.shared.schedule
    }

    pub fn params(&self) -> &PlayParams {
        &self.shared.params
    }
}
impl<S: Sequencer + ?Sized + 'static> Drop for Player<S> {
    fn drop(&mut self) {
        let live = self.shared.phase.lock().is_live();
        if live && self.shared.finish(Outcome::Cancelled) {
            tracing::debug!("player dropped while playing, cancelled");
        }
    }
}
