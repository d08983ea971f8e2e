//! Polling session actor.
//!
//! A single task owns the live [`PlaybackRecord`], both timers and the
//! in-flight bookkeeping. Everything else talks to it through an
//! [`EngineHandle`]. Poll requests run as detached tasks and report back over
//! a channel tagged with the session generation and a poll sequence number;
//! results from a torn-down session or older than the last applied poll are
//! dropped.

use crate::merge::{advance_progress, merge_poll_result, MergeOutcome};
use crate::EngineConfig;
use nowify_core::{Credential, PlaybackRecord, ProviderKind, TopTrack};
use nowify_providers::MusicProvider;
use std::future::pending;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Polling,
}

#[derive(Debug, Error)]
#[error("polling engine has shut down")]
pub struct EngineClosed;

enum Command {
    Switch(Arc<dyn MusicProvider>),
    Stop,
    Shutdown,
}

enum SessionEvent {
    Polled {
        generation: u64,
        seq: u64,
        result: Option<PlaybackRecord>,
    },
    TopTrack {
        generation: u64,
        result: Option<TopTrack>,
    },
}

#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    record: watch::Receiver<PlaybackRecord>,
    phase: watch::Receiver<SessionPhase>,
}

impl EngineHandle {
    /// Tears the current session down and starts polling `provider`.
    pub async fn switch_provider(&self, provider: Arc<dyn MusicProvider>) -> Result<(), EngineClosed> {
        self.send(Command::Switch(provider)).await
    }

    pub async fn stop(&self) -> Result<(), EngineClosed> {
        self.send(Command::Stop).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineClosed> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), EngineClosed> {
        self.commands.send(command).await.map_err(|_| EngineClosed)
    }

    pub fn record(&self) -> PlaybackRecord {
        self.record.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackRecord> {
        self.record.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }
}

/// Starts the session actor. It idles until the first provider switch.
pub fn spawn_engine(cfg: EngineConfig) -> (EngineHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (record_tx, record_rx) = watch::channel(PlaybackRecord::idle(None));
    let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);

    let session = Session {
        cfg,
        record_tx,
        phase_tx,
        events_tx,
        provider: None,
        credential: None,
        generation: 0,
        next_seq: 0,
        applied_seq: 0,
        poll_timer: None,
        progress_timer: None,
        top_track_pending: false,
    };
    let task = tokio::spawn(session.run(commands_rx, events_rx));

    let handle = EngineHandle {
        commands: commands_tx,
        record: record_rx,
        phase: phase_rx,
    };
    (handle, task)
}

struct Session {
    cfg: EngineConfig,
    record_tx: watch::Sender<PlaybackRecord>,
    phase_tx: watch::Sender<SessionPhase>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    provider: Option<Arc<dyn MusicProvider>>,
    credential: Option<watch::Receiver<Credential>>,
    generation: u64,
    next_seq: u64,
    applied_seq: u64,
    poll_timer: Option<Interval>,
    progress_timer: Option<Interval>,
    top_track_pending: bool,
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn credential_changed(rx: &mut Option<watch::Receiver<Credential>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => pending::<bool>().await,
    }
}

fn repeating(period: std::time::Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Switch(provider)) => self.switch_to(provider),
                    Some(Command::Stop) => self.stop(),
                    Some(Command::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                },
                _ = tick(&mut self.poll_timer) => self.spawn_poll(),
                _ = tick(&mut self.progress_timer) => self.interpolate(),
                Some(event) = events.recv() => self.apply(event),
                alive = credential_changed(&mut self.credential) => self.on_credential_change(alive),
            }
        }
        debug!("polling engine stopped");
    }

    fn active_kind(&self) -> Option<ProviderKind> {
        self.provider.as_ref().map(|p| p.kind())
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    fn reset_record(&self, provider: Option<ProviderKind>) {
        let idle = PlaybackRecord::idle(provider);
        self.record_tx.send_if_modified(|record| {
            if *record == idle {
                false
            } else {
                *record = idle;
                true
            }
        });
    }

    /// Cancels both timers and fences every request issued so far.
    fn teardown(&mut self) {
        self.poll_timer = None;
        self.progress_timer = None;
        self.generation += 1;
        self.applied_seq = self.next_seq;
        self.top_track_pending = false;
        self.set_phase(SessionPhase::Idle);
    }

    fn switch_to(&mut self, provider: Arc<dyn MusicProvider>) {
        let kind = provider.kind();
        self.teardown();
        if let Some(previous) = self.provider.take() {
            previous.disconnect();
        }
        self.reset_record(Some(kind));

        self.credential = provider.credential();
        self.provider = Some(provider);
        info!(provider = %kind, "provider session started");
        self.start_if_ready();
    }

    fn stop(&mut self) {
        self.teardown();
        if let Some(previous) = self.provider.take() {
            info!(provider = %previous.kind(), "provider session stopped");
            previous.disconnect();
        }
        self.credential = None;
        self.reset_record(None);
    }

    fn credential_ready(&mut self) -> bool {
        match &mut self.credential {
            Some(rx) => rx.borrow_and_update().has_valid_token(),
            None => true,
        }
    }

    fn start_if_ready(&mut self) {
        if self.provider.is_none() {
            return;
        }
        if !self.credential_ready() {
            info!(provider = ?self.active_kind(), "waiting for credential");
            return;
        }

        self.set_phase(SessionPhase::Polling);
        self.spawn_poll();
        self.poll_timer = Some(repeating(self.cfg.poll_interval));
    }

    fn on_credential_change(&mut self, alive: bool) {
        if !alive {
            debug!("credential source closed");
            self.credential = None;
            return;
        }

        let ready = self.credential_ready();
        let phase = *self.phase_tx.borrow();
        match (ready, phase) {
            (true, SessionPhase::Idle) => {
                info!(provider = ?self.active_kind(), "credential available; resuming");
                self.start_if_ready();
            }
            (false, SessionPhase::Polling) => {
                info!(provider = ?self.active_kind(), "credential lost; going idle");
                self.teardown();
                self.reset_record(self.active_kind());
            }
            // token rotated while polling: later polls pick it up
            _ => {}
        }
    }

    fn spawn_poll(&mut self) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        self.next_seq += 1;
        let seq = self.next_seq;
        let generation = self.generation;
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let result = provider.now_playing().await;
            let _ = events.send(SessionEvent::Polled {
                generation,
                seq,
                result,
            });
        });
    }

    fn spawn_top_track(&mut self) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        if self.top_track_pending || !provider.supports_month_favorite() {
            return;
        }
        self.top_track_pending = true;
        let generation = self.generation;
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let result = provider.month_favorite().await;
            let _ = events.send(SessionEvent::TopTrack { generation, result });
        });
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Polled {
                generation,
                seq,
                result,
            } => {
                if generation != self.generation || seq <= self.applied_seq {
                    debug!(seq, generation, "dropping stale poll result");
                    return;
                }
                self.applied_seq = seq;
                let successful = result.is_some();

                let mut outcome = MergeOutcome::Unchanged;
                self.record_tx.send_if_modified(|record| {
                    outcome = merge_poll_result(record, result);
                    outcome.changed()
                });
                if outcome.changed() {
                    debug!(?outcome, "playback record updated");
                }
                self.sync_progress_timer(outcome);

                if successful && self.record_tx.borrow().top_track.is_none() {
                    self.spawn_top_track();
                }
            }
            SessionEvent::TopTrack { generation, result } => {
                if generation != self.generation {
                    return;
                }
                self.top_track_pending = false;
                if let Some(top) = result {
                    self.record_tx.send_if_modified(|record| {
                        if record.top_track.as_ref() == Some(&top) {
                            false
                        } else {
                            record.top_track = Some(top);
                            true
                        }
                    });
                }
            }
        }
    }

    /// Runs the progress timer only while the record can interpolate, and
    /// restarts its phase whenever a poll reset the position.
    fn sync_progress_timer(&mut self, outcome: MergeOutcome) {
        if !self.record_tx.borrow().can_interpolate() {
            self.progress_timer = None;
            return;
        }
        let reset = matches!(
            outcome,
            MergeOutcome::Replaced | MergeOutcome::StateChanged
        );
        if self.progress_timer.is_none() || reset {
            self.progress_timer = Some(repeating(self.cfg.progress_tick));
        }
    }

    fn interpolate(&mut self) {
        let step = self.cfg.progress_step_ms;
        self.record_tx
            .send_if_modified(|record| advance_progress(record, step));
    }
}
