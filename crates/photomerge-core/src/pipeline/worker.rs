//! Background merge thread.
//!
//! The session lives on a dedicated thread and is driven through a command
//! channel. Requests run one at a time; queued merges are coalesced so only
//! the latest one runs. Every event carries the load generation it belongs
//! to, and the handle drops events from a generation it has moved past.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::color::RawFrame;
use crate::error::{MergeError, Result};
use crate::frame::Mask;
use crate::fusion::{FusionOutput, FusionPrimitives, ReferencePrimitives};
use crate::store::FrameSet;

use super::config::{EngineConfig, MergeConfig};
use super::orchestrator::MergeSession;
use super::types::{LoadReport, MergeStage, ProgressReporter};

pub enum MergeCommand {
    Load { frames: Vec<RawFrame> },
    SetMask { mask: Mask },
    ClearMask,
    Merge { set: FrameSet, config: MergeConfig },
    Clear,
}

#[derive(Clone, Debug)]
pub enum MergeEvent {
    Loaded {
        generation: u64,
        report: LoadReport,
    },
    MaskUpdated {
        generation: u64,
        has_mask: bool,
    },
    Progress {
        generation: u64,
        stage: MergeStage,
        done: usize,
        total: Option<usize>,
    },
    MergeComplete {
        generation: u64,
        set: FrameSet,
        output: Arc<FusionOutput>,
        elapsed: Duration,
    },
    Cleared {
        generation: u64,
    },
    Error {
        generation: u64,
        message: String,
    },
}

impl MergeEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Loaded { generation, .. }
            | Self::MaskUpdated { generation, .. }
            | Self::Progress { generation, .. }
            | Self::MergeComplete { generation, .. }
            | Self::Cleared { generation }
            | Self::Error { generation, .. } => *generation,
        }
    }
}

/// Called after every event is sent, e.g. to wake a UI loop.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

struct EventSink {
    tx: mpsc::Sender<MergeEvent>,
    notifier: Option<Notifier>,
}

impl EventSink {
    fn send(&self, event: MergeEvent) {
        let _ = self.tx.send(event);
        if let Some(notify) = &self.notifier {
            notify();
        }
    }
}

/// Forwards progress of the running request as `Progress` events.
struct ChannelProgressReporter<'a> {
    sink: &'a EventSink,
    generation: u64,
    current: Mutex<Option<(MergeStage, Option<usize>)>>,
}

impl ProgressReporter for ChannelProgressReporter<'_> {
    fn begin_stage(&self, stage: MergeStage, total_items: Option<usize>) {
        if let Ok(mut cur) = self.current.lock() {
            *cur = Some((stage, total_items));
        }
        self.sink.send(MergeEvent::Progress {
            generation: self.generation,
            stage,
            done: 0,
            total: total_items,
        });
    }

    fn advance(&self, items_done: usize) {
        let current = self.current.lock().ok().and_then(|c| *c);
        if let Some((stage, total)) = current {
            self.sink.send(MergeEvent::Progress {
                generation: self.generation,
                stage,
                done: items_done,
                total,
            });
        }
    }

    fn finish_stage(&self) {
        if let Ok(mut cur) = self.current.lock() {
            *cur = None;
        }
    }
}

/// Handle to the merge thread. Dropping it stops the thread.
pub struct MergeWorker {
    commands: Option<mpsc::Sender<MergeCommand>>,
    events: mpsc::Receiver<MergeEvent>,
    generation: u64,
    thread: Option<JoinHandle<()>>,
}

impl MergeWorker {
    pub fn spawn(engine: EngineConfig) -> Result<Self> {
        Self::spawn_with(engine, Arc::new(ReferencePrimitives), None)
    }

    pub fn spawn_with(
        engine: EngineConfig,
        primitives: Arc<dyn FusionPrimitives>,
        notifier: Option<Notifier>,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<MergeCommand>();
        let (event_tx, event_rx) = mpsc::channel::<MergeEvent>();

        let thread = std::thread::Builder::new()
            .name("photomerge-worker".into())
            .spawn(move || {
                let session = MergeSession::with_primitives(engine, primitives);
                let sink = EventSink {
                    tx: event_tx,
                    notifier,
                };
                worker_loop(cmd_rx, sink, session);
            })?;

        Ok(Self {
            commands: Some(cmd_tx),
            events: event_rx,
            generation: 0,
            thread: Some(thread),
        })
    }

    fn send(&self, command: MergeCommand) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(MergeError::WorkerDisconnected)?
            .send(command)
            .map_err(|_| MergeError::WorkerDisconnected)
    }

    /// Replaces the frame sequence. Results of earlier loads still in
    /// flight are discarded from now on.
    pub fn load(&mut self, frames: Vec<RawFrame>) -> Result<()> {
        self.send(MergeCommand::Load { frames })?;
        self.generation += 1;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.send(MergeCommand::Clear)?;
        self.generation += 1;
        Ok(())
    }

    pub fn set_mask(&self, mask: Mask) -> Result<()> {
        self.send(MergeCommand::SetMask { mask })
    }

    pub fn clear_mask(&self) -> Result<()> {
        self.send(MergeCommand::ClearMask)
    }

    pub fn merge(&self, set: FrameSet, config: MergeConfig) -> Result<()> {
        self.send(MergeCommand::Merge { set, config })
    }

    /// Generation of the most recent load or clear request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn is_current(&self, event: &MergeEvent) -> bool {
        let current = event.generation() >= self.generation;
        if !current {
            debug!(
                event_generation = event.generation(),
                generation = self.generation,
                "Discarding stale worker event"
            );
        }
        current
    }

    /// Next current event, if one is ready.
    pub fn try_recv(&self) -> Option<MergeEvent> {
        while let Ok(event) = self.events.try_recv() {
            if self.is_current(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Blocks until the next current event.
    pub fn recv(&self) -> Result<MergeEvent> {
        loop {
            let event = self.events.recv().map_err(|_| MergeError::WorkerDisconnected)?;
            if self.is_current(&event) {
                return Ok(event);
            }
        }
    }

    /// Blocks up to `timeout` for the next current event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MergeEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            match self.events.recv_timeout(left) {
                Ok(event) if self.is_current(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for MergeWorker {
    fn drop(&mut self) {
        // Closing the command channel ends the worker loop.
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Pops the next command. A run of queued merges collapses to the last.
fn next_command(backlog: &mut VecDeque<MergeCommand>) -> Option<MergeCommand> {
    let mut cmd = backlog.pop_front()?;
    while matches!(cmd, MergeCommand::Merge { .. })
        && matches!(backlog.front(), Some(MergeCommand::Merge { .. }))
    {
        debug!("Coalescing superseded merge request");
        if let Some(next) = backlog.pop_front() {
            cmd = next;
        }
    }
    Some(cmd)
}

fn worker_loop(rx: mpsc::Receiver<MergeCommand>, sink: EventSink, mut session: MergeSession) {
    let mut generation = 0u64;
    let mut backlog = VecDeque::new();

    while let Ok(first) = rx.recv() {
        backlog.push_back(first);
        backlog.extend(rx.try_iter());

        while let Some(cmd) = next_command(&mut backlog) {
            match cmd {
                MergeCommand::Load { frames } => {
                    generation += 1;
                    let reporter = ChannelProgressReporter {
                        sink: &sink,
                        generation,
                        current: Mutex::new(None),
                    };
                    let report = session.load_reported(&frames, &reporter);
                    sink.send(MergeEvent::Loaded { generation, report });
                }
                MergeCommand::Clear => {
                    generation += 1;
                    session.clear();
                    sink.send(MergeEvent::Cleared { generation });
                }
                MergeCommand::SetMask { mask } => match session.set_mask(mask) {
                    Ok(()) => sink.send(MergeEvent::MaskUpdated {
                        generation,
                        has_mask: true,
                    }),
                    Err(e) => sink.send(MergeEvent::Error {
                        generation,
                        message: e.to_string(),
                    }),
                },
                MergeCommand::ClearMask => {
                    session.clear_mask();
                    sink.send(MergeEvent::MaskUpdated {
                        generation,
                        has_mask: false,
                    });
                }
                MergeCommand::Merge { set, config } => {
                    let start = Instant::now();
                    let reporter = ChannelProgressReporter {
                        sink: &sink,
                        generation,
                        current: Mutex::new(None),
                    };
                    let output = session.merge_reported(set, &config, &reporter);
                    let elapsed = start.elapsed();
                    info!(
                        policy = %config.policy,
                        status = %output.status,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Merge request finished"
                    );
                    sink.send(MergeEvent::MergeComplete {
                        generation,
                        set,
                        output,
                        elapsed,
                    });
                }
            }
            // Pick up commands that arrived while this one ran.
            backlog.extend(rx.try_iter());
        }
    }
}
