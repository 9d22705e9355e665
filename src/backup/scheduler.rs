//! Write Coalescing Scheduler: debounces mutation signals into one deferred write.
//!
//! An actor task owns the only pending deadline. Every signal replaces it with
//! `now + window`; when a deadline is reached without being replaced, one
//! snapshot is taken. Writes run inline on the actor, so two scheduled writes
//! from one instance never overlap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::backup::backup_manager::BackupCore;
use crate::backup::error::{BackupError, BackupResult};

// ==========================================
// ACTOR COMMANDS
// ==========================================

pub(crate) enum SchedulerCommand {
    Signal,
    /// Drop the pending deadline without writing.
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    /// Write now if a deadline is pending.
    Flush {
        reply: oneshot::Sender<Option<BackupResult<i64>>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

// ==========================================
// HANDLE
// ==========================================

#[derive(Clone)]
pub struct WriteScheduler {
    tx: mpsc::Sender<SchedulerCommand>,
    window: Duration,
}

impl WriteScheduler {
    pub(crate) fn spawn(core: Arc<BackupCore>, window: Duration, channel_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = SchedulerActor {
            core,
            window,
            deadline: None,
            rx,
        };
        tokio::spawn(actor.run());
        Self { tx, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Non-blocking; safe to call from synchronous state setters.
    pub fn signal_mutation(&self) {
        match self.tx.try_send(SchedulerCommand::Signal) {
            Ok(()) => {}
            // A backlog of signals already guarantees a write after the burst.
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Scheduler inbox full, coalescing signal");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Scheduler stopped, ignoring mutation signal");
            }
        }
    }

    /// Returns whether a pending write was dropped.
    pub async fn cancel_pending(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Cancel { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Performs the pending write immediately. `None` when nothing was pending.
    pub async fn flush(&self) -> Option<BackupResult<i64>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SchedulerCommand::Flush { reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ==========================================
// ACTOR
// ==========================================

struct SchedulerActor {
    core: Arc<BackupCore>,
    window: Duration,
    deadline: Option<Instant>,
    rx: mpsc::Receiver<SchedulerCommand>,
}

impl SchedulerActor {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;

            tokio::select! {
                // 1. Handle Commands
                maybe_cmd = self.rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => break, // Every handle dropped
                    }
                }

                // 2. Quiescence reached
                _ = async move {
                    match deadline {
                        Some(at) => time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.deadline = None;
                    // fire() logs its own failures
                    let _ = self.fire().await;
                }
            }
        }
        debug!("Write scheduler exiting");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) -> bool {
        match cmd {
            SchedulerCommand::Signal => {
                // Cancel-and-replace: at most one deadline is ever live.
                self.deadline = Some(Instant::now() + self.window);
                true
            }
            SchedulerCommand::Cancel { reply } => {
                let _ = reply.send(self.deadline.take().is_some());
                true
            }
            SchedulerCommand::Flush { reply } => {
                let result = match self.deadline.take() {
                    Some(_) => Some(self.fire().await),
                    None => None,
                };
                let _ = reply.send(result);
                true
            }
            SchedulerCommand::Stop { reply } => {
                if self.deadline.take().is_some() {
                    debug!("Write scheduler stopped with a pending write, dropping it");
                }
                let _ = reply.send(());
                false
            }
        }
    }

    /// Failures are logged and absorbed: the next mutation retries the whole write.
    async fn fire(&mut self) -> BackupResult<i64> {
        let result = self.core.snapshot_now().await;
        match &result {
            Ok(ts) => info!("Scheduled backup saved: {}", ts),
            Err(e @ BackupError::InsufficientSpace { .. }) => warn!("Scheduled backup skipped: {}", e),
            Err(e) => error!("Scheduled backup failed: {}", e),
        }
        result
    }
}
