//! Async shell around `AttemptDriver`.
//!
//! One task owns the driver and multiplexes three sources with `select!`:
//! the timer tick, the autosave cadence and user commands. Saves run in
//! their own tasks so a slow backend never holds up the driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use drill_core::navigation::{Action, Transition};
use drill_core::timer::TimerEvent;

use super::driver::{AttemptDriver, FinishOutcome, TimerConfig};
use super::requests::SaveAck;
use super::workflow::AttemptGateway;
use crate::error::DriverError;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub period: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dispatch(Action),
    Pause,
    Resume,
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Transition(Transition),
    Timer(TimerEvent),
    Saved(SaveAck),
    SaveFailed,
    Finished(FinishOutcome),
}

/// Caller side of a running attempt.
///
/// Dropping the handle ends the attempt with a best-effort submit.
pub struct AttemptHandle {
    commands: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<RuntimeEvent>,
    task: JoinHandle<FinishOutcome>,
}

impl AttemptHandle {
    /// # Errors
    ///
    /// Returns `DriverError::RuntimeStopped` once the attempt has ended.
    pub async fn send(&self, command: Command) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DriverError::RuntimeStopped)
    }

    /// # Errors
    ///
    /// Returns `DriverError::RuntimeStopped` once the attempt has ended.
    pub async fn dispatch(&self, action: Action) -> Result<(), DriverError> {
        self.send(Command::Dispatch(action)).await
    }

    /// Next event, or `None` after the runtime has stopped and drained.
    pub async fn next_event(&mut self) -> Option<RuntimeEvent> {
        self.events.recv().await
    }

    /// Ask the attempt to finish and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::RuntimeStopped` if the runtime task panicked or
    /// was cancelled.
    pub async fn finish(self) -> Result<FinishOutcome, DriverError> {
        // the runtime may already be gone after time-up
        let _ = self.commands.send(Command::Finish).await;
        self.task.await.map_err(|_| DriverError::RuntimeStopped)
    }
}

pub struct AttemptRuntime;

impl AttemptRuntime {
    /// Spawn the attempt loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        driver: AttemptDriver,
        gateway: Arc<dyn AttemptGateway>,
        timer: &TimerConfig,
        autosave: &AutosaveConfig,
    ) -> AttemptHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(
            driver,
            gateway,
            command_rx,
            event_tx,
            timer.tick,
            autosave.period,
        ));
        AttemptHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }
}

async fn run(
    mut driver: AttemptDriver,
    gateway: Arc<dyn AttemptGateway>,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    tick_period: Duration,
    autosave_period: Duration,
) -> FinishOutcome {
    let mut ticker = time::interval_at(Instant::now() + tick_period, tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut autosave = time::interval_at(Instant::now() + autosave_period, autosave_period);
    autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(event) = driver.tick() {
                    let time_up = matches!(event, TimerEvent::TimeUp);
                    let _ = events.send(RuntimeEvent::Timer(event));
                    if time_up {
                        break;
                    }
                }
            }
            _ = autosave.tick() => {
                let snapshot = driver.snapshot();
                let gateway = Arc::clone(&gateway);
                let events = events.clone();
                tokio::spawn(async move {
                    let event = match gateway.save_progress(snapshot).await {
                        Ok(ack) => RuntimeEvent::Saved(ack),
                        Err(e) => {
                            tracing::warn!(error = %e, "autosave failed");
                            RuntimeEvent::SaveFailed
                        }
                    };
                    let _ = events.send(event);
                });
            }
            command = commands.recv() => match command {
                Some(Command::Dispatch(action)) => {
                    let transition = driver.dispatch(action);
                    let _ = events.send(RuntimeEvent::Transition(transition));
                    if transition == Transition::Finished {
                        break;
                    }
                }
                Some(Command::Pause) => {
                    let _ = driver.pause();
                }
                Some(Command::Resume) => driver.resume(),
                Some(Command::Finish) => break,
                None => {
                    tracing::debug!("attempt handle dropped, submitting");
                    break;
                }
            },
        }
    }

    let outcome = driver.finish(gateway.as_ref()).await;
    let _ = events.send(RuntimeEvent::Finished(outcome.clone()));
    outcome
}
