//! ECU actor framework
//!
//! Every ECU runs as one tokio task that owns its domain state. The task is
//! woken by three sources:
//!
//! - frames fanned out by the [`Notifier`] into the ECU's private queue
//! - an optional fixed period (status broadcasts, control loops)
//! - commands sent through an [`EcuHandle`] (dashboard or operator intents)
//!
//! [`EcuRunner`] wraps an [`Ecu`] implementation and gives it the
//! `Created -> Running -> Stopped` lifecycle. On a clean stop the task hands
//! the ECU state back, so the ECU can be started again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doggie_core::{CanFrame, EcuMessage, ListenerId, Notifier, SharedBus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::EcuError;

/// Bound on how long `stop` waits for an ECU task to exit
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Lifecycle
// =============================================================================

/// Start/stop surface shared by every component the car manages
#[async_trait]
pub trait Lifecycle: Send {
    fn name(&self) -> &str;

    fn is_running(&self) -> bool;

    /// Start the component; a no-op when already running
    async fn start(&mut self) -> Result<(), EcuError>;

    /// Stop the component; a no-op when not running
    async fn stop(&mut self) -> Result<(), EcuError>;
}

// =============================================================================
// ECU behavior
// =============================================================================

/// Domain behavior of one ECU, driven by [`EcuRunner`]
#[async_trait]
pub trait Ecu: Send + 'static {
    /// External intents accepted through an [`EcuHandle`]
    type Command: Send + 'static;

    fn name(&self) -> &'static str;

    /// Period of [`Ecu::on_tick`]; `None` for purely reactive ECUs
    fn period(&self) -> Option<Duration> {
        None
    }

    /// Called for every frame on the bus
    async fn on_frame(&mut self, frame: &CanFrame, bus: &EcuBus) -> Result<(), EcuError>;

    /// Called once per period
    async fn on_tick(&mut self, _bus: &EcuBus) -> Result<(), EcuError> {
        Ok(())
    }

    /// Called for every command received through the ECU's handle
    async fn on_command(&mut self, command: Self::Command, bus: &EcuBus)
        -> Result<(), EcuError>;
}

/// Outbound path of an ECU
///
/// Sends go straight to the shared bus: no buffering, no retry.
#[derive(Clone)]
pub struct EcuBus {
    ecu: &'static str,
    bus: SharedBus,
}

impl EcuBus {
    pub fn new(ecu: &'static str, bus: SharedBus) -> Self {
        Self { ecu, bus }
    }

    /// Encode and send a typed message
    pub async fn send<M: EcuMessage>(&self, message: &M) -> Result<(), EcuError> {
        let frame = message.to_frame();
        self.send_frame(&frame).await
    }

    pub async fn send_frame(&self, frame: &CanFrame) -> Result<(), EcuError> {
        debug!(ecu = %self.ecu, %frame, "tx");
        self.bus.send(frame).await?;
        Ok(())
    }

    pub fn shared(&self) -> &SharedBus {
        &self.bus
    }
}

/// Sending side of an ECU's command queue
pub struct EcuHandle<C> {
    ecu: &'static str,
    tx: mpsc::UnboundedSender<C>,
}

impl<C> Clone for EcuHandle<C> {
    fn clone(&self) -> Self {
        Self {
            ecu: self.ecu,
            tx: self.tx.clone(),
        }
    }
}

impl<C> EcuHandle<C> {
    /// Queue a command; it is processed by the ECU's task once running
    pub fn send(&self, command: C) -> Result<(), EcuError> {
        self.tx
            .send(command)
            .map_err(|_| EcuError::CommandChannelClosed(self.ecu.to_string()))
    }
}

// =============================================================================
// Runner
// =============================================================================

type TaskOutput<E> = (E, mpsc::UnboundedReceiver<<E as Ecu>::Command>);

struct RunningTask<E: Ecu> {
    listener: ListenerId,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<TaskOutput<E>>,
}

/// Lifecycle driver for one [`Ecu`]
pub struct EcuRunner<E: Ecu> {
    name: &'static str,
    bus: SharedBus,
    notifier: Arc<Notifier>,
    logic: Option<E>,
    commands: Option<mpsc::UnboundedReceiver<E::Command>>,
    commands_tx: mpsc::UnboundedSender<E::Command>,
    running: Arc<AtomicBool>,
    task: Option<RunningTask<E>>,
}

impl<E: Ecu> EcuRunner<E> {
    /// Wrap `logic`; nothing runs until [`Lifecycle::start`]
    pub fn new(logic: E, bus: SharedBus, notifier: Arc<Notifier>) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            name: logic.name(),
            bus,
            notifier,
            logic: Some(logic),
            commands: Some(commands),
            commands_tx,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn handle(&self) -> EcuHandle<E::Command> {
        EcuHandle {
            ecu: self.name,
            tx: self.commands_tx.clone(),
        }
    }

    /// Inspect the ECU state while it is not running
    pub fn logic(&self) -> Option<&E> {
        self.logic.as_ref()
    }
}

#[async_trait]
impl<E: Ecu> Lifecycle for EcuRunner<E> {
    fn name(&self) -> &str {
        self.name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&mut self) -> Result<(), EcuError> {
        if self.task.is_some() {
            return Ok(());
        }

        let (Some(logic), Some(commands)) = (self.logic.take(), self.commands.take()) else {
            return Err(EcuError::Unavailable(self.name.to_string()));
        };

        let (listener, inbox) = self.notifier.add_listener();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let bus = EcuBus::new(self.name, self.bus.clone());

        let handle = tokio::spawn(run_loop(logic, inbox, commands, shutdown_rx, bus));

        self.task = Some(RunningTask {
            listener,
            shutdown,
            handle,
        });
        self.running.store(true, Ordering::SeqCst);
        info!(ecu = %self.name, "ECU started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EcuError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.running.store(false, Ordering::SeqCst);
        self.notifier.remove_listener(task.listener);
        let _ = task.shutdown.send(true);

        let (logic, commands) = join_within(self.name, task.handle, STOP_TIMEOUT).await?;
        self.logic = Some(logic);
        self.commands = Some(commands);
        info!(ecu = %self.name, "ECU stopped");
        Ok(())
    }
}

impl<E: Ecu> Drop for EcuRunner<E> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.notifier.remove_listener(task.listener);
            task.handle.abort();
        }
    }
}

/// Wait up to `timeout` for an ECU task to exit, aborting it on expiry
pub(crate) async fn join_within<T>(
    name: &str,
    handle: JoinHandle<T>,
    timeout: Duration,
) -> Result<T, EcuError> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(EcuError::TaskFailed {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => {
            abort.abort();
            warn!(ecu = %name, "ECU task did not exit in time, aborted");
            Err(EcuError::StopTimeout {
                name: name.to_string(),
                timeout,
            })
        }
    }
}

async fn run_loop<E: Ecu>(
    mut logic: E,
    mut inbox: mpsc::UnboundedReceiver<CanFrame>,
    mut commands: mpsc::UnboundedReceiver<E::Command>,
    mut shutdown: watch::Receiver<bool>,
    bus: EcuBus,
) -> TaskOutput<E> {
    let name = logic.name();
    let mut ticker = logic.period().map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            frame = inbox.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = logic.on_frame(&frame, &bus).await {
                    warn!(ecu = %name, error = %e, "frame handling failed");
                }
            }

            Some(command) = commands.recv() => {
                if let Err(e) = logic.on_command(command, &bus).await {
                    warn!(ecu = %name, error = %e, "command handling failed");
                }
            }

            _ = tick(&mut ticker) => {
                if let Err(e) = logic.on_tick(&bus).await {
                    warn!(ecu = %name, error = %e, "periodic step failed");
                }
            }
        }
    }

    debug!(ecu = %name, "ECU loop exited");
    (logic, commands)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
