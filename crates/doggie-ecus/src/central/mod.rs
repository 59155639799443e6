//! Central ECU: engine simulation and vehicle state aggregator
//!
//! Consumes key state, engine control, cruise-control throttle, ABS pulses
//! and airbag toggles. Every period it advances the engine and broadcasts
//! engine, rpm, ABS, airbag and speed status.
//!
//! A successful engine start runs a start-up self-test: the airbag reads as
//! disabled for [`AIRBAG_SELF_TEST`] and ABS reads as failed for
//! [`ABS_SELF_TEST`]. When the ABS window closes, the ABS counter and any
//! latched ABS fault are cleared. Pulses received during the window reset the
//! counter but cannot end the window early.

pub mod engine;

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use doggie_core::messages::{
    AbsPulse, AbsStatus, AirbagStatus, AirbagToggle, CruiseControl, EngineControl, EngineStatus,
    KeyState, RpmStatus, SpeedStatus,
};
use doggie_core::{CanFrame, EcuMessage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;
pub use engine::{Engine, EngineState};

/// Ticks without an ABS pulse before the fault latches
pub const ABS_FAULT_THRESHOLD: u32 = 5;
/// How long the airbag reads disabled after an engine start
pub const AIRBAG_SELF_TEST: Duration = Duration::from_millis(300);
/// How long ABS reads failed after an engine start
pub const ABS_SELF_TEST: Duration = Duration::from_millis(800);

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

/// Why an engine control request was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejected {
    NoKey,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy)]
struct SelfTest {
    airbag_until: Instant,
    abs_until: Instant,
}

/// Snapshot broadcast every period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub engine_on: bool,
    pub rpm: u16,
    pub abs_failed: bool,
    pub airbag_enabled: bool,
    pub speed: u16,
}

/// Domain state of the central ECU, free of any I/O
#[derive(Debug, Clone)]
pub struct CentralState {
    engine: Engine,
    key_inserted: bool,
    abs_counter: u32,
    abs_latched: bool,
    airbag_enabled: bool,
    self_test: Option<SelfTest>,
}

impl Default for CentralState {
    fn default() -> Self {
        Self::new()
    }
}

impl CentralState {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
            key_inserted: false,
            abs_counter: 0,
            abs_latched: false,
            airbag_enabled: true,
            self_test: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn key_inserted(&self) -> bool {
        self.key_inserted
    }

    pub fn set_key_inserted(&mut self, inserted: bool) {
        self.key_inserted = inserted;
    }

    pub fn abs_counter(&self) -> u32 {
        self.abs_counter
    }

    /// Start the engine and begin the self-test
    pub fn request_start(&mut self, now: Instant) -> Result<(), StartRejected> {
        if !self.key_inserted {
            return Err(StartRejected::NoKey);
        }
        if self.engine.is_on() {
            return Err(StartRejected::AlreadyRunning);
        }

        self.engine.set_state(EngineState::On);
        self.self_test = Some(SelfTest {
            airbag_until: now + AIRBAG_SELF_TEST,
            abs_until: now + ABS_SELF_TEST,
        });
        Ok(())
    }

    /// Stop the engine; returns `false` when it was already off
    pub fn request_stop(&mut self) -> bool {
        if !self.engine.is_on() {
            return false;
        }
        self.engine.set_state(EngineState::Off);
        true
    }

    /// Apply a cruise-control throttle request
    pub fn apply_cruise(&mut self, request: CruiseControl) {
        if self.engine.is_on() && request.enabled {
            self.engine.set_throttle(request.throttle);
        } else {
            self.engine.set_throttle(0);
        }
    }

    pub fn abs_pulse(&mut self) {
        self.abs_counter = 0;
    }

    /// Flip the airbag flag; returns the new reported state
    pub fn toggle_airbag(&mut self, now: Instant) -> bool {
        self.airbag_enabled = !self.airbag_enabled;
        self.airbag_enabled(now)
    }

    /// Airbag state as reported (disabled during the self-test window)
    pub fn airbag_enabled(&self, now: Instant) -> bool {
        let in_window = self
            .self_test
            .is_some_and(|test| now < test.airbag_until);
        self.airbag_enabled && !in_window
    }

    /// ABS state as reported (failed during the self-test window)
    pub fn abs_failed(&self, now: Instant) -> bool {
        let in_window = self.self_test.is_some_and(|test| now < test.abs_until);
        self.abs_latched || in_window
    }

    fn expire_self_test(&mut self, now: Instant) {
        if let Some(test) = self.self_test {
            if now >= test.abs_until {
                self.self_test = None;
                self.abs_latched = false;
                self.abs_counter = 0;
            }
        }
    }

    /// Run one period: count, simulate, latch, report
    pub fn step<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> StatusReport {
        self.expire_self_test(now);
        self.abs_counter = self.abs_counter.saturating_add(1);
        self.engine.step(rng);
        if self.abs_counter > ABS_FAULT_THRESHOLD {
            self.abs_latched = true;
        }
        self.report(now)
    }

    pub fn report(&self, now: Instant) -> StatusReport {
        StatusReport {
            engine_on: self.engine.is_on(),
            rpm: self.engine.rpm(),
            abs_failed: self.abs_failed(now),
            airbag_enabled: self.airbag_enabled(now),
            speed: self.engine.speed(),
        }
    }
}

// =============================================================================
// ECU
// =============================================================================

pub struct CentralEcu {
    state: CentralState,
    period: Duration,
    rng: StdRng,
}

impl CentralEcu {
    pub fn new(period: Duration) -> Self {
        Self::with_rng(period, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests
    pub fn with_rng(period: Duration, rng: StdRng) -> Self {
        Self {
            state: CentralState::new(),
            period,
            rng,
        }
    }

    pub fn state(&self) -> &CentralState {
        &self.state
    }

    async fn broadcast(&self, report: StatusReport, bus: &EcuBus) -> Result<(), EcuError> {
        bus.send(&EngineStatus {
            engine_on: report.engine_on,
        })
        .await?;
        bus.send(&RpmStatus { rpm: report.rpm }).await?;
        bus.send(&AbsStatus {
            failed: report.abs_failed,
        })
        .await?;
        bus.send(&AirbagStatus {
            enabled: report.airbag_enabled,
        })
        .await?;
        bus.send(&SpeedStatus {
            speed: report.speed,
        })
        .await?;
        Ok(())
    }

    async fn handle_engine_control(
        &mut self,
        request: EngineControl,
        bus: &EcuBus,
    ) -> Result<(), EcuError> {
        let now = Instant::now();
        if request.start {
            match self.state.request_start(now) {
                Ok(()) => info!(ecu = %self.name(), "Engine started"),
                Err(StartRejected::NoKey) => {
                    warn!(ecu = %self.name(), "Can't start engine, no key inserted")
                }
                Err(StartRejected::AlreadyRunning) => {
                    warn!(ecu = %self.name(), "Can't start engine, engine running")
                }
            }
        } else if self.state.request_stop() {
            info!(ecu = %self.name(), "Engine stopped");
        } else {
            warn!(ecu = %self.name(), "Can't stop engine, engine not running");
        }

        self.broadcast(self.state.report(now), bus).await
    }
}

#[async_trait]
impl Ecu for CentralEcu {
    type Command = Infallible;

    fn name(&self) -> &'static str {
        "Central ECU"
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    async fn on_frame(&mut self, frame: &CanFrame, bus: &EcuBus) -> Result<(), EcuError> {
        if let Some(msg) = KeyState::from_frame(frame) {
            self.state.set_key_inserted(msg.inserted);
        } else if let Some(msg) = EngineControl::from_frame(frame) {
            self.handle_engine_control(msg, bus).await?;
        } else if let Some(msg) = CruiseControl::from_frame(frame) {
            self.state.apply_cruise(msg);
        } else if AbsPulse::from_frame(frame).is_some() {
            self.state.abs_pulse();
        } else if AirbagToggle::from_frame(frame).is_some() {
            let enabled = self.state.toggle_airbag(Instant::now());
            debug!(ecu = %self.name(), enabled, "Airbag toggled");
            bus.send(&AirbagStatus { enabled }).await?;
        }
        Ok(())
    }

    async fn on_tick(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        let report = self.state.step(Instant::now(), &mut self.rng);
        self.broadcast(report, bus).await
    }

    async fn on_command(&mut self, command: Infallible, _bus: &EcuBus) -> Result<(), EcuError> {
        match command {}
    }
}
