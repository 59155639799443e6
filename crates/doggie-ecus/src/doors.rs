//! Doors ECU: speed-gated central locking

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use doggie_core::messages::{DoorSet, DoorsControl, DoorsStatus, SpeedStatus};
use doggie_core::{CanFrame, EcuMessage};
use tracing::{debug, info, warn};

use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);
/// Unlocking is refused at or above this speed (km/h)
pub const DEFAULT_UNLOCK_SPEED_LIMIT: u16 = 20;

/// Outcome of one lock/unlock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorsOutcome {
    Locked(DoorSet),
    Unlocked(DoorSet),
    UnlockRefused { speed: u16 },
}

#[derive(Debug, Clone)]
pub struct DoorsState {
    locked: DoorSet,
    speed: u16,
    unlock_speed_limit: u16,
}

impl DoorsState {
    /// All doors locked, car stationary
    pub fn new(unlock_speed_limit: u16) -> Self {
        Self {
            locked: DoorSet::ALL,
            speed: 0,
            unlock_speed_limit,
        }
    }

    pub fn locked(&self) -> DoorSet {
        self.locked
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: u16) {
        self.speed = speed;
    }

    pub fn apply(&mut self, request: DoorsControl) -> DoorsOutcome {
        if request.lock {
            self.locked = self.locked.union(request.doors);
            DoorsOutcome::Locked(request.doors)
        } else if self.speed < self.unlock_speed_limit {
            self.locked = self.locked.difference(request.doors);
            DoorsOutcome::Unlocked(request.doors)
        } else {
            DoorsOutcome::UnlockRefused { speed: self.speed }
        }
    }

    pub fn status(&self) -> DoorsStatus {
        DoorsStatus {
            locked: self.locked,
        }
    }
}

pub struct DoorsEcu {
    state: DoorsState,
    period: Duration,
}

impl DoorsEcu {
    pub fn new(period: Duration, unlock_speed_limit: u16) -> Self {
        Self {
            state: DoorsState::new(unlock_speed_limit),
            period,
        }
    }

    pub fn state(&self) -> &DoorsState {
        &self.state
    }
}

#[async_trait]
impl Ecu for DoorsEcu {
    type Command = Infallible;

    fn name(&self) -> &'static str {
        "Doors ECU"
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    async fn on_frame(&mut self, frame: &CanFrame, bus: &EcuBus) -> Result<(), EcuError> {
        if let Some(msg) = DoorsControl::from_frame(frame) {
            match self.state.apply(msg) {
                DoorsOutcome::Locked(doors) => info!(ecu = %self.name(), %doors, "Doors locked"),
                DoorsOutcome::Unlocked(doors) => {
                    info!(ecu = %self.name(), %doors, "Doors unlocked")
                }
                DoorsOutcome::UnlockRefused { speed } => {
                    warn!(ecu = %self.name(), speed, "Can't unlock doors while moving")
                }
            }
            bus.send(&self.state.status()).await?;
        }
        if let Some(msg) = SpeedStatus::from_frame(frame) {
            self.state.set_speed(msg.speed);
        }
        Ok(())
    }

    async fn on_tick(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        debug!(ecu = %self.name(), locked = %self.state.locked(), "status");
        bus.send(&self.state.status()).await
    }

    async fn on_command(&mut self, command: Infallible, _bus: &EcuBus) -> Result<(), EcuError> {
        match command {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn unlock(doors: DoorSet) -> DoorsControl {
        DoorsControl { lock: false, doors }
    }

    fn lock(doors: DoorSet) -> DoorsControl {
        DoorsControl { lock: true, doors }
    }

    #[test]
    fn test_initially_all_locked() {
        let state = DoorsState::new(DEFAULT_UNLOCK_SPEED_LIMIT);
        assert_eq!(state.locked(), DoorSet::ALL);
        assert_eq!(state.status().locked.bits(), 0x0F);
    }

    #[test]
    fn test_unlock_when_stationary() {
        let mut state = DoorsState::new(DEFAULT_UNLOCK_SPEED_LIMIT);
        assert_eq!(
            state.apply(unlock(DoorSet::ALL)),
            DoorsOutcome::Unlocked(DoorSet::ALL)
        );
        assert_eq!(state.locked(), DoorSet::NONE);
    }

    #[rstest]
    #[case(0, true)]
    #[case(19, true)]
    #[case(20, false)]
    #[case(120, false)]
    fn test_unlock_speed_gate(#[case] speed: u16, #[case] unlocked: bool) {
        let mut state = DoorsState::new(DEFAULT_UNLOCK_SPEED_LIMIT);
        state.set_speed(speed);
        state.apply(unlock(DoorSet::FRONT_LEFT));
        assert_eq!(!state.locked().front_left, unlocked);
        // Other doors are never touched
        assert!(state.locked().front_right);
    }

    #[test]
    fn test_lock_at_any_speed() {
        let mut state = DoorsState::new(DEFAULT_UNLOCK_SPEED_LIMIT);
        state.apply(unlock(DoorSet::ALL));
        state.set_speed(90);

        assert_eq!(
            state.apply(lock(DoorSet::FRONT_RIGHT)),
            DoorsOutcome::Locked(DoorSet::FRONT_RIGHT)
        );
        assert_eq!(state.locked(), DoorSet::FRONT_RIGHT);
        assert_eq!(
            state.apply(unlock(DoorSet::FRONT_RIGHT)),
            DoorsOutcome::UnlockRefused { speed: 90 }
        );
        assert_eq!(state.locked(), DoorSet::FRONT_RIGHT);
    }

    #[test]
    fn test_per_door_unlock() {
        let mut state = DoorsState::new(DEFAULT_UNLOCK_SPEED_LIMIT);
        state.apply(unlock(DoorSet::REAR_LEFT.union(DoorSet::REAR_RIGHT)));
        assert_eq!(state.locked().bits(), 0b1100);
    }

    #[test]
    fn test_custom_speed_limit() {
        let mut state = DoorsState::new(5);
        state.set_speed(5);
        assert_eq!(
            state.apply(unlock(DoorSet::ALL)),
            DoorsOutcome::UnlockRefused { speed: 5 }
        );
    }
}
