//! Instrument cluster adapter
//!
//! Bridges the bus and the [`Dashboard`]: status broadcasts are decoded and
//! pushed to the dashboard, operator intents become control frames.

use std::sync::Arc;

use async_trait::async_trait;
use doggie_core::messages::{
    AbsStatus, AirbagStatus, AirbagToggle, CruiseControl, DoorSet, DoorsControl, DoorsStatus,
    EngineControl, EngineStatus, RpmStatus, SpeedStatus,
};
use doggie_core::{CanFrame, EcuMessage};
use tracing::{debug, info};

use crate::dashboard::{ButtonState, Dashboard};
use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;

/// Operator intents raised from the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterIntent {
    PressStart,
    LockDoors,
    UnlockDoors,
    ToggleAirbag,
}

pub struct ClusterEcu {
    dashboard: Arc<dyn Dashboard>,
    button: ButtonState,
}

impl ClusterEcu {
    pub fn new(dashboard: Arc<dyn Dashboard>) -> Self {
        Self {
            dashboard,
            button: ButtonState::Off,
        }
    }

    pub fn button_state(&self) -> ButtonState {
        self.button
    }

    fn set_button(&mut self, state: ButtonState) {
        self.button = state;
        self.dashboard.set_button_state(state);
    }

    async fn press_start(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        match self.button {
            ButtonState::On => {
                info!(ecu = %self.name(), "Stop requested");
                bus.send(&EngineControl { start: false }).await
            }
            ButtonState::Off => {
                info!(ecu = %self.name(), "Start requested");
                self.set_button(ButtonState::Ignition);
                bus.send(&EngineControl { start: true }).await
            }
            // Waiting for the engine to report back
            ButtonState::Ignition => Ok(()),
        }
    }
}

#[async_trait]
impl Ecu for ClusterEcu {
    type Command = ClusterIntent;

    fn name(&self) -> &'static str {
        "Instrument Cluster"
    }

    async fn on_frame(&mut self, frame: &CanFrame, _bus: &EcuBus) -> Result<(), EcuError> {
        if let Some(msg) = SpeedStatus::from_frame(frame) {
            self.dashboard.update_speed(msg.speed);
        } else if let Some(msg) = RpmStatus::from_frame(frame) {
            self.dashboard.update_rpm(msg.rpm);
        } else if let Some(msg) = EngineStatus::from_frame(frame) {
            let state = if msg.engine_on {
                ButtonState::On
            } else {
                ButtonState::Off
            };
            self.set_button(state);
        } else if let Some(msg) = DoorsStatus::from_frame(frame) {
            self.dashboard.update_door_status(msg.locked);
        } else if let Some(msg) = AbsStatus::from_frame(frame) {
            self.dashboard.update_abs_warning(!msg.failed);
        } else if let Some(msg) = AirbagStatus::from_frame(frame) {
            self.dashboard.update_airbag_warning(msg.enabled);
        } else if let Some(msg) = CruiseControl::from_frame(frame) {
            self.dashboard.update_cruise_control(msg.enabled, None);
            let throttle = if msg.enabled {
                msg.throttle as f32 / 100.0
            } else {
                0.0
            };
            self.dashboard.update_throttle(throttle);
        }
        Ok(())
    }

    async fn on_command(&mut self, intent: ClusterIntent, bus: &EcuBus) -> Result<(), EcuError> {
        debug!(ecu = %self.name(), ?intent, "intent");
        match intent {
            ClusterIntent::PressStart => self.press_start(bus).await,
            ClusterIntent::LockDoors => {
                bus.send(&DoorsControl {
                    lock: true,
                    doors: DoorSet::ALL,
                })
                .await
            }
            ClusterIntent::UnlockDoors => {
                bus.send(&DoorsControl {
                    lock: false,
                    doors: DoorSet::ALL,
                })
                .await
            }
            ClusterIntent::ToggleAirbag => bus.send(&AirbagToggle).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use doggie_core::messages::Message;
    use doggie_core::{CanTransport, SharedBus, VirtualCanBus};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Update {
        Speed(u16),
        Rpm(u16),
        Button(ButtonState),
        Doors(DoorSet),
        Abs(bool),
        Airbag(bool),
        Cruise(bool, Option<u16>),
        Throttle(f32),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Update>>);

    impl Recorder {
        fn take(&self) -> Vec<Update> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    impl Dashboard for Recorder {
        fn update_speed(&self, speed: u16) {
            self.0.lock().push(Update::Speed(speed));
        }
        fn update_rpm(&self, rpm: u16) {
            self.0.lock().push(Update::Rpm(rpm));
        }
        fn set_button_state(&self, state: ButtonState) {
            self.0.lock().push(Update::Button(state));
        }
        fn update_door_status(&self, locked: DoorSet) {
            self.0.lock().push(Update::Doors(locked));
        }
        fn update_abs_warning(&self, abs_ok: bool) {
            self.0.lock().push(Update::Abs(abs_ok));
        }
        fn update_airbag_warning(&self, airbag_enabled: bool) {
            self.0.lock().push(Update::Airbag(airbag_enabled));
        }
        fn update_cruise_control(&self, enabled: bool, target_speed: Option<u16>) {
            self.0.lock().push(Update::Cruise(enabled, target_speed));
        }
        fn update_throttle(&self, throttle: f32) {
            self.0.lock().push(Update::Throttle(throttle));
        }
    }

    struct Fixture {
        recorder: Arc<Recorder>,
        ecu: ClusterEcu,
        bus: EcuBus,
        tester: doggie_core::transport::VirtualCanInterface,
        _vcan: VirtualCanBus,
    }

    fn fixture() -> Fixture {
        let vcan = VirtualCanBus::new("vcan0");
        let shared: SharedBus = Arc::new(vcan.open("cluster"));
        let recorder = Arc::new(Recorder::default());
        Fixture {
            ecu: ClusterEcu::new(recorder.clone()),
            recorder,
            bus: EcuBus::new("Instrument Cluster", shared),
            tester: vcan.open("tester"),
            _vcan: vcan,
        }
    }

    async fn next_sent(tester: &impl CanTransport) -> Message {
        let frame = tester
            .recv(Duration::from_millis(200))
            .await
            .unwrap()
            .expect("no frame sent");
        Message::decode(&frame).expect("unknown frame")
    }

    #[tokio::test]
    async fn test_status_frames_reach_dashboard() {
        let mut f = fixture();
        let frames = [
            SpeedStatus { speed: 42 }.to_frame(),
            RpmStatus { rpm: 2500 }.to_frame(),
            DoorsStatus {
                locked: DoorSet::FRONT_RIGHT,
            }
            .to_frame(),
            AbsStatus { failed: true }.to_frame(),
            AirbagStatus { enabled: true }.to_frame(),
            CruiseControl {
                enabled: true,
                throttle: 50,
            }
            .to_frame(),
            CruiseControl {
                enabled: false,
                throttle: 50,
            }
            .to_frame(),
        ];
        for frame in &frames {
            f.ecu.on_frame(frame, &f.bus).await.unwrap();
        }

        assert_eq!(
            f.recorder.take(),
            vec![
                Update::Speed(42),
                Update::Rpm(2500),
                Update::Doors(DoorSet::FRONT_RIGHT),
                Update::Abs(false),
                Update::Airbag(true),
                Update::Cruise(true, None),
                Update::Throttle(0.5),
                Update::Cruise(false, None),
                Update::Throttle(0.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_button_cycle() {
        let mut f = fixture();

        f.ecu
            .on_command(ClusterIntent::PressStart, &f.bus)
            .await
            .unwrap();
        assert_eq!(f.ecu.button_state(), ButtonState::Ignition);
        assert_eq!(
            next_sent(&f.tester).await,
            Message::EngineControl(EngineControl { start: true })
        );

        // Pressing again while waiting does nothing
        f.ecu
            .on_command(ClusterIntent::PressStart, &f.bus)
            .await
            .unwrap();
        assert!(f
            .tester
            .recv(Duration::from_millis(50))
            .await
            .unwrap()
            .is_none());

        f.ecu
            .on_frame(&EngineStatus { engine_on: true }.to_frame(), &f.bus)
            .await
            .unwrap();
        assert_eq!(f.ecu.button_state(), ButtonState::On);

        f.ecu
            .on_command(ClusterIntent::PressStart, &f.bus)
            .await
            .unwrap();
        assert_eq!(
            next_sent(&f.tester).await,
            Message::EngineControl(EngineControl { start: false })
        );

        assert_eq!(
            f.recorder.take(),
            vec![
                Update::Button(ButtonState::Ignition),
                Update::Button(ButtonState::On),
            ]
        );
    }

    #[tokio::test]
    async fn test_door_and_airbag_intents() {
        let mut f = fixture();

        f.ecu
            .on_command(ClusterIntent::UnlockDoors, &f.bus)
            .await
            .unwrap();
        assert_eq!(
            next_sent(&f.tester).await,
            Message::DoorsControl(DoorsControl {
                lock: false,
                doors: DoorSet::ALL,
            })
        );

        f.ecu
            .on_command(ClusterIntent::LockDoors, &f.bus)
            .await
            .unwrap();
        assert_eq!(
            next_sent(&f.tester).await,
            Message::DoorsControl(DoorsControl {
                lock: true,
                doors: DoorSet::ALL,
            })
        );

        f.ecu
            .on_command(ClusterIntent::ToggleAirbag, &f.bus)
            .await
            .unwrap();
        assert_eq!(
            next_sent(&f.tester).await,
            Message::AirbagToggle(AirbagToggle)
        );
    }
}
