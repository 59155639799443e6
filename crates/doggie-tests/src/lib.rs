//! End-to-end test support for the Doggie Lab car
//!
//! [`TestHarness`] builds the full car on an in-process bus, attaches a
//! tester interface to the same bus and records what the instrument cluster
//! pushes to its dashboard.
//!
//! # Running Tests
//!
//! No CAN hardware or vcan setup is needed:
//!
//! ```bash
//! cargo test -p doggie-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use doggie_core::messages::DoorSet;
use doggie_core::transport::VirtualCanInterface;
use doggie_core::{
    CanTransport, EcuMessage, IsoTpConfig, IsoTpSocket, Notifier, SharedBus, VirtualCanBus,
};
use doggie_ecus::config::LabConfig;
use doggie_ecus::{ButtonState, Car, Dashboard};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Latest value of every dashboard field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub speed: Option<u16>,
    pub rpm: Option<u16>,
    pub button: ButtonState,
    pub doors_locked: Option<DoorSet>,
    pub abs_ok: Option<bool>,
    pub airbag_enabled: Option<bool>,
    pub cruise_enabled: Option<bool>,
    pub throttle: Option<f32>,
}

/// Dashboard that keeps the latest pushed values
#[derive(Debug, Default)]
pub struct RecordingDashboard {
    state: Mutex<DashboardSnapshot>,
    buttons: Mutex<Vec<ButtonState>>,
}

impl RecordingDashboard {
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.lock().clone()
    }

    /// Every button state pushed so far, in order
    pub fn button_history(&self) -> Vec<ButtonState> {
        self.buttons.lock().clone()
    }
}

impl Dashboard for RecordingDashboard {
    fn update_speed(&self, speed: u16) {
        self.state.lock().speed = Some(speed);
    }

    fn update_rpm(&self, rpm: u16) {
        self.state.lock().rpm = Some(rpm);
    }

    fn set_button_state(&self, state: ButtonState) {
        self.state.lock().button = state;
        self.buttons.lock().push(state);
    }

    fn update_door_status(&self, locked: DoorSet) {
        self.state.lock().doors_locked = Some(locked);
    }

    fn update_abs_warning(&self, abs_ok: bool) {
        self.state.lock().abs_ok = Some(abs_ok);
    }

    fn update_airbag_warning(&self, airbag_enabled: bool) {
        self.state.lock().airbag_enabled = Some(airbag_enabled);
    }

    fn update_cruise_control(&self, enabled: bool, _target_speed: Option<u16>) {
        self.state.lock().cruise_enabled = Some(enabled);
    }

    fn update_throttle(&self, throttle: f32) {
        self.state.lock().throttle = Some(throttle);
    }
}

/// Running car plus a tester on the same virtual bus
pub struct TestHarness {
    pub car: Car,
    pub dashboard: Arc<RecordingDashboard>,
    vcan: VirtualCanBus,
    tester: VirtualCanInterface,
    diagnostics: IsoTpConfig,
}

impl TestHarness {
    /// Stock car as shipped
    pub async fn start() -> Self {
        Self::start_with(LabConfig::default()).await
    }

    pub async fn start_with(config: LabConfig) -> Self {
        let vcan = VirtualCanBus::new("vcan-test");
        let tester = vcan.open("tester");
        let dashboard = Arc::new(RecordingDashboard::default());
        let diagnostics = config.diagnostics.isotp();

        let mut car = Car::builder(config)
            .dashboard(dashboard.clone())
            .seed(42)
            .build_virtual(vcan.clone());
        car.start().await.expect("car failed to start");

        Self {
            car,
            dashboard,
            vcan,
            tester,
            diagnostics,
        }
    }

    /// Inject a message as an external device would
    pub async fn send<M: EcuMessage>(&self, message: &M) {
        self.tester
            .send(&message.to_frame())
            .await
            .expect("tester send failed");
    }

    /// Wait for a message of type `M` satisfying `accept`
    pub async fn wait_for<M, F>(&self, timeout: Duration, accept: F) -> Option<M>
    where
        M: EcuMessage,
        F: Fn(&M) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let frame = self
                .tester
                .recv(remaining)
                .await
                .expect("tester receive failed")?;
            if let Some(message) = M::from_frame(&frame) {
                if accept(&message) {
                    return Some(message);
                }
            }
        }
    }

    /// Collect every message of type `M` seen within `window`
    pub async fn collect<M: EcuMessage>(&self, window: Duration) -> Vec<M> {
        let deadline = Instant::now() + window;
        let mut seen = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return seen;
            }
            match self.tester.recv(remaining).await.expect("tester receive failed") {
                Some(frame) => seen.extend(M::from_frame(&frame)),
                None => return seen,
            }
        }
    }

    /// ISO-TP tester addressed to the diagnostic ECU
    pub fn diagnostic_tester(&self) -> DiagnosticTester {
        let bus: SharedBus = Arc::new(self.vcan.open("diag-tester"));
        let notifier = Arc::new(Notifier::new(bus.clone()));
        notifier.start();
        // Mirror of the ECU's addressing
        let config = IsoTpConfig {
            rx_id: self.diagnostics.tx_id,
            tx_id: self.diagnostics.rx_id,
            ..self.diagnostics.clone()
        };
        let socket = IsoTpSocket::open(bus, &notifier, config).expect("tester ISO-TP socket");
        DiagnosticTester { socket, notifier }
    }

    pub async fn shutdown(mut self) {
        self.car.stop().await.expect("car failed to stop");
    }
}

/// Client side of the diagnostic service
pub struct DiagnosticTester {
    socket: IsoTpSocket,
    notifier: Arc<Notifier>,
}

impl DiagnosticTester {
    /// Send `request` and wait up to `timeout` for the response
    pub async fn request(&mut self, request: &[u8], timeout: Duration) -> Option<Vec<u8>> {
        self.socket.send(request).await.expect("ISO-TP send failed");
        self.socket
            .recv_timeout(timeout)
            .await
            .expect("ISO-TP receive failed")
    }

    pub async fn close(self) {
        let notifier = self.notifier.clone();
        drop(self);
        notifier.stop().await;
    }
}
