//! Car orchestrator
//!
//! Owns the bus, the notifier and the fixed ECU set. ECUs are registered in
//! a fixed order and started and stopped in that order:
//!
//! | # | ECU                | Period  |
//! |---|--------------------|---------|
//! | 1 | Central ECU        | 100 ms  |
//! | 2 | Cruise Control ECU | 200 ms  |
//! | 3 | Doors ECU          | 100 ms  |
//! | 4 | Immobilizer ECU    | 100 ms  |
//! | 5 | ABS ECU            | 400 ms  |
//! | 6 | Instrument Cluster | -       |
//! | 7 | VIN ECU            | -       |

use std::sync::Arc;

use doggie_core::transport::open_socketcan;
use doggie_core::{Notifier, ProxyBus, SharedBus, VirtualCanBus};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::abs::{AbsCommand, AbsEcu};
use crate::central::CentralEcu;
use crate::cluster::{ClusterEcu, ClusterIntent};
use crate::config::{LabConfig, TransportKind};
use crate::cruise_control::{CruiseCommand, CruiseControlEcu};
use crate::dashboard::{Dashboard, TracingDashboard};
use crate::doors::DoorsEcu;
use crate::ecu::{EcuHandle, EcuRunner, Lifecycle};
use crate::error::{CarError, EcuError};
use crate::immo::{ImmoCommand, ImmoEcu};
use crate::vin::{DiagnosticEcu, DiagnosticResponder};

/// Command handles for the ECUs that accept operator intents
#[derive(Clone)]
pub struct CarHandles {
    pub cluster: EcuHandle<ClusterIntent>,
    pub cruise: EcuHandle<CruiseCommand>,
    pub immo: EcuHandle<ImmoCommand>,
    pub abs: EcuHandle<AbsCommand>,
}

pub struct Car {
    bus: SharedBus,
    notifier: Arc<Notifier>,
    ecus: Vec<Box<dyn Lifecycle>>,
    handles: CarHandles,
    virtual_bus: Option<VirtualCanBus>,
}

impl Car {
    pub fn builder(config: LabConfig) -> CarBuilder {
        CarBuilder::new(config)
    }

    pub fn handles(&self) -> &CarHandles {
        &self.handles
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// The in-process bus, when the car was built on one
    pub fn virtual_bus(&self) -> Option<&VirtualCanBus> {
        self.virtual_bus.as_ref()
    }

    /// ECU names in registration order
    pub fn ecu_names(&self) -> Vec<&str> {
        self.ecus.iter().map(|ecu| ecu.name()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.ecus.iter().any(|ecu| ecu.is_running())
    }

    /// Start frame delivery and every ECU
    ///
    /// A failing ECU does not prevent the others from starting; all failures
    /// are reported together.
    pub async fn start(&mut self) -> Result<(), CarError> {
        self.notifier.start();

        let mut failures = Vec::new();
        for ecu in &mut self.ecus {
            if let Err(e) = ecu.start().await {
                warn!(ecu = %ecu.name(), error = %e, "ECU failed to start");
                failures.push((ecu.name().to_string(), e));
            }
        }
        info!(
            started = self.ecus.len() - failures.len(),
            total = self.ecus.len(),
            "Car started"
        );
        into_result(failures)
    }

    /// Stop every ECU, then frame delivery
    pub async fn stop(&mut self) -> Result<(), CarError> {
        let mut failures = Vec::new();
        for ecu in &mut self.ecus {
            if let Err(e) = ecu.stop().await {
                warn!(ecu = %ecu.name(), error = %e, "ECU failed to stop");
                failures.push((ecu.name().to_string(), e));
            }
        }
        self.notifier.stop().await;
        info!("Car stopped");
        into_result(failures)
    }
}

fn into_result(failures: Vec<(String, EcuError)>) -> Result<(), CarError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CarError::Lifecycle(failures))
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct CarBuilder {
    config: LabConfig,
    dashboard: Arc<dyn Dashboard>,
    rng: Option<StdRng>,
}

impl CarBuilder {
    pub fn new(config: LabConfig) -> Self {
        Self {
            config,
            dashboard: Arc::new(TracingDashboard),
            rng: None,
        }
    }

    pub fn dashboard(mut self, dashboard: Arc<dyn Dashboard>) -> Self {
        self.dashboard = dashboard;
        self
    }

    /// Seed the engine's rpm jitter
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Build on the transport named by the configuration
    pub fn build(self) -> Result<Car, CarError> {
        self.config.validate()?;
        let transport = &self.config.transport;
        match transport.kind {
            TransportKind::Virtual => {
                let vcan = VirtualCanBus::new(transport.tx_interface.clone());
                Ok(self.build_virtual(vcan))
            }
            TransportKind::Socketcan => {
                info!(
                    tx = %transport.tx_interface,
                    rx = %transport.rx_interface,
                    bitrate = transport.bitrate,
                    "Opening SocketCAN interfaces"
                );
                // Separate sockets so the receive side sees our own transmissions
                let tx = open_socketcan(&transport.tx_interface)?;
                let rx = open_socketcan(&transport.rx_interface)?;
                Ok(self.build_with_transports(tx, rx))
            }
        }
    }

    /// Build on an in-process bus; testers may open more interfaces on it
    pub fn build_virtual(self, vcan: VirtualCanBus) -> Car {
        let interface: SharedBus = Arc::new(vcan.open("car"));
        let mut car = self.assemble(Arc::new(ProxyBus::single(interface)));
        car.virtual_bus = Some(vcan);
        car
    }

    /// Build on an arbitrary transmit/receive transport pair
    pub fn build_with_transports(self, tx: SharedBus, rx: SharedBus) -> Car {
        self.assemble(Arc::new(ProxyBus::new(tx, rx)))
    }

    fn assemble(self, bus: SharedBus) -> Car {
        let notifier = Arc::new(Notifier::new(bus.clone()));
        let timing = &self.config.timing;

        let central = match self.rng {
            Some(rng) => CentralEcu::with_rng(timing.central_period(), rng),
            None => CentralEcu::new(timing.central_period()),
        };
        let central = EcuRunner::new(central, bus.clone(), notifier.clone());
        let cruise = EcuRunner::new(
            CruiseControlEcu::new(timing.cruise_period()),
            bus.clone(),
            notifier.clone(),
        );
        let doors = EcuRunner::new(
            DoorsEcu::new(timing.doors_period(), self.config.doors.unlock_speed_limit),
            bus.clone(),
            notifier.clone(),
        );
        let immo = EcuRunner::new(
            ImmoEcu::new(timing.immo_period()),
            bus.clone(),
            notifier.clone(),
        );
        let abs = EcuRunner::new(
            AbsEcu::new(timing.abs_period()),
            bus.clone(),
            notifier.clone(),
        );
        let cluster = EcuRunner::new(
            ClusterEcu::new(self.dashboard.clone()),
            bus.clone(),
            notifier.clone(),
        );
        let vin = DiagnosticEcu::new(
            bus.clone(),
            notifier.clone(),
            self.config.diagnostics.isotp(),
            DiagnosticResponder::new(self.config.diagnostics.secret.as_bytes()),
        );

        let handles = CarHandles {
            cluster: cluster.handle(),
            cruise: cruise.handle(),
            immo: immo.handle(),
            abs: abs.handle(),
        };

        let ecus: Vec<Box<dyn Lifecycle>> = vec![
            Box::new(central),
            Box::new(cruise),
            Box::new(doors),
            Box::new(immo),
            Box::new(abs),
            Box::new(cluster),
            Box::new(vin),
        ];

        Car {
            bus,
            notifier,
            ecus,
            handles,
            virtual_bus: None,
        }
    }
}
