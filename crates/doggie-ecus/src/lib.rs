//! doggie-ecus - Emulated ECUs for the Doggie Lab car
//!
//! - [`ecu`] - actor framework: [`Ecu`] behavior driven by [`EcuRunner`]
//! - [`central`], [`cruise_control`], [`doors`], [`immo`], [`abs`],
//!   [`cluster`], [`vin`] - the ECUs
//! - [`car`] - orchestrator owning the bus and the fixed ECU set
//! - [`config`] - TOML lab configuration
//!
//! ```no_run
//! use doggie_ecus::{Car, LabConfig};
//!
//! # async fn run() -> Result<(), doggie_ecus::CarError> {
//! let mut car = Car::builder(LabConfig::default()).build()?;
//! car.start().await?;
//! // ...
//! car.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod abs;
pub mod car;
pub mod central;
pub mod cluster;
pub mod config;
pub mod cruise_control;
pub mod dashboard;
pub mod doors;
pub mod ecu;
pub mod error;
pub mod immo;
pub mod vin;

pub use car::{Car, CarBuilder, CarHandles};
pub use cluster::ClusterIntent;
pub use config::LabConfig;
pub use dashboard::{ButtonState, Dashboard, TracingDashboard};
pub use ecu::{Ecu, EcuBus, EcuHandle, EcuRunner, Lifecycle};
pub use error::{CarError, ConfigError, EcuError};
