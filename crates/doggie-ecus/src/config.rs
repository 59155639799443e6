//! Lab configuration
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock car on a virtual bus.
//!
//! ```toml
//! [transport]
//! type = "socketcan"
//! tx_interface = "can0"
//! rx_interface = "can1"
//!
//! [timing]
//! central_period_ms = 100
//!
//! [doors]
//! unlock_speed_limit = 20
//!
//! [diagnostics]
//! rx_id = 0x7DF
//! tx_id = 0x7E8
//! secret = "flag{sarasaVIN123456789}"
//! ```

use std::path::Path;
use std::time::Duration;

use doggie_core::ids::{VIN_ECU_RX_ID, VIN_ECU_TX_ID};
use doggie_core::IsoTpConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vin::DEFAULT_SECRET;
use crate::{abs, central, cruise_control, doors, immo};

/// Complete lab configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub doors: DoorsConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl LabConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.diagnostics
            .isotp()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("diagnostics: {e}")))?;
        if self.transport.kind == TransportKind::Socketcan
            && (self.transport.tx_interface.is_empty() || self.transport.rx_interface.is_empty())
        {
            return Err(ConfigError::Invalid(
                "socketcan transport needs tx_interface and rx_interface".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process bus; nothing outside the process can see the traffic
    #[default]
    Virtual,
    /// Linux SocketCAN interfaces
    Socketcan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(rename = "type", default)]
    pub kind: TransportKind,

    /// Interface frames are sent on
    #[serde(default = "default_tx_interface")]
    pub tx_interface: String,

    /// Interface frames are received from (may equal `tx_interface`)
    #[serde(default = "default_rx_interface")]
    pub rx_interface: String,

    /// Bus bitrate; informational, SocketCAN interfaces are configured by the OS
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

fn default_tx_interface() -> String {
    "vcan0".to_string()
}

fn default_rx_interface() -> String {
    "vcan0".to_string()
}

fn default_bitrate() -> u32 {
    500_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            tx_interface: default_tx_interface(),
            rx_interface: default_rx_interface(),
            bitrate: default_bitrate(),
        }
    }
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// ECU periods in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_central_period_ms")]
    pub central_period_ms: u64,

    #[serde(default = "default_cruise_period_ms")]
    pub cruise_period_ms: u64,

    #[serde(default = "default_doors_period_ms")]
    pub doors_period_ms: u64,

    #[serde(default = "default_immo_period_ms")]
    pub immo_period_ms: u64,

    #[serde(default = "default_abs_period_ms")]
    pub abs_period_ms: u64,
}

fn default_central_period_ms() -> u64 {
    central::DEFAULT_PERIOD.as_millis() as u64
}

fn default_cruise_period_ms() -> u64 {
    cruise_control::DEFAULT_PERIOD.as_millis() as u64
}

fn default_doors_period_ms() -> u64 {
    doors::DEFAULT_PERIOD.as_millis() as u64
}

fn default_immo_period_ms() -> u64 {
    immo::DEFAULT_PERIOD.as_millis() as u64
}

fn default_abs_period_ms() -> u64 {
    abs::DEFAULT_PERIOD.as_millis() as u64
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            central_period_ms: default_central_period_ms(),
            cruise_period_ms: default_cruise_period_ms(),
            doors_period_ms: default_doors_period_ms(),
            immo_period_ms: default_immo_period_ms(),
            abs_period_ms: default_abs_period_ms(),
        }
    }
}

impl TimingConfig {
    pub fn central_period(&self) -> Duration {
        Duration::from_millis(self.central_period_ms)
    }

    pub fn cruise_period(&self) -> Duration {
        Duration::from_millis(self.cruise_period_ms)
    }

    pub fn doors_period(&self) -> Duration {
        Duration::from_millis(self.doors_period_ms)
    }

    pub fn immo_period(&self) -> Duration {
        Duration::from_millis(self.immo_period_ms)
    }

    pub fn abs_period(&self) -> Duration {
        Duration::from_millis(self.abs_period_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("central_period_ms", self.central_period_ms),
            ("cruise_period_ms", self.cruise_period_ms),
            ("doors_period_ms", self.doors_period_ms),
            ("immo_period_ms", self.immo_period_ms),
            ("abs_period_ms", self.abs_period_ms),
        ];
        if let Some((field, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!(
                "timing.{field} must be greater than zero"
            )));
        }

        // A pulse landing one tick late must not push the counter over
        let max_abs = u64::from(central::ABS_FAULT_THRESHOLD - 1) * self.central_period_ms;
        if self.abs_period_ms > max_abs {
            return Err(ConfigError::Invalid(format!(
                "timing.abs_period_ms ({}) must be at most {} with a {} ms central period",
                self.abs_period_ms, max_abs, self.central_period_ms
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Doors Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorsConfig {
    /// Unlock requests are refused at or above this speed (km/h)
    #[serde(default = "default_unlock_speed_limit")]
    pub unlock_speed_limit: u16,
}

fn default_unlock_speed_limit() -> u16 {
    doors::DEFAULT_UNLOCK_SPEED_LIMIT
}

impl Default for DoorsConfig {
    fn default() -> Self {
        Self {
            unlock_speed_limit: default_unlock_speed_limit(),
        }
    }
}

// =============================================================================
// Diagnostics Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Id the VIN ECU listens on (tester sends to this)
    #[serde(default = "default_rx_id")]
    pub rx_id: u16,

    /// Id the VIN ECU answers on
    #[serde(default = "default_tx_id")]
    pub tx_id: u16,

    /// Payload released to a well-formed VIN request
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Padding byte for ISO-TP frames; omit to send unpadded frames
    #[serde(default = "default_padding")]
    pub padding: Option<u8>,
}

fn default_rx_id() -> u16 {
    VIN_ECU_RX_ID
}

fn default_tx_id() -> u16 {
    VIN_ECU_TX_ID
}

fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}

fn default_padding() -> Option<u8> {
    Some(0x00)
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rx_id: default_rx_id(),
            tx_id: default_tx_id(),
            secret: default_secret(),
            padding: default_padding(),
        }
    }
}

impl DiagnosticsConfig {
    /// ISO-TP endpoint settings for the VIN ECU
    pub fn isotp(&self) -> IsoTpConfig {
        IsoTpConfig {
            padding: self.padding,
            ..IsoTpConfig::new(self.rx_id, self.tx_id)
        }
    }
}
