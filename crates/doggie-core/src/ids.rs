//! Arbitration ids of the emulated network
//!
//! Each ECU owns one id. Sub-addressed messages share their ECU's id and are
//! told apart by the first payload byte.

/// Central ECU status broadcasts (engine, speed, rpm, ABS, airbag)
pub const CENTRAL_ECU_ID: u16 = 0x100;

/// Immobilizer key state
pub const IMMO_ECU_ID: u16 = 0x200;

/// Instrument cluster requests (engine control, doors control, airbag toggle)
pub const INSTRUMENT_CLUSTER_ID: u16 = 0x300;

/// Doors status
pub const DOORS_ECU_ID: u16 = 0x400;

/// Cruise control throttle requests
pub const CRUISE_CONTROL_ECU_ID: u16 = 0x500;

/// ABS wheel-sensor pulse
pub const ABS_ECU_ID: u16 = 0x600;

/// OBD-II functional request id, used as the VIN ECU's ISO-TP receive id
pub const VIN_ECU_RX_ID: u16 = 0x7DF;

/// VIN ECU ISO-TP response id
pub const VIN_ECU_TX_ID: u16 = 0x7E8;
