//! ISO-TP (ISO 15765-2) segmented transport, normal 11-bit addressing
//!
//! - [`pci`] - pure PDU parsing/encoding, segmentation and reassembly
//! - [`IsoTpSocket`] - async endpoint bound to one (rx-id, tx-id) pair,
//!   fed by a [`Notifier`](crate::Notifier) listener

pub mod pci;
mod socket;

pub use socket::IsoTpSocket;

use std::time::Duration;

use thiserror::Error;

use crate::frame::MAX_STANDARD_ID;
use crate::transport::TransportError;

/// Largest payload expressible with a 12-bit first-frame length
pub const MAX_PAYLOAD_LEN: usize = 4095;

/// ISO-TP errors
#[derive(Debug, Error)]
pub enum IsoTpError {
    #[error("Invalid ISO-TP configuration: {0}")]
    InvalidConfig(String),

    #[error("Payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Malformed PDU: {0}")]
    Malformed(String),

    #[error("Unexpected sequence number: expected {expected}, got {got}")]
    UnexpectedSequence { expected: u8, got: u8 },

    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("Receiver reported overflow")]
    Overflow,

    #[error("Too many flow-control WAIT frames ({0})")]
    WaitLimitExceeded(u8),

    #[error("Listener queue closed")]
    ListenerClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration for one ISO-TP endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct IsoTpConfig {
    /// Arbitration id this endpoint listens on
    pub rx_id: u16,
    /// Arbitration id this endpoint transmits on
    pub tx_id: u16,
    /// Padding byte for transmitted frames (None = no padding)
    pub padding: Option<u8>,
    /// Consecutive frames we accept before sending another flow control (0 = unlimited)
    pub block_size: u8,
    /// Raw STmin we advertise in our flow control frames
    pub st_min: u8,
    /// Maximum payload accepted in either direction
    pub max_payload_len: usize,
    /// Maximum flow-control WAIT frames tolerated per send
    pub wft_max: u8,
    /// Timeout waiting for flow control after a first frame or block
    pub n_bs: Duration,
    /// Timeout waiting for the next consecutive frame
    pub n_cr: Duration,
}

impl IsoTpConfig {
    pub fn new(rx_id: u16, tx_id: u16) -> Self {
        Self {
            rx_id,
            tx_id,
            padding: Some(0x00),
            block_size: 0,
            st_min: 0,
            max_payload_len: MAX_PAYLOAD_LEN,
            wft_max: 10,
            n_bs: Duration::from_secs(1),
            n_cr: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> Result<(), IsoTpError> {
        if self.rx_id == self.tx_id {
            return Err(IsoTpError::InvalidConfig(format!(
                "rx id and tx id are both 0x{:03X}",
                self.rx_id
            )));
        }
        if self.rx_id > MAX_STANDARD_ID || self.tx_id > MAX_STANDARD_ID {
            return Err(IsoTpError::InvalidConfig(format!(
                "ids 0x{:X}/0x{:X} outside 11-bit range",
                self.rx_id, self.tx_id
            )));
        }
        if self.max_payload_len == 0 || self.max_payload_len > MAX_PAYLOAD_LEN {
            return Err(IsoTpError::InvalidConfig(format!(
                "max payload length {} not in 1..={}",
                self.max_payload_len, MAX_PAYLOAD_LEN
            )));
        }
        Ok(())
    }
}
