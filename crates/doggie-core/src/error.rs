//! Frame construction errors

use thiserror::Error;

/// Errors raised when building a raw frame from untrusted parts
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Arbitration id outside the 11-bit range
    #[error("Invalid arbitration id 0x{0:X} (11-bit ids only)")]
    InvalidId(u32),

    /// Payload longer than a classic CAN frame can carry
    #[error("Payload too long: {0} bytes (max 8)")]
    PayloadTooLong(usize),
}
