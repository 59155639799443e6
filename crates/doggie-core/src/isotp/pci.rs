//! Protocol control information: PDU parsing, building and reassembly
//!
//! | PCI nibble | PDU | Layout |
//! |---|---|---|
//! | 0 | Single frame | `0L data...` |
//! | 1 | First frame | `1L LL data...` (12-bit length) |
//! | 2 | Consecutive frame | `2N data...` (4-bit sequence) |
//! | 3 | Flow control | `3S BS ST` |

use std::time::Duration;

use super::IsoTpError;
use crate::frame::MAX_DATA_LEN;

/// Payload bytes carried by a single frame
pub const SF_MAX_DATA: usize = 7;
/// Payload bytes carried by a first frame
pub const FF_DATA: usize = 6;
/// Payload bytes carried by a consecutive frame
pub const CF_DATA: usize = 7;

/// Flow control status nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ContinueToSend,
    Wait,
    Overflow,
}

impl FlowStatus {
    fn nibble(self) -> u8 {
        match self {
            Self::ContinueToSend => 0,
            Self::Wait => 1,
            Self::Overflow => 2,
        }
    }
}

/// One parsed ISO-TP PDU, borrowing from the frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu<'a> {
    Single {
        data: &'a [u8],
    },
    First {
        total_len: usize,
        data: &'a [u8],
    },
    Consecutive {
        sequence: u8,
        data: &'a [u8],
    },
    FlowControl {
        status: FlowStatus,
        block_size: u8,
        st_min: u8,
    },
}

/// Parse a frame payload into a PDU
pub fn parse(frame: &[u8]) -> Result<Pdu<'_>, IsoTpError> {
    let Some(&pci) = frame.first() else {
        return Err(IsoTpError::Malformed("empty frame".into()));
    };

    match pci >> 4 {
        0x0 => {
            let len = (pci & 0x0F) as usize;
            if len == 0 || len > SF_MAX_DATA || len > frame.len() - 1 {
                return Err(IsoTpError::Malformed(format!(
                    "single frame length {} in {} byte frame",
                    len,
                    frame.len()
                )));
            }
            Ok(Pdu::Single {
                data: &frame[1..1 + len],
            })
        }
        0x1 => {
            if frame.len() < 2 {
                return Err(IsoTpError::Malformed("truncated first frame".into()));
            }
            let total_len = (((pci & 0x0F) as usize) << 8) | frame[1] as usize;
            if total_len <= SF_MAX_DATA {
                return Err(IsoTpError::Malformed(format!(
                    "first frame length {} fits a single frame",
                    total_len
                )));
            }
            let data = &frame[2..];
            Ok(Pdu::First {
                total_len,
                data: &data[..data.len().min(total_len)],
            })
        }
        0x2 => Ok(Pdu::Consecutive {
            sequence: pci & 0x0F,
            data: &frame[1..],
        }),
        0x3 => {
            if frame.len() < 3 {
                return Err(IsoTpError::Malformed("truncated flow control".into()));
            }
            let status = match pci & 0x0F {
                0 => FlowStatus::ContinueToSend,
                1 => FlowStatus::Wait,
                2 => FlowStatus::Overflow,
                other => {
                    return Err(IsoTpError::Malformed(format!(
                        "flow status {} reserved",
                        other
                    )))
                }
            };
            Ok(Pdu::FlowControl {
                status,
                block_size: frame[1],
                st_min: frame[2],
            })
        }
        other => Err(IsoTpError::Malformed(format!("PCI type {} reserved", other))),
    }
}

fn pad(mut frame: Vec<u8>, padding: Option<u8>) -> Vec<u8> {
    if let Some(byte) = padding {
        frame.resize(MAX_DATA_LEN, byte);
    }
    frame
}

/// Build a single frame; `data` must hold 1..=7 bytes
pub fn single_frame(data: &[u8], padding: Option<u8>) -> Vec<u8> {
    debug_assert!(!data.is_empty() && data.len() <= SF_MAX_DATA);
    let mut frame = Vec::with_capacity(MAX_DATA_LEN);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    pad(frame, padding)
}

/// Build a first frame announcing `total_len` and carrying `data` (6 bytes)
pub fn first_frame(total_len: usize, data: &[u8]) -> Vec<u8> {
    debug_assert!(total_len <= super::MAX_PAYLOAD_LEN && data.len() == FF_DATA);
    let mut frame = Vec::with_capacity(MAX_DATA_LEN);
    frame.push(0x10 | ((total_len >> 8) as u8 & 0x0F));
    frame.push(total_len as u8);
    frame.extend_from_slice(data);
    frame
}

/// Build a consecutive frame; only the low nibble of `sequence` is used
pub fn consecutive_frame(sequence: u8, data: &[u8], padding: Option<u8>) -> Vec<u8> {
    debug_assert!(!data.is_empty() && data.len() <= CF_DATA);
    let mut frame = Vec::with_capacity(MAX_DATA_LEN);
    frame.push(0x20 | (sequence & 0x0F));
    frame.extend_from_slice(data);
    pad(frame, padding)
}

pub fn flow_control(
    status: FlowStatus,
    block_size: u8,
    st_min: u8,
    padding: Option<u8>,
) -> Vec<u8> {
    pad(vec![0x30 | status.nibble(), block_size, st_min], padding)
}

/// Decode a raw STmin byte into a separation time
///
/// 0x00-0x7F are milliseconds, 0xF1-0xF9 are 100-900 microseconds. Reserved
/// values are treated as the maximum (127 ms).
pub fn st_min_duration(raw: u8) -> Duration {
    match raw {
        0x00..=0x7F => Duration::from_millis(raw as u64),
        0xF1..=0xF9 => Duration::from_micros((raw - 0xF0) as u64 * 100),
        _ => Duration::from_millis(0x7F),
    }
}

/// Split a multi-frame payload into first-frame data and consecutive chunks
pub fn segment(payload: &[u8]) -> (&[u8], std::slice::Chunks<'_, u8>) {
    let (first, rest) = payload.split_at(FF_DATA.min(payload.len()));
    (first, rest.chunks(CF_DATA))
}

/// Reassembly state for one incoming multi-frame message
#[derive(Debug)]
pub struct Reassembler {
    total_len: usize,
    buffer: Vec<u8>,
    next_sequence: u8,
}

impl Reassembler {
    /// Begin reassembly from a first frame
    pub fn new(total_len: usize, first_data: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(total_len);
        buffer.extend_from_slice(first_data);
        Self {
            total_len,
            buffer,
            next_sequence: 1,
        }
    }

    /// Add a consecutive frame; returns `true` once the message is complete
    ///
    /// Padding beyond the announced length is discarded.
    pub fn push(&mut self, sequence: u8, data: &[u8]) -> Result<bool, IsoTpError> {
        if sequence != self.next_sequence {
            return Err(IsoTpError::UnexpectedSequence {
                expected: self.next_sequence,
                got: sequence,
            });
        }
        self.next_sequence = (self.next_sequence + 1) & 0x0F;

        let remaining = self.total_len - self.buffer.len();
        self.buffer
            .extend_from_slice(&data[..data.len().min(remaining)]);
        Ok(self.is_complete())
    }

    /// Length announced by the first frame
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.len() >= self.total_len
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.buffer
    }
}
