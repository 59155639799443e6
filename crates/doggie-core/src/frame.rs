//! Raw bus frame

use std::fmt;

use crate::error::FrameError;

/// Largest arbitration id on this network (11-bit addressing)
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Largest payload of a classic CAN data frame
pub const MAX_DATA_LEN: usize = 8;

/// A classic CAN data frame: 11-bit arbitration id plus up to 8 data bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanFrame {
    id: u16,
    data: Vec<u8>,
}

impl CanFrame {
    /// Build a frame, validating the id range and payload length
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Result<Self, FrameError> {
        let data = data.into();
        if id > MAX_STANDARD_ID as u32 {
            return Err(FrameError::InvalidId(id));
        }
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            id: id as u16,
            data,
        })
    }

    /// Build a frame from parts already known to be in range.
    ///
    /// Used by the codec and ISO-TP segmenter, which only ever produce
    /// compile-time ids and payloads of at most 8 bytes.
    pub(crate) fn from_parts(id: u16, data: Vec<u8>) -> Self {
        debug_assert!(id <= MAX_STANDARD_ID, "id 0x{id:X} out of range");
        debug_assert!(data.len() <= MAX_DATA_LEN, "payload of {} bytes", data.len());
        Self { id, data }
    }

    /// Arbitration id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for zero-length (presence-only) frames
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// candump-style rendering, e.g. `100#0101`
impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}#{}", self.id, hex::encode_upper(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new_valid() {
        let frame = CanFrame::new(0x7E8, vec![0x02, 0x10, 0x01]).unwrap();
        assert_eq!(frame.id(), 0x7E8);
        assert_eq!(frame.data(), &[0x02, 0x10, 0x01]);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_frame_rejects_extended_id() {
        assert_eq!(
            CanFrame::new(0x18DA00F1, vec![]),
            Err(FrameError::InvalidId(0x18DA00F1))
        );
    }

    #[test]
    fn test_frame_rejects_long_payload() {
        assert_eq!(
            CanFrame::new(0x100, vec![0; 9]),
            Err(FrameError::PayloadTooLong(9))
        );
    }

    #[test]
    fn test_frame_display() {
        let frame = CanFrame::new(0x100, vec![0x03, 0x0B, 0xB8]).unwrap();
        assert_eq!(frame.to_string(), "100#030BB8");

        let empty = CanFrame::new(0x600, vec![]).unwrap();
        assert_eq!(empty.to_string(), "600#");
        assert!(empty.is_empty());
    }
}
