//! Typed application messages and their frame codec
//!
//! Every message type knows its ECU id and addressing scheme. Decoding is a
//! dispatch mechanism rather than a validation step: a receiver holding a raw
//! frame tries each message type it cares about, in a fixed order, and reacts
//! to the first one that matches.
//!
//! # Example
//!
//! ```
//! use doggie_core::messages::{EcuMessage, RpmStatus, SpeedStatus};
//!
//! let frame = RpmStatus { rpm: 3000 }.to_frame();
//! assert_eq!(SpeedStatus::from_frame(&frame), None);
//! assert_eq!(RpmStatus::from_frame(&frame), Some(RpmStatus { rpm: 3000 }));
//! ```

mod abs;
mod central;
mod cluster;
mod cruise;
mod doors;
mod immo;

use std::fmt;

pub use abs::AbsPulse;
pub use central::{AbsStatus, AirbagStatus, EngineStatus, RpmStatus, SpeedStatus};
pub use cluster::{AirbagToggle, DoorsControl, EngineControl};
pub use cruise::CruiseControl;
pub use doors::{DoorSet, DoorsStatus};
pub use immo::KeyState;

use crate::frame::{CanFrame, MAX_DATA_LEN};

/// How a message type is identified on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// The arbitration id alone identifies the message; the payload is the
    /// whole frame body
    Direct,
    /// The arbitration id plus a one-byte discriminator at payload offset 0
    SubId(u8),
}

/// A message with a fixed wire layout
///
/// Implementors describe only their own payload bytes; the arbitration id and
/// any sub-id prefix are handled by [`EcuMessage::to_frame`] and
/// [`EcuMessage::from_frame`].
pub trait EcuMessage: Sized {
    /// Arbitration id of the owning ECU
    const ECU_ID: u16;

    /// Addressing scheme for this message type
    const ADDRESSING: Addressing;

    /// Append the payload bytes (after any sub-id) to `buf`
    fn write_payload(&self, buf: &mut Vec<u8>);

    /// Parse payload bytes (after any sub-id); `None` when too short
    fn read_payload(data: &[u8]) -> Option<Self>;

    /// Encode into a raw frame
    fn to_frame(&self) -> CanFrame {
        let mut data = Vec::with_capacity(MAX_DATA_LEN);
        if let Addressing::SubId(sub_id) = Self::ADDRESSING {
            data.push(sub_id);
        }
        self.write_payload(&mut data);
        CanFrame::from_parts(Self::ECU_ID, data)
    }

    /// Decode from a raw frame; `None` when the frame is not of this type
    fn from_frame(frame: &CanFrame) -> Option<Self> {
        if frame.id() != Self::ECU_ID {
            return None;
        }

        match Self::ADDRESSING {
            Addressing::Direct => Self::read_payload(frame.data()),
            Addressing::SubId(sub_id) => match frame.data().split_first() {
                Some((&first, rest)) if first == sub_id => Self::read_payload(rest),
                _ => None,
            },
        }
    }
}

/// Encode any message into a raw frame
pub fn encode<M: EcuMessage>(message: &M) -> CanFrame {
    message.to_frame()
}

/// Try to decode a raw frame as message type `M`
pub fn decode<M: EcuMessage>(frame: &CanFrame) -> Option<M> {
    M::from_frame(frame)
}

/// Read a single flag byte (0 = false, nonzero = true)
pub(crate) fn read_flag(data: &[u8]) -> Option<bool> {
    data.first().map(|&b| b != 0)
}

/// Read a big-endian u16
pub(crate) fn read_u16_be(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

// =============================================================================
// Tagged union of every message on the network
// =============================================================================

/// Any message known to this network
///
/// Used where a component wants to look at every frame, e.g. bus tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    EngineStatus(EngineStatus),
    SpeedStatus(SpeedStatus),
    RpmStatus(RpmStatus),
    AbsStatus(AbsStatus),
    AirbagStatus(AirbagStatus),
    KeyState(KeyState),
    EngineControl(EngineControl),
    DoorsControl(DoorsControl),
    AirbagToggle(AirbagToggle),
    DoorsStatus(DoorsStatus),
    CruiseControl(CruiseControl),
    AbsPulse(AbsPulse),
}

impl Message {
    /// Decode a frame by trying every message type in a fixed order
    pub fn decode(frame: &CanFrame) -> Option<Self> {
        if let Some(m) = EngineStatus::from_frame(frame) {
            Some(Self::EngineStatus(m))
        } else if let Some(m) = SpeedStatus::from_frame(frame) {
            Some(Self::SpeedStatus(m))
        } else if let Some(m) = RpmStatus::from_frame(frame) {
            Some(Self::RpmStatus(m))
        } else if let Some(m) = AbsStatus::from_frame(frame) {
            Some(Self::AbsStatus(m))
        } else if let Some(m) = AirbagStatus::from_frame(frame) {
            Some(Self::AirbagStatus(m))
        } else if let Some(m) = KeyState::from_frame(frame) {
            Some(Self::KeyState(m))
        } else if let Some(m) = EngineControl::from_frame(frame) {
            Some(Self::EngineControl(m))
        } else if let Some(m) = DoorsControl::from_frame(frame) {
            Some(Self::DoorsControl(m))
        } else if let Some(m) = AirbagToggle::from_frame(frame) {
            Some(Self::AirbagToggle(m))
        } else if let Some(m) = DoorsStatus::from_frame(frame) {
            Some(Self::DoorsStatus(m))
        } else if let Some(m) = CruiseControl::from_frame(frame) {
            Some(Self::CruiseControl(m))
        } else {
            AbsPulse::from_frame(frame).map(Self::AbsPulse)
        }
    }

    /// Encode into a raw frame
    pub fn to_frame(&self) -> CanFrame {
        match self {
            Self::EngineStatus(m) => m.to_frame(),
            Self::SpeedStatus(m) => m.to_frame(),
            Self::RpmStatus(m) => m.to_frame(),
            Self::AbsStatus(m) => m.to_frame(),
            Self::AirbagStatus(m) => m.to_frame(),
            Self::KeyState(m) => m.to_frame(),
            Self::EngineControl(m) => m.to_frame(),
            Self::DoorsControl(m) => m.to_frame(),
            Self::AirbagToggle(m) => m.to_frame(),
            Self::DoorsStatus(m) => m.to_frame(),
            Self::CruiseControl(m) => m.to_frame(),
            Self::AbsPulse(m) => m.to_frame(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineStatus(m) => write!(f, "EngineStatus(on={})", m.engine_on),
            Self::SpeedStatus(m) => write!(f, "SpeedStatus({} km/h)", m.speed),
            Self::RpmStatus(m) => write!(f, "RpmStatus({} rpm)", m.rpm),
            Self::AbsStatus(m) => write!(f, "AbsStatus(failed={})", m.failed),
            Self::AirbagStatus(m) => write!(f, "AirbagStatus(enabled={})", m.enabled),
            Self::KeyState(m) => write!(f, "KeyState(inserted={})", m.inserted),
            Self::EngineControl(m) => write!(f, "EngineControl(start={})", m.start),
            Self::DoorsControl(m) => {
                write!(f, "DoorsControl(lock={}, doors=[{}])", m.lock, m.doors)
            }
            Self::AirbagToggle(_) => write!(f, "AirbagToggle"),
            Self::DoorsStatus(m) => write!(f, "DoorsStatus(locked=[{}])", m.locked),
            Self::CruiseControl(m) => write!(
                f,
                "CruiseControl(enabled={}, throttle={})",
                m.enabled, m.throttle
            ),
            Self::AbsPulse(_) => write!(f, "AbsPulse"),
        }
    }
}
