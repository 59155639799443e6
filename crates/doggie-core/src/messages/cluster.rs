//! Instrument cluster requests (sub-addressed on 0x300)

use super::{read_flag, Addressing, DoorSet, EcuMessage};
use crate::ids::INSTRUMENT_CLUSTER_ID;

/// Ask the central ECU to start (`true`) or stop (`false`) the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineControl {
    pub start: bool,
}

impl EcuMessage for EngineControl {
    const ECU_ID: u16 = INSTRUMENT_CLUSTER_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x00);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.start as u8);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_flag(data).map(|start| Self { start })
    }
}

/// Lock or unlock a set of doors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorsControl {
    /// `true` to lock, `false` to unlock
    pub lock: bool,
    pub doors: DoorSet,
}

impl EcuMessage for DoorsControl {
    const ECU_ID: u16 = INSTRUMENT_CLUSTER_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x01);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.lock as u8);
        buf.push(self.doors.bits());
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        match data {
            [lock, doors, ..] => Some(Self {
                lock: *lock != 0,
                doors: DoorSet::from_bits(*doors),
            }),
            _ => None,
        }
    }
}

/// Toggle the airbag armed flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirbagToggle;

impl EcuMessage for AirbagToggle {
    const ECU_ID: u16 = INSTRUMENT_CLUSTER_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x02);

    fn write_payload(&self, _buf: &mut Vec<u8>) {}

    fn read_payload(_data: &[u8]) -> Option<Self> {
        Some(Self)
    }
}
