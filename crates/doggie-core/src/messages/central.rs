//! Central ECU status broadcasts (sub-addressed on 0x100)

use super::{read_flag, read_u16_be, Addressing, EcuMessage};
use crate::ids::CENTRAL_ECU_ID;

/// Engine running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub engine_on: bool,
}

impl EcuMessage for EngineStatus {
    const ECU_ID: u16 = CENTRAL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x01);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.engine_on as u8);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_flag(data).map(|engine_on| Self { engine_on })
    }
}

/// Vehicle speed in km/h
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedStatus {
    pub speed: u16,
}

impl EcuMessage for SpeedStatus {
    const ECU_ID: u16 = CENTRAL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x02);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.speed.to_be_bytes());
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_u16_be(data).map(|speed| Self { speed })
    }
}

/// Engine speed in revolutions per minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpmStatus {
    pub rpm: u16,
}

impl EcuMessage for RpmStatus {
    const ECU_ID: u16 = CENTRAL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x03);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.rpm.to_be_bytes());
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_u16_be(data).map(|rpm| Self { rpm })
    }
}

/// ABS fault indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsStatus {
    pub failed: bool,
}

impl EcuMessage for AbsStatus {
    const ECU_ID: u16 = CENTRAL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x04);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.failed as u8);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_flag(data).map(|failed| Self { failed })
    }
}

/// Airbag armed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirbagStatus {
    pub enabled: bool,
}

impl EcuMessage for AirbagStatus {
    const ECU_ID: u16 = CENTRAL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::SubId(0x05);

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.enabled as u8);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_flag(data).map(|enabled| Self { enabled })
    }
}
