use super::{read_flag, Addressing, EcuMessage};
use crate::ids::IMMO_ECU_ID;

/// Whether the ignition key is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub inserted: bool,
}

impl EcuMessage for KeyState {
    const ECU_ID: u16 = IMMO_ECU_ID;
    const ADDRESSING: Addressing = Addressing::Direct;

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.inserted as u8);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        read_flag(data).map(|inserted| Self { inserted })
    }
}
