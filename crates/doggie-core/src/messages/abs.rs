use super::{Addressing, EcuMessage};
use crate::ids::ABS_ECU_ID;

/// Wheel-sensor heartbeat; presence is the whole message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsPulse;

impl EcuMessage for AbsPulse {
    const ECU_ID: u16 = ABS_ECU_ID;
    const ADDRESSING: Addressing = Addressing::Direct;

    fn write_payload(&self, _buf: &mut Vec<u8>) {}

    fn read_payload(_data: &[u8]) -> Option<Self> {
        Some(Self)
    }
}
