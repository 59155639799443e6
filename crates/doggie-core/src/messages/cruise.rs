use super::{Addressing, EcuMessage};
use crate::ids::CRUISE_CONTROL_ECU_ID;

/// Cruise control throttle request
///
/// `throttle` is a percentage. The codec carries the raw byte; the sender is
/// expected to clamp it to `0..=100` and the receiver clamps again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CruiseControl {
    pub enabled: bool,
    pub throttle: u8,
}

impl EcuMessage for CruiseControl {
    const ECU_ID: u16 = CRUISE_CONTROL_ECU_ID;
    const ADDRESSING: Addressing = Addressing::Direct;

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.enabled as u8);
        buf.push(self.throttle);
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        match data {
            [enabled, throttle, ..] => Some(Self {
                enabled: *enabled != 0,
                throttle: *throttle,
            }),
            _ => None,
        }
    }
}
