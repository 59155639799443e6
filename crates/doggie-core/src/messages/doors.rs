use std::fmt;

use super::{Addressing, EcuMessage};
use crate::ids::DOORS_ECU_ID;

/// One flag per door
///
/// Wire layout (one byte): bit 3 = front right, bit 2 = front left,
/// bit 1 = rear right, bit 0 = rear left. Upper bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoorSet {
    pub front_left: bool,
    pub front_right: bool,
    pub rear_left: bool,
    pub rear_right: bool,
}

const FRONT_RIGHT_BIT: u8 = 0b1000;
const FRONT_LEFT_BIT: u8 = 0b0100;
const REAR_RIGHT_BIT: u8 = 0b0010;
const REAR_LEFT_BIT: u8 = 0b0001;

impl DoorSet {
    pub const NONE: Self = Self {
        front_left: false,
        front_right: false,
        rear_left: false,
        rear_right: false,
    };

    pub const ALL: Self = Self {
        front_left: true,
        front_right: true,
        rear_left: true,
        rear_right: true,
    };

    pub const FRONT_RIGHT: Self = Self {
        front_right: true,
        ..Self::NONE
    };

    pub const FRONT_LEFT: Self = Self {
        front_left: true,
        ..Self::NONE
    };

    pub const REAR_RIGHT: Self = Self {
        rear_right: true,
        ..Self::NONE
    };

    pub const REAR_LEFT: Self = Self {
        rear_left: true,
        ..Self::NONE
    };

    pub fn from_bits(bits: u8) -> Self {
        Self {
            front_right: bits & FRONT_RIGHT_BIT != 0,
            front_left: bits & FRONT_LEFT_BIT != 0,
            rear_right: bits & REAR_RIGHT_BIT != 0,
            rear_left: bits & REAR_LEFT_BIT != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.front_right {
            bits |= FRONT_RIGHT_BIT;
        }
        if self.front_left {
            bits |= FRONT_LEFT_BIT;
        }
        if self.rear_right {
            bits |= REAR_RIGHT_BIT;
        }
        if self.rear_left {
            bits |= REAR_LEFT_BIT;
        }
        bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }

    /// Doors present in either set
    pub fn union(self, other: Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    /// Doors present in `self` but not in `other`
    pub fn difference(self, other: Self) -> Self {
        Self::from_bits(self.bits() & !other.bits())
    }
}

/// Space-separated door names, e.g. `FL RR`
impl fmt::Display for DoorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.front_left, "FL"),
            (self.front_right, "FR"),
            (self.rear_left, "RL"),
            (self.rear_right, "RR"),
        ];
        let mut first = true;
        for (_, name) in names.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// Current lock state of every door (`true` = locked)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorsStatus {
    pub locked: DoorSet,
}

impl EcuMessage for DoorsStatus {
    const ECU_ID: u16 = DOORS_ECU_ID;
    const ADDRESSING: Addressing = Addressing::Direct;

    fn write_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.locked.bits());
    }

    fn read_payload(data: &[u8]) -> Option<Self> {
        data.first().map(|&bits| Self {
            locked: DoorSet::from_bits(bits),
        })
    }
}
