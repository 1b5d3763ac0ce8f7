//! Multi-bit logical buses laid over socket lines.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesterError};
use crate::pin::{GpioPort, PinMode, PinValue};
use crate::socket::{Alignment, SocketMap};

/// What a bus carries within a chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusRole {
    Row,
    Column,
    Address,
    DataIn,
    DataOut,
}

impl BusRole {
    pub fn name(&self) -> &'static str {
        match self {
            BusRole::Row => "row",
            BusRole::Column => "column",
            BusRole::Address => "address",
            BusRole::DataIn => "d",
            BusRole::DataOut => "q",
        }
    }
}

impl std::fmt::Display for BusRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Chip pins of a bus, least significant bit first, in datasheet numbering.
///
/// `alias_of` declares that this bus deliberately reuses pins of another bus
/// of the same family (multiplexed DRAM addresses, bidirectional data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusLayout {
    pub pins: Cow<'static, [u8]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<BusRole>,
}

impl BusLayout {
    pub const fn new(pins: &'static [u8]) -> Self {
        BusLayout {
            pins: Cow::Borrowed(pins),
            alias_of: None,
        }
    }

    pub const fn aliasing(pins: &'static [u8], role: BusRole) -> Self {
        BusLayout {
            pins: Cow::Borrowed(pins),
            alias_of: Some(role),
        }
    }

    pub fn width(&self) -> u8 {
        self.pins.len() as u8
    }

    pub fn high_mask(&self) -> u32 {
        mask(self.pins.len())
    }
}

fn mask(width: usize) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// A bus resolved against the current socket alignment.
#[derive(Debug, Clone)]
pub struct Bus<'p> {
    role: BusRole,
    layout: &'p BusLayout,
    positions: Vec<u8>,
    value: u32,
}

impl<'p> Bus<'p> {
    pub fn resolve(
        family: &str,
        role: BusRole,
        layout: &'p BusLayout,
        alignment: &Alignment,
    ) -> Result<Self> {
        let positions = layout
            .pins
            .iter()
            .map(|&pin| {
                alignment
                    .position(pin)
                    .ok_or_else(|| TesterError::PinOutOfRange {
                        family: family.to_string(),
                        pin,
                        pin_count: alignment.package_pins(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Bus {
            role,
            layout,
            positions,
            value: 0,
        })
    }

    pub fn role(&self) -> BusRole {
        self.role
    }

    pub fn layout(&self) -> &'p BusLayout {
        self.layout
    }

    pub fn width(&self) -> u8 {
        self.positions.len() as u8
    }

    pub fn high_mask(&self) -> u32 {
        mask(self.positions.len())
    }

    pub fn positions(&self) -> &[u8] {
        &self.positions
    }

    /// Last value written or read.
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn set_mode<P: GpioPort>(&self, socket: &mut SocketMap<P>, mode: PinMode) {
        for &position in &self.positions {
            socket.set_mode(position, mode);
        }
    }

    /// Drives `value` onto the bus. Members must already be outputs.
    ///
    /// Lines already at the wanted level are left alone; the comparison uses
    /// the line latch, so aliased buses sharing lines stay coherent.
    pub fn write<P: GpioPort>(&mut self, socket: &mut SocketMap<P>, value: u32) {
        let value = value & self.high_mask();
        for (bit, &position) in self.positions.iter().enumerate() {
            let level = PinValue::from_bool(value >> bit & 1 == 1);
            if socket.line(position).level() != level {
                socket.write(position, level);
            }
        }
        self.value = value;
    }

    /// Samples the bus. Members must be inputs.
    pub fn read<P: GpioPort>(&mut self, socket: &mut SocketMap<P>) -> u32 {
        let mut value = 0;
        for (bit, &position) in self.positions.iter().enumerate() {
            if socket.read(position).to_bool() {
                value |= 1 << bit;
            }
        }
        self.value = value;
        value
    }

    /// True when this bus drives any of `other`'s lines.
    pub fn overlaps(&self, other: &Bus<'_>) -> bool {
        self.positions.iter().any(|p| other.positions.contains(p))
    }
}
