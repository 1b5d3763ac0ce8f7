//! A profile resolved against the socket: control lines and buses by position.

use crate::bus::{Bus, BusRole};
use crate::error::{Result, TesterError};
use crate::pin::{GpioPort, PinMode, PinValue};
use crate::profile::{ChipKind, ChipProfile, DramTiming, LogicTable, Signal, StaticTiming};
use crate::socket::{Alignment, SocketMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub position: u8,
    pub active: PinValue,
}

/// Control and power lines of the active family.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    lines: Vec<(Signal, Control)>,
    tie_high: Vec<u8>,
}

impl Controls {
    fn resolve(profile: &ChipProfile, alignment: &Alignment) -> Result<Self> {
        let position = |pin: u8| {
            alignment
                .position(pin)
                .ok_or_else(|| TesterError::PinOutOfRange {
                    family: profile.name.to_string(),
                    pin,
                    pin_count: alignment.package_pins(),
                })
        };
        let lines = profile
            .signals
            .present()
            .map(|(signal, pin)| {
                Ok((
                    signal,
                    Control {
                        position: position(pin.pin)?,
                        active: pin.active,
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let tie_high = profile
            .signals
            .tie_high
            .iter()
            .map(|&pin| position(pin))
            .collect::<Result<Vec<_>>>()?;
        Ok(Controls { lines, tie_high })
    }

    pub fn get(&self, signal: Signal) -> Option<Control> {
        self.lines
            .iter()
            .find(|(s, _)| *s == signal)
            .map(|(_, c)| *c)
    }

    pub fn has(&self, signal: Signal) -> bool {
        self.get(signal).is_some()
    }

    /// Drives a signal to its active level. Absent signals are ignored.
    pub fn assert<P: GpioPort>(&self, socket: &mut SocketMap<P>, signal: Signal) {
        if let Some(control) = self.get(signal) {
            socket.write(control.position, control.active);
        }
    }

    pub fn release<P: GpioPort>(&self, socket: &mut SocketMap<P>, signal: Signal) {
        if let Some(control) = self.get(signal) {
            socket.write(control.position, control.active.inverted());
        }
    }

    /// Turns every control into an output: strobes inactive, then ground,
    /// then supply, then the tied-high pins.
    pub fn power_up<P: GpioPort>(&self, socket: &mut SocketMap<P>) {
        for (signal, control) in &self.lines {
            if !matches!(signal, Signal::Gnd | Signal::Vcc) {
                drive(socket, control.position, control.active.inverted());
            }
        }
        for power in [Signal::Gnd, Signal::Vcc] {
            if let Some(control) = self.get(power) {
                drive(socket, control.position, control.active);
            }
        }
        for &position in &self.tie_high {
            drive(socket, position, PinValue::High);
        }
    }
}

/// Switches a line to output without a glitch: the latch is primed through
/// the pull-up (or its absence) before the driver turns on.
pub fn drive<P: GpioPort>(socket: &mut SocketMap<P>, position: u8, level: PinValue) {
    let primed = match level {
        PinValue::High => PinMode::InputPullUp,
        PinValue::Low => PinMode::Input,
    };
    socket.set_mode(position, primed);
    socket.set_mode(position, PinMode::Output);
    socket.write(position, level);
}

/// Family-specific buses.
#[derive(Debug)]
pub enum BusSet<'p> {
    Logic {
        table: &'p LogicTable,
        /// Checked chip pins with their socket positions, lane order.
        outputs: Vec<(u8, u8)>,
    },
    Dram {
        row: Bus<'p>,
        column: Bus<'p>,
        data_in: Bus<'p>,
        data_out: Bus<'p>,
        /// Data in and out share lines.
        common_io: bool,
        timing: DramTiming,
    },
    Static {
        address: Bus<'p>,
        data: Bus<'p>,
        timing: StaticTiming,
    },
}

impl<'p> BusSet<'p> {
    fn resolve(profile: &'p ChipProfile, alignment: &Alignment) -> Result<Self> {
        let name = profile.name.as_ref();
        match &profile.layout {
            ChipKind::Logic(table) => {
                let outputs = table
                    .output_pins()
                    .into_iter()
                    .map(|pin| {
                        alignment
                            .position(pin)
                            .map(|position| (pin, position))
                            .ok_or_else(|| TesterError::PinOutOfRange {
                                family: name.to_string(),
                                pin,
                                pin_count: alignment.package_pins(),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(BusSet::Logic { table, outputs })
            }
            ChipKind::Dram(d) => Ok(BusSet::Dram {
                row: Bus::resolve(name, BusRole::Row, &d.row, alignment)?,
                column: Bus::resolve(name, BusRole::Column, &d.column, alignment)?,
                data_in: Bus::resolve(name, BusRole::DataIn, &d.data_in, alignment)?,
                data_out: Bus::resolve(name, BusRole::DataOut, &d.data_out, alignment)?,
                common_io: d.data_out.alias_of == Some(BusRole::DataIn),
                timing: d.timing,
            }),
            kind => {
                let layout = kind.static_layout().ok_or_else(|| TesterError::InvalidProfile {
                    family: name.to_string(),
                    reason: "no bus layout".to_string(),
                })?;
                Ok(BusSet::Static {
                    address: Bus::resolve(name, BusRole::Address, &layout.address, alignment)?,
                    data: Bus::resolve(name, BusRole::DataIn, &layout.data, alignment)?,
                    timing: layout.timing,
                })
            }
        }
    }

    /// Number of independently judged data lanes.
    pub fn lanes(&self) -> usize {
        match self {
            BusSet::Logic { outputs, .. } => outputs.len(),
            BusSet::Dram { data_out, .. } => data_out.width() as usize,
            BusSet::Static { data, .. } => data.width() as usize,
        }
    }

    pub fn data_mask(&self) -> u32 {
        match self {
            BusSet::Logic { outputs, .. } => {
                if outputs.len() >= 32 {
                    u32::MAX
                } else {
                    (1 << outputs.len()) - 1
                }
            }
            BusSet::Dram { data_out, .. } => data_out.high_mask(),
            BusSet::Static { data, .. } => data.high_mask(),
        }
    }

    /// Bus directions at rest: addresses out, data towards the tester.
    pub fn power_up<P: GpioPort>(&mut self, socket: &mut SocketMap<P>) {
        match self {
            BusSet::Logic { .. } => {}
            BusSet::Dram {
                row,
                data_in,
                data_out,
                common_io,
                ..
            } => {
                row.set_mode(socket, PinMode::Output);
                row.write(socket, 0);
                if *common_io {
                    data_in.set_mode(socket, PinMode::Input);
                } else {
                    data_in.set_mode(socket, PinMode::Output);
                    data_in.write(socket, 0);
                    data_out.set_mode(socket, PinMode::Input);
                }
            }
            BusSet::Static { address, data, .. } => {
                address.set_mode(socket, PinMode::Output);
                address.write(socket, 0);
                data.set_mode(socket, PinMode::Input);
            }
        }
    }
}

/// Everything the sequencer needs to move lines for one family.
#[derive(Debug)]
pub struct Wiring<'p> {
    pub alignment: Alignment,
    pub controls: Controls,
    pub buses: BusSet<'p>,
}

impl<'p> Wiring<'p> {
    /// Fails before any line moves if the family does not fit the socket.
    pub fn resolve(profile: &'p ChipProfile, socket_pins: u8) -> Result<Self> {
        profile.validate(socket_pins)?;
        let alignment = Alignment::centered(profile.pin_count, socket_pins)?;
        Ok(Wiring {
            alignment,
            controls: Controls::resolve(profile, &alignment)?,
            buses: BusSet::resolve(profile, &alignment)?,
        })
    }
}
